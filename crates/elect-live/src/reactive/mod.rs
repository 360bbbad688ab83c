//! Explicit observer plumbing behind the live projections.
//!
//! # Architecture
//!
//! ```text
//! [Resource / Setting] --listener--> [Projection] --subscriber--> [consumer]
//!        ^                               |
//!        +------- Tracker records -------+
//! ```
//!
//! - A [`Source`] is anything a derivation can read: resources and settings.
//! - A derivation receives a [`Tracker`] and reads sources through it, so
//!   the projection learns exactly which sources it depends on.
//! - A [`Projection`] registers a listener on each dependency. A change
//!   bumps the projection's epoch, recomputes it while mounted and notifies
//!   its subscribers. Unmounted projections recompute lazily on `get()`.
//! - A projection is mounted while at least one [`Subscription`] is alive.
//!   Mounted projections observe their sources, which is what activates a
//!   resource's first fetch.

mod projection;
mod setting;
mod source;

pub use projection::{Projection, Subscription, Tracker};
pub use setting::Setting;
pub use source::{Listener, ListenerId, Listeners, Source, SourceId, Tracked};
