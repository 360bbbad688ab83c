//! Live data subscription for the election results feed.
//!
//! This crate keeps a client's view of the published results up to date.
//!
//! # Overview
//!
//! The results server publishes snapshots into timestamped directories and
//! a pointer file (`/data/latest.json`) naming the newest one. This crate:
//!
//! - Polls the pointer file with a cache-busting token
//! - Resolves the active snapshot directory, honoring the operators' lock
//!   and a manual override
//! - Fetches each data file at most once per directory, only when something
//!   is actually interested in it
//! - Exposes typed, smoothed projections for the summary, per-province,
//!   per-zone and per-party datasets
//!
//! # Architecture
//!
//! ```text
//! LiveData
//!   ├── latest resource ─poll─> /data/latest.json?cachebust=N
//!   ├── directory projection (pointer + override + curtain)
//!   ├── data file registry ──> /data/<directory>/<file>.json
//!   └── dataset projections ─> decode ─> inert smoothing ─> consumer
//! ```
//!
//! Resources start fetching the first time a mounted projection depends on
//! them. Nothing is fetched for data nobody subscribed to.
//!
//! # Example
//!
//! ```no_run
//! use elect_live::{LiveConfig, LiveData};
//!
//! async fn watch() -> elect_live::Result<()> {
//!     let live = LiveData::from_config(LiveConfig::default())?;
//!     let summary = live.summary_data();
//!     let _subscription = summary.subscribe(|| {});
//!
//!     let state = summary.projection().wait_until(|s| !s.loading).await;
//!     if let Some(summary) = state.data {
//!         println!("{} provinces", summary.zone_stats_map.len());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Mutex, MutexGuard, PoisonError};

// Core modules
pub mod config;
pub mod error;
pub mod state;

// Observer plumbing
pub mod reactive;

// Resources and their caches
pub mod fetch;
pub mod registry;
pub mod resource;

// Derived state
pub mod directory;
pub mod inert;

// Public facade
pub mod live;

// Re-exports for convenience
pub use config::LiveConfig;
pub use directory::{DirectorySources, directory_from_latest};
pub use error::{LiveError, Result};
pub use fetch::{Fetch, HttpFetcher, MemoryFetcher, cachebust_token};
pub use inert::{InertState, smooth};
pub use live::{Dataset, LiveData, ZoneDataset};
pub use reactive::{Projection, Setting, Subscription, Tracker};
pub use registry::{Memo, ResourceRegistry};
pub use resource::{Resource, WeakResource};
pub use state::FetchState;

/// Lock a mutex, ignoring poisoning.
///
/// Every critical section in this crate leaves its data consistent, so a
/// panic in an unrelated holder does not invalidate the value.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
