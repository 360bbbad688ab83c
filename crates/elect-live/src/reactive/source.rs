//! Sources and listener lists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock;

/// Callback invoked after a source changed.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Process-unique identity of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle of a registered listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Something a projection can depend on.
pub trait Source: Send + Sync {
    /// Identity used to deduplicate dependencies.
    fn source_id(&self) -> SourceId;

    /// Change counter, bumped after every applied update.
    fn version(&self) -> u64;

    /// Register a change listener.
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Remove a change listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);

    /// Called whenever a mounted projection depends on this source.
    fn observe(&self) {}
}

/// A handle whose current value can be read through a
/// [`Tracker`](super::Tracker).
pub trait Tracked {
    /// Value produced by a read.
    type Output;

    /// The source to depend on.
    fn source(&self) -> Arc<dyn Source>;

    /// Read the current value without recording a dependency.
    fn read_untracked(&self) -> Self::Output;
}

/// Ordered list of listeners.
///
/// Listeners are called in registration order, outside of the list's own
/// lock, so a listener may add or remove listeners or read any source.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push((id, listener));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener registered at the time of the call.
    pub fn notify(&self) {
        let snapshot: Vec<Listener> = lock(&self.entries)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}
