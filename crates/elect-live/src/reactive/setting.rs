//! Settable observable values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::source::{Listener, ListenerId, Listeners, Source, SourceId, Tracked};
use crate::lock;

/// A value set from outside the data feed, such as the manual directory
/// override or the curtain bypass flag.
///
/// Setting a different value notifies dependents; setting an equal value
/// is a no-op.
pub struct Setting<T> {
    inner: Arc<SettingInner<T>>,
}

struct SettingInner<T> {
    id: SourceId,
    version: AtomicU64,
    value: Mutex<T>,
    listeners: Listeners,
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Setting<T> {
    /// Create a setting holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SettingInner {
                id: SourceId::next(),
                version: AtomicU64::new(0),
                value: Mutex::new(value),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        lock(&self.inner.value).clone()
    }

    /// Replace the value. Returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = lock(&self.inner.value);
            if *current == value {
                return false;
            }
            *current = value;
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
        self.inner.listeners.notify();
        true
    }

    /// Number of dependents currently listening.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T: Send> Source for SettingInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

impl<T: Clone + PartialEq + Send + 'static> Tracked for Setting<T> {
    type Output = T;

    fn source(&self) -> Arc<dyn Source> {
        self.inner.clone()
    }

    fn read_untracked(&self) -> T {
        self.get()
    }
}

impl<T: Clone + PartialEq + Send + 'static + std::fmt::Debug> std::fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setting")
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_set_notifies_only_on_change() {
        let setting = Setting::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        setting.source().add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!setting.set(false));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(setting.set(true));
        assert!(setting.get());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(setting.source().version(), 1);
    }

    #[test]
    fn test_clones_share_value() {
        let setting = Setting::new(None::<String>);
        let other = setting.clone();
        other.set(Some("20190324T2000".to_string()));
        assert_eq!(setting.get().as_deref(), Some("20190324T2000"));
    }
}
