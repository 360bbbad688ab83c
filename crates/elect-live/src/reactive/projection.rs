//! Derived values that recompute when their sources change.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

use super::source::{ListenerId, Listeners, Source, SourceId, Tracked};
use crate::lock;

/// Records the sources a derivation reads.
#[derive(Default)]
pub struct Tracker {
    reads: Vec<TrackedRead>,
    seen: HashSet<SourceId>,
}

struct TrackedRead {
    source: Arc<dyn Source>,
    version: u64,
}

impl Tracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `handle` and record it as a dependency.
    pub fn read<R: Tracked>(&mut self, handle: &R) -> R::Output {
        let source = handle.source();
        let id = source.source_id();
        if self.seen.insert(id) {
            // Version first: a change landing between the two reads is
            // caught when the listener is attached.
            let version = source.version();
            self.reads.push(TrackedRead { source, version });
        }
        handle.read_untracked()
    }

    /// Number of distinct sources read so far.
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    /// Whether nothing was read.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

/// Keeps a projection mounted while alive.
///
/// Dropping the subscription removes its callback.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn cancel(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

type Derive<T> = Box<dyn Fn(&mut Tracker) -> T + Send + Sync>;

/// A value derived from sources by a pure derivation function.
///
/// - Computed lazily on the first [`get`](Self::get).
/// - Cached until one of the sources read during the last computation
///   changes.
/// - While at least one [`Subscription`] is alive the projection is
///   mounted: it observes its sources (activating resources), recomputes
///   as soon as a source changes, and then notifies every subscriber.
pub struct Projection<T> {
    inner: Arc<ProjectionInner<T>>,
}

struct ProjectionInner<T> {
    name: String,
    derive: Derive<T>,
    /// Bumped on every dependency change.
    epoch: AtomicU64,
    cache: Mutex<Option<(u64, T)>>,
    dependencies: Mutex<Vec<Dependency>>,
    subscribers: Listeners,
}

struct Dependency {
    source: Arc<dyn Source>,
    listener: ListenerId,
}

impl<T> Clone for Projection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Projection<T> {
    /// Create a projection. Nothing is computed until the first read.
    pub fn new(
        name: impl Into<String>,
        derive: impl Fn(&mut Tracker) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ProjectionInner {
                name: name.into(),
                derive: Box::new(derive),
                epoch: AtomicU64::new(0),
                cache: Mutex::new(None),
                dependencies: Mutex::new(Vec::new()),
                subscribers: Listeners::new(),
            }),
        }
    }

    /// Name used in traces.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current value, recomputed first if a source changed.
    pub fn get(&self) -> T {
        ProjectionInner::get(&self.inner)
    }

    /// Whether at least one subscription is alive.
    pub fn is_mounted(&self) -> bool {
        !self.inner.subscribers.is_empty()
    }

    /// Number of sources read by the last computation.
    pub fn dependency_count(&self) -> usize {
        lock(&self.inner.dependencies).len()
    }

    /// Subscribe to changes.
    ///
    /// `on_change` runs after every recomputation caused by a source
    /// change, outside of any lock; it may call [`get`](Self::get).
    pub fn subscribe(&self, on_change: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.inner.subscribers.add(Arc::new(on_change));
        if self.inner.subscribers.len() == 1 {
            tracing::trace!(projection = %self.inner.name, "Mounted");
        }
        // Computing (or reusing) the value attaches the listeners; the
        // sources are then observed now that the projection is mounted.
        ProjectionInner::get(&self.inner);
        self.inner.observe_dependencies();

        let weak = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribers.remove(id);
                    if inner.subscribers.is_empty() {
                        tracing::trace!(projection = %inner.name, "Unmounted");
                    }
                }
            })),
        }
    }

    /// Wait until the value satisfies `predicate`, keeping the projection
    /// mounted meanwhile.
    pub async fn wait_until(&self, predicate: impl Fn(&T) -> bool) -> T {
        let notify = Arc::new(Notify::new());
        let waker = Arc::clone(&notify);
        let _subscription = self.subscribe(move || waker.notify_one());
        loop {
            let value = self.get();
            if predicate(&value) {
                return value;
            }
            notify.notified().await;
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ProjectionInner<T> {
    fn get(this: &Arc<Self>) -> T {
        let epoch = this.epoch.load(Ordering::Acquire);
        if let Some((cached_epoch, value)) = lock(&this.cache).as_ref() {
            if *cached_epoch == epoch {
                return value.clone();
            }
        }

        let mut tracker = Tracker::new();
        let value = (this.derive)(&mut tracker);
        Self::replace_dependencies(this, tracker);

        let mut cache = lock(&this.cache);
        let newer_cached = cache
            .as_ref()
            .is_some_and(|(cached_epoch, _)| *cached_epoch > epoch);
        if !newer_cached {
            *cache = Some((epoch, value.clone()));
        }
        value
    }

    fn replace_dependencies(this: &Arc<Self>, tracker: Tracker) {
        let mounted = !this.subscribers.is_empty();
        let mut stale = false;
        let to_observe: Vec<Arc<dyn Source>> = {
            let mut dependencies = lock(&this.dependencies);
            let wanted: HashSet<SourceId> = tracker
                .reads
                .iter()
                .map(|read| read.source.source_id())
                .collect();

            dependencies.retain(|dependency| {
                let keep = wanted.contains(&dependency.source.source_id());
                if !keep {
                    dependency.source.remove_listener(dependency.listener);
                }
                keep
            });

            for read in tracker.reads {
                let id = read.source.source_id();
                if !dependencies.iter().any(|d| d.source.source_id() == id) {
                    let listener = read.source.add_listener(Self::listener(this));
                    dependencies.push(Dependency {
                        source: Arc::clone(&read.source),
                        listener,
                    });
                }
                if read.source.version() != read.version {
                    stale = true;
                }
            }

            if mounted {
                dependencies
                    .iter()
                    .map(|dependency| Arc::clone(&dependency.source))
                    .collect()
            } else {
                Vec::new()
            }
        };
        if stale {
            this.epoch.fetch_add(1, Ordering::AcqRel);
        }
        // Activation hooks run outside the lock; they may notify.
        for source in to_observe {
            source.observe();
        }
    }

    fn listener(this: &Arc<Self>) -> Arc<dyn Fn() + Send + Sync> {
        let weak: Weak<Self> = Arc::downgrade(this);
        Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::invalidate(&inner);
            }
        })
    }

    fn invalidate(this: &Arc<Self>) {
        this.epoch.fetch_add(1, Ordering::AcqRel);
        if this.subscribers.is_empty() {
            return;
        }
        tracing::trace!(projection = %this.name, "Recomputing");
        Self::get(this);
        this.subscribers.notify();
    }

    fn observe_dependencies(&self) {
        let sources: Vec<Arc<dyn Source>> = lock(&self.dependencies)
            .iter()
            .map(|dependency| Arc::clone(&dependency.source))
            .collect();
        for source in sources {
            source.observe();
        }
    }
}

impl<T> Drop for ProjectionInner<T> {
    fn drop(&mut self) {
        let dependencies = match self.dependencies.get_mut() {
            Ok(dependencies) => dependencies,
            Err(poisoned) => poisoned.into_inner(),
        };
        for dependency in dependencies.drain(..) {
            dependency.source.remove_listener(dependency.listener);
        }
    }
}

impl<T> std::fmt::Debug for Projection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("name", &self.inner.name)
            .field("subscribers", &self.inner.subscribers.len())
            .finish()
    }
}
