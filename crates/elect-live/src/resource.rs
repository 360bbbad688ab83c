//! Observable fetch state of one logical endpoint.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::Result;
use crate::lock;
use crate::reactive::{Listener, ListenerId, Listeners, Source, SourceId, Tracked};
use crate::state::FetchState;

type ActivationHook = Box<dyn FnOnce() + Send>;

/// The fetch state of one endpoint, observable by projections.
///
/// A resource does not know how to fetch itself. Its owner installs an
/// activation hook with [`on_become_observed`](Self::on_become_observed);
/// the hook runs once, the first time a mounted projection depends on the
/// resource, and typically spawns [`fetch`](Self::fetch) calls.
///
/// Each fetch takes a sequence number. A completion is applied only if no
/// newer fetch was started since, so an old response can never overwrite a
/// newer one.
pub struct Resource<T> {
    inner: Arc<ResourceInner<T>>,
}

struct ResourceInner<T> {
    id: SourceId,
    name: String,
    state: Mutex<FetchState<T>>,
    version: AtomicU64,
    sequence: AtomicU64,
    listeners: Listeners,
    activated: AtomicBool,
    on_activate: Mutex<Option<ActivationHook>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Resource<T> {
    /// Create a resource in the loading state. `name` is the logical path
    /// used in traces.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: SourceId::next(),
                name: name.into(),
                state: Mutex::new(FetchState::pending()),
                version: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
                listeners: Listeners::new(),
                activated: AtomicBool::new(false),
                on_activate: Mutex::new(None),
            }),
        }
    }

    /// Logical path of this resource.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> FetchState<T> {
        lock(&self.inner.state).clone()
    }

    /// Whether the activation hook has run (or was due to run).
    pub fn is_activated(&self) -> bool {
        self.inner.activated.load(Ordering::Acquire)
    }

    /// Install the hook run on first observation.
    ///
    /// If the resource was already observed the hook runs immediately.
    pub fn on_become_observed(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_activated() {
            hook();
            return;
        }
        *lock(&self.inner.on_activate) = Some(Box::new(hook));
        // Observed between the check and the store: run it now.
        if self.is_activated() {
            self.inner.run_activation();
        }
    }

    /// Mark the resource observed, running the activation hook once.
    pub fn activate(&self) {
        self.inner.observe();
    }

    /// Run one fetch and apply its outcome.
    ///
    /// The loading flag is raised (and dependents notified) before
    /// `fetcher` is polled. The outcome is dropped if another fetch started
    /// in the meantime.
    pub async fn fetch<F, Fut>(&self, fetcher: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(
            target: "elect_live::resource",
            resource = %self.inner.name,
            sequence,
            "Fetching"
        );
        self.inner.update(|state| state.begin_fetch());

        let outcome = fetcher().await;

        if self.inner.sequence.load(Ordering::Acquire) != sequence {
            tracing::debug!(
                target: "elect_live::resource",
                resource = %self.inner.name,
                sequence,
                "Discarding stale response"
            );
            return;
        }
        match outcome {
            Ok(data) => {
                tracing::debug!(
                    target: "elect_live::resource",
                    resource = %self.inner.name,
                    "Loaded"
                );
                self.inner.update(|state| state.succeed(data));
            }
            Err(error) => {
                tracing::debug!(
                    target: "elect_live::resource",
                    resource = %self.inner.name,
                    %error,
                    "Fetch failed"
                );
                self.inner.update(|state| state.fail(error));
            }
        }
    }

    /// A handle that does not keep the resource alive.
    pub fn downgrade(&self) -> WeakResource<T> {
        WeakResource {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of dependents currently listening.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T> ResourceInner<T> {
    fn update(&self, apply: impl FnOnce(&mut FetchState<T>)) {
        {
            let mut state = lock(&self.state);
            apply(&mut state);
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        self.listeners.notify();
    }

    fn run_activation(&self) {
        let hook = lock(&self.on_activate).take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl<T: Send> Source for ResourceInner<T> {
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

    fn observe(&self) {
        if self.activated.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(
            target: "elect_live::resource",
            resource = %self.name,
            "Become observed"
        );
        self.run_activation();
    }
}

impl<T: Clone + Send + 'static> Tracked for Resource<T> {
    type Output = FetchState<T>;

    fn source(&self) -> Arc<dyn Source> {
        self.inner.clone()
    }

    fn read_untracked(&self) -> FetchState<T> {
        self.state()
    }
}

impl<T> std::fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.inner.name)
            .field("activated", &self.inner.activated.load(Ordering::Relaxed))
            .finish()
    }
}

/// Non-owning handle to a [`Resource`], held by background tasks so they
/// stop once the resource is gone.
pub struct WeakResource<T> {
    inner: Weak<ResourceInner<T>>,
}

impl<T> Clone for WeakResource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakResource<T> {
    /// Upgrade to a strong handle if the resource is still alive.
    pub fn upgrade(&self) -> Option<Resource<T>> {
        self.inner.upgrade().map(|inner| Resource { inner })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use proptest::prelude::*;
    use tokio::sync::oneshot;

    use super::*;
    use crate::error::LiveError;
    use crate::reactive::Projection;

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[tokio::test]
    async fn test_success_then_failure_keeps_data() {
        let resource = Resource::new("/data/latest.json");
        assert!(resource.state().loading);

        resource.fetch(|| async { Ok(1) }).await;
        let state = resource.state();
        assert!(state.completed && !state.loading && !state.failed);
        assert_eq!(state.data, Some(1));

        resource
            .fetch(|| async { Err(LiveError::Network("reset".to_string())) })
            .await;
        let state = resource.state();
        assert!(state.completed);
        assert!(state.failed);
        assert_eq!(state.data, Some(1));
    }

    #[tokio::test]
    async fn test_loading_raised_before_fetch_runs() {
        let resource = Resource::<u8>::new("/data/x.json");
        resource.fetch(|| async { Ok(1) }).await;

        let observed = resource.clone();
        resource
            .fetch(move || {
                let loading = observed.state().loading;
                async move {
                    assert!(loading);
                    Ok(2)
                }
            })
            .await;
        assert!(!resource.state().loading);
    }

    #[tokio::test]
    async fn test_stale_completion_is_discarded() {
        let resource = Resource::new("/data/latest.json");
        let (first_tx, first_rx) = oneshot::channel::<u32>();
        let (second_tx, second_rx) = oneshot::channel::<u32>();

        let slow = resource.clone();
        let slow_task = tokio::spawn(async move {
            slow.fetch(|| async move { Ok(first_rx.await.unwrap()) }).await;
        });
        tokio::task::yield_now().await;

        let fast = resource.clone();
        let fast_task = tokio::spawn(async move {
            fast.fetch(|| async move { Ok(second_rx.await.unwrap()) }).await;
        });
        tokio::task::yield_now().await;

        second_tx.send(2).unwrap();
        fast_task.await.unwrap();
        first_tx.send(1).unwrap();
        slow_task.await.unwrap();

        assert_eq!(resource.state().data, Some(2));
    }

    #[test]
    fn test_activation_runs_once() {
        let resource = Resource::<u8>::new("/data/latest.json");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        resource.on_become_observed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!resource.is_activated());

        let handle = resource.clone();
        let projection = Projection::new("probe", move |cx| cx.read(&handle).loading);
        // Reading alone does not activate.
        assert!(projection.get());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = projection.subscribe(|| {});
        let second = projection.subscribe(|| {});
        drop((first, second));
        let _third = projection.subscribe(|| {});
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resource.is_activated());
    }

    #[test]
    fn test_activation_once_across_threads() {
        let resource = Resource::<u8>::new("/data/latest.json");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        resource.on_become_observed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let resource = resource.clone();
                scope.spawn(move || resource.activate());
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_installed_after_activation_runs_immediately() {
        let resource = Resource::<u8>::new("/data/latest.json");
        resource.activate();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        resource.on_become_observed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_weak_handle_does_not_keep_alive() {
        let resource = Resource::<u8>::new("/data/latest.json");
        let weak = resource.downgrade();
        assert!(weak.upgrade().is_some());
        drop(resource);
        assert!(weak.upgrade().is_none());
    }

    proptest! {
        #[test]
        fn prop_completed_never_reverts(outcomes in prop::collection::vec(any::<Option<u8>>(), 1..20)) {
            let resource = Resource::new("/data/summary.json");
            let mut seen_success = false;
            block_on(async {
                for outcome in outcomes {
                    resource
                        .fetch(|| async move {
                            outcome.ok_or_else(|| LiveError::Network("down".to_string()))
                        })
                        .await;
                    seen_success |= outcome.is_some();
                    let state = resource.state();
                    assert_eq!(state.completed, seen_success);
                    assert_eq!(state.failed, outcome.is_none());
                    assert!(!state.loading);
                }
            });
        }
    }
}
