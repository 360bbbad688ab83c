//! The live data context handed to consumers.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use elect_model::{DataFile, LatestFile, PerPartyJson, PerProvinceJson, SummaryJson, ZoneInformation};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use crate::config::LiveConfig;
use crate::directory::DirectorySources;
use crate::error::{LiveError, Result};
use crate::fetch::{Fetch, HttpFetcher};
use crate::inert::InertState;
use crate::reactive::{Projection, Setting, Subscription};
use crate::registry::{Memo, ResourceRegistry};
use crate::resource::{Resource, WeakResource};
use crate::state::FetchState;

type Shared<T> = Projection<FetchState<Arc<T>>>;

/// Live view of the published results.
///
/// Owned by the application root and cloned into every consumer; clones
/// share all state. There is no teardown: background polling stops once
/// the context and every handle obtained from it are dropped.
#[derive(Clone)]
pub struct LiveData {
    inner: Arc<LiveInner>,
}

struct LiveInner {
    config: LiveConfig,
    fetcher: Arc<dyn Fetch>,
    runtime: Handle,
    files: Arc<ResourceRegistry<Arc<Value>>>,
    sources: DirectorySources,
    directory: Projection<FetchState<String>>,
    locked: Projection<bool>,
    status: Projection<Option<String>>,
    summary: Memo<(), Shared<SummaryJson>>,
    provinces: Memo<u32, Shared<PerProvinceJson>>,
    parties: Memo<u32, Shared<PerPartyJson>>,
}

impl LiveData {
    /// Create a context fetching through `fetcher`.
    ///
    /// Must be called inside a tokio runtime; fetches are spawned on it.
    pub fn new(config: LiveConfig, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| LiveError::NoRuntime)?;

        let latest = Resource::new(config.latest_file_path.clone());
        install_poll(&latest, &runtime, &fetcher, &config);

        let files = {
            let runtime = runtime.clone();
            let fetcher = Arc::clone(&fetcher);
            let config = config.clone();
            Arc::new(ResourceRegistry::new(move |path| {
                let resource = Resource::new(path);
                install_one_shot(&resource, &runtime, &fetcher, config.data_file_url(path));
                resource
            }))
        };

        let sources = DirectorySources {
            latest: latest.clone(),
            override_directory: Setting::new(
                config.override_directory.clone().filter(|d| !d.is_empty()),
            ),
            curtain_bypass: Setting::new(config.disable_curtain),
        };

        let directory = {
            let sources = sources.clone();
            Projection::new("directory", move |cx| sources.resolve(cx))
        };
        let locked = {
            let latest = latest.clone();
            Projection::new("locked", move |cx| {
                cx.read(&latest).data.is_some_and(|file| file.is_locked())
            })
        };
        let status = {
            let latest = latest.clone();
            Projection::new("status", move |cx| {
                cx.read(&latest)
                    .data
                    .and_then(|file| file.status().map(str::to_string))
            })
        };

        tracing::debug!(
            base_url = %config.base_url,
            poll_interval_secs = config.poll_interval_secs,
            "Live data context created"
        );

        Ok(Self {
            inner: Arc::new(LiveInner {
                config,
                fetcher,
                runtime,
                files,
                sources,
                directory,
                locked,
                status,
                summary: Memo::new(),
                provinces: Memo::new(),
                parties: Memo::new(),
            }),
        })
    }

    /// Create a context fetching over HTTP.
    pub fn from_config(config: LiveConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.request_timeout())?;
        Self::new(config, Arc::new(fetcher))
    }

    /// Configuration this context was built with.
    pub fn config(&self) -> &LiveConfig {
        &self.inner.config
    }

    /// The pointer file resource.
    pub fn latest_resource(&self) -> Resource<Arc<LatestFile>> {
        self.inner.sources.latest.clone()
    }

    /// The resource of a data file, by resource path
    /// (`/{directory}{logical path}`).
    pub fn data_file_resource(&self, path: &str) -> Resource<Arc<Value>> {
        self.inner.files.get_or_create(path)
    }

    /// Paths of every data file resource created so far.
    pub fn data_file_paths(&self) -> Vec<String> {
        self.inner.files.paths()
    }

    /// Active snapshot directory.
    pub fn directory_state(&self) -> Projection<FetchState<String>> {
        self.inner.directory.clone()
    }

    /// Whether the operators hold the results back. `false` until the
    /// pointer file has loaded.
    pub fn locked_state(&self) -> Projection<bool> {
        self.inner.locked.clone()
    }

    /// Normalized counting status. `None` until the pointer file has
    /// loaded.
    pub fn status(&self) -> Projection<Option<String>> {
        self.inner.status.clone()
    }

    /// Nationwide summary.
    pub fn summary_data(&self) -> Dataset<SummaryJson> {
        let projection = self
            .inner
            .summary
            .get_or_insert_with((), || self.dataset_projection(DataFile::Summary));
        Dataset::new(projection)
    }

    /// Results of one province.
    pub fn per_province_data(&self, province_id: u32) -> Dataset<PerProvinceJson> {
        let projection = self.inner.provinces.get_or_insert_with(province_id, || {
            self.dataset_projection(DataFile::PerProvince(province_id))
        });
        Dataset::new(projection)
    }

    /// Results of one zone, narrowed from its province file.
    pub fn per_zone_data(&self, province_id: u32, zone_no: u32) -> ZoneDataset {
        ZoneDataset {
            province: self.per_province_data(province_id),
            zone_no,
        }
    }

    /// Results of one party.
    pub fn per_party_data(&self, party_id: u32) -> Dataset<PerPartyJson> {
        let projection = self.inner.parties.get_or_insert_with(party_id, || {
            self.dataset_projection(DataFile::PerParty(party_id))
        });
        Dataset::new(projection)
    }

    /// Pin the directory, or follow the pointer file again with `None`.
    /// An empty string counts as `None`.
    pub fn set_override_directory(&self, directory: Option<String>) {
        let directory = directory.filter(|d| !d.is_empty());
        if self.inner.sources.override_directory.set(directory.clone()) {
            tracing::info!(directory = ?directory, "Directory override changed");
        }
    }

    /// Show results even while the operators hold them back.
    pub fn set_curtain_bypass(&self, bypass: bool) {
        if self.inner.sources.curtain_bypass.set(bypass) {
            tracing::info!(bypass, "Curtain bypass changed");
        }
    }

    /// Fetch the pointer file now, outside of the poll schedule.
    pub async fn refresh_latest(&self) -> FetchState<Arc<LatestFile>> {
        let latest = &self.inner.sources.latest;
        load_latest(latest, self.inner.fetcher.as_ref(), &self.inner.config).await;
        latest.state()
    }

    /// Fetch a data file again.
    pub async fn refresh_data_file(&self, path: &str) -> FetchState<Arc<Value>> {
        let resource = self.inner.files.get_or_create(path);
        let url = self.inner.config.data_file_url(path);
        load_json(&resource, self.inner.fetcher.as_ref(), &url).await;
        resource.state()
    }

    fn dataset_projection<T>(&self, file: DataFile) -> Shared<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let sources = self.inner.sources.clone();
        let files = Arc::clone(&self.inner.files);
        let decoded = DecodeCache::default();
        Projection::new(file.to_string(), move |cx| {
            let directory = sources.resolve(cx);
            let Some(path) = directory.data.as_deref().map(|d| file.path_in(d)) else {
                return directory.retype();
            };
            let resource = files.get_or_create(&path);
            decoded.decode(cx.read(&resource))
        })
    }
}

impl std::fmt::Debug for LiveData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveData")
            .field("config", &self.inner.config)
            .field("files", &self.inner.files)
            .finish_non_exhaustive()
    }
}

/// Decode a raw data file state into its typed shape.
///
/// A payload of the wrong shape turns the state into a failure without
/// data, so consumers never see half-decoded results.
fn decode<T: DeserializeOwned>(state: FetchState<Arc<Value>>) -> FetchState<Arc<T>> {
    let Some(value) = state.data.clone() else {
        return state.retype();
    };
    match T::deserialize(value.as_ref()) {
        Ok(data) => state.map(|_| Arc::new(data)),
        Err(e) => {
            let mut failed = state.retype();
            failed.failed = true;
            failed.error = Some(LiveError::from(e));
            failed
        }
    }
}

/// Last payload decoded by a dataset projection.
///
/// Pointer polls recompute every mounted dataset; a payload that is still
/// the same `Arc` is not decoded again.
struct DecodeCache<T> {
    last: Mutex<Option<(Arc<Value>, Arc<T>)>>,
}

impl<T> Default for DecodeCache<T> {
    fn default() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }
}

impl<T: DeserializeOwned> DecodeCache<T> {
    fn decode(&self, state: FetchState<Arc<Value>>) -> FetchState<Arc<T>> {
        let Some(value) = state.data.clone() else {
            return state.retype();
        };
        let cached = crate::lock(&self.last)
            .as_ref()
            .filter(|(raw, _)| Arc::ptr_eq(raw, &value))
            .map(|(_, data)| Arc::clone(data));
        if let Some(data) = cached {
            return state.map(|_| data);
        }
        let decoded = decode(state);
        if let Some(data) = &decoded.data {
            *crate::lock(&self.last) = Some((value, Arc::clone(data)));
        }
        decoded
    }
}

/// One dataset as seen by one consumer.
///
/// The projection is shared by every consumer of the same file; the
/// smoothing memory belongs to this handle and its clones.
pub struct Dataset<T> {
    projection: Shared<T>,
    inert: Arc<InertState<Arc<T>>>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            projection: self.projection.clone(),
            inert: Arc::clone(&self.inert),
        }
    }
}

impl<T: Send + Sync + 'static> Dataset<T> {
    fn new(projection: Shared<T>) -> Self {
        Self {
            projection,
            inert: Arc::new(InertState::new()),
        }
    }

    /// Current state, smoothed over transient regressions.
    pub fn state(&self) -> FetchState<Arc<T>> {
        self.inert.apply(self.projection.get())
    }

    /// Current state without smoothing.
    pub fn raw_state(&self) -> FetchState<Arc<T>> {
        self.projection.get()
    }

    /// Keep the dataset live and get called on every change.
    pub fn subscribe(&self, on_change: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.projection.subscribe(on_change)
    }

    /// The underlying projection.
    pub fn projection(&self) -> &Shared<T> {
        &self.projection
    }
}

impl<T> std::fmt::Debug for Dataset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("projection", &self.projection)
            .finish_non_exhaustive()
    }
}

/// One zone of a province file.
#[derive(Clone, Debug)]
pub struct ZoneDataset {
    province: Dataset<PerProvinceJson>,
    zone_no: u32,
}

impl ZoneDataset {
    /// Zone number within the province.
    pub fn zone_no(&self) -> u32 {
        self.zone_no
    }

    /// Smoothed province state narrowed to this zone. A zone missing from
    /// the file leaves the state without data.
    pub fn state(&self) -> FetchState<ZoneInformation> {
        let zone_no = self.zone_no;
        self.province
            .state()
            .and_then(|province| province.zone(zone_no).cloned())
    }

    /// Keep the province file live and get called on every change.
    pub fn subscribe(&self, on_change: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.province.subscribe(on_change)
    }

    /// The province dataset this zone is read from.
    pub fn province(&self) -> &Dataset<PerProvinceJson> {
        &self.province
    }
}

fn install_poll(
    latest: &Resource<Arc<LatestFile>>,
    runtime: &Handle,
    fetcher: &Arc<dyn Fetch>,
    config: &LiveConfig,
) {
    let weak = latest.downgrade();
    let runtime = runtime.clone();
    let fetcher = Arc::clone(fetcher);
    let config = config.clone();
    latest.on_become_observed(move || {
        runtime.spawn(poll_latest(weak, fetcher, config));
    });
}

async fn poll_latest(weak: WeakResource<Arc<LatestFile>>, fetcher: Arc<dyn Fetch>, config: LiveConfig) {
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(latest) = weak.upgrade() else {
            tracing::debug!(
                target: "elect_live::resource",
                resource = %config.latest_file_path,
                "Resource dropped, polling stopped"
            );
            return;
        };
        load_latest(&latest, fetcher.as_ref(), &config).await;
    }
}

async fn load_latest(latest: &Resource<Arc<LatestFile>>, fetcher: &dyn Fetch, config: &LiveConfig) {
    let url = config.latest_file_url(Utc::now());
    latest
        .fetch(|| async move {
            let body = fetcher.get_json(&url).await?;
            let file: LatestFile = serde_json::from_value(body)?;
            Ok(Arc::new(file))
        })
        .await;
}

fn install_one_shot(
    resource: &Resource<Arc<Value>>,
    runtime: &Handle,
    fetcher: &Arc<dyn Fetch>,
    url: String,
) {
    let weak = resource.downgrade();
    let runtime = runtime.clone();
    let fetcher = Arc::clone(fetcher);
    resource.on_become_observed(move || {
        runtime.spawn(async move {
            if let Some(resource) = weak.upgrade() {
                load_json(&resource, fetcher.as_ref(), &url).await;
            }
        });
    });
}

async fn load_json(resource: &Resource<Arc<Value>>, fetcher: &dyn Fetch, url: &str) {
    resource
        .fetch(|| async move { fetcher.get_json(url).await.map(Arc::new) })
        .await;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fetch::MemoryFetcher;

    const LATEST: &str = "http://localhost:8000/data/latest.json";
    const SUMMARY: &str = "http://localhost:8000/data/20190324T2000/SummaryJSON.json";

    fn context() -> (LiveData, Arc<MemoryFetcher>) {
        let fetcher = Arc::new(MemoryFetcher::new());
        let live = LiveData::new(LiveConfig::default(), fetcher.clone()).unwrap();
        (live, fetcher)
    }

    #[test]
    fn test_requires_runtime() {
        let result = LiveData::new(LiveConfig::default(), Arc::new(MemoryFetcher::new()));
        assert_eq!(result.err(), Some(LiveError::NoRuntime));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = LiveConfig {
            poll_interval_secs: 0,
            ..LiveConfig::default()
        };
        let result = LiveData::new(config, Arc::new(MemoryFetcher::new()));
        assert!(matches!(result, Err(LiveError::Config(_))));
    }

    #[tokio::test]
    async fn test_nothing_fetched_without_subscribers() {
        let (live, fetcher) = context();
        let summary = live.summary_data();
        assert!(summary.state().loading);
        tokio::task::yield_now().await;
        assert!(fetcher.requests().is_empty());
        assert!(!live.latest_resource().is_activated());
    }

    #[tokio::test]
    async fn test_summary_flows_through() {
        let (live, fetcher) = context();
        fetcher.set_json(
            LATEST,
            json!({"pointers": [{"timestamp": 1, "directory": "20190324T2000"}]}),
        );
        fetcher.set_json(SUMMARY, json!({"zoneStatsMap": {}}));

        let summary = live.summary_data();
        let _subscription = summary.subscribe(|| {});
        let state = summary.projection().wait_until(|s| s.completed).await;
        assert!(state.data.is_some());
        assert_eq!(fetcher.request_count(SUMMARY), 1);
        assert_eq!(
            live.data_file_paths(),
            vec!["/20190324T2000/SummaryJSON.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_wrong_shape_fails_without_data() {
        let (live, fetcher) = context();
        fetcher.set_json(
            LATEST,
            json!({"pointers": [{"timestamp": 1, "directory": "20190324T2000"}]}),
        );
        fetcher.set_json(SUMMARY, json!({"zoneStatsMap": []}));

        let summary = live.summary_data();
        let state = summary.projection().wait_until(|s| s.failed).await;
        assert!(matches!(state.error, Some(LiveError::Decode(_))));
        assert!(state.data.is_none());
    }

    #[test]
    fn test_decode_keeps_flags() {
        let mut raw = FetchState::ready(Arc::new(json!({"foo": 1})));
        raw.begin_fetch();
        let decoded: FetchState<Arc<PerPartyJson>> = decode(raw);
        assert!(decoded.loading && decoded.completed);
        assert_eq!(decoded.data.unwrap().get("foo"), Some(&json!(1)));
    }

    #[test]
    fn test_decode_cache_reuses_unchanged_payload() {
        let cache = DecodeCache::<PerPartyJson>::default();
        let raw = Arc::new(json!({"foo": 1}));
        let first = cache.decode(FetchState::ready(Arc::clone(&raw)));
        let mut refreshing = FetchState::ready(Arc::clone(&raw));
        refreshing.begin_fetch();
        let second = cache.decode(refreshing);
        assert!(second.loading);
        assert!(Arc::ptr_eq(
            first.data.as_ref().unwrap(),
            second.data.as_ref().unwrap()
        ));

        let third = cache.decode(FetchState::ready(Arc::new(json!({"foo": 2}))));
        assert!(!Arc::ptr_eq(
            first.data.as_ref().unwrap(),
            third.data.as_ref().unwrap()
        ));
        assert_eq!(third.data.unwrap().get("foo"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_pointer_refresh_keeps_decoded_summary() {
        let (live, fetcher) = context();
        fetcher.set_json(
            LATEST,
            json!({"pointers": [{"timestamp": 1, "directory": "20190324T2000"}]}),
        );
        fetcher.set_json(SUMMARY, json!({"zoneStatsMap": {}}));

        let summary = live.summary_data();
        let _subscription = summary.subscribe(|| {});
        let before = summary.projection().wait_until(|s| s.completed).await;
        live.refresh_latest().await;
        let after = summary.projection().get();
        assert!(Arc::ptr_eq(
            before.data.as_ref().unwrap(),
            after.data.as_ref().unwrap()
        ));
    }

    #[tokio::test]
    async fn test_memoized_projections() {
        let (live, _fetcher) = context();
        let a = live.per_province_data(10);
        let b = live.per_province_data(10);
        assert_eq!(a.projection().name(), "/PerProvinceJSON/10.json");
        a.projection().get();
        // Shared projection: the second handle reuses the computed value.
        assert_eq!(b.projection().dependency_count(), 3);
    }
}
