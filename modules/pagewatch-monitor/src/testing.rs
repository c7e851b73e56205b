// Test mocks for the monitor pipeline.
//
// One mock per trait boundary:
// - MockFetcher (PageFetcher): HashMap-based URL→page, mutable between runs
// - ScriptedOracle (RatingOracle): queued replies, then a default
// - MemorySnapshotStore (SnapshotStore)
// - MemoryAnalysisStore / FailingAnalysisStore (AnalysisStore)
// - MemorySiteStore / FailingSiteStore (SiteStore)
// - RecordingNotifier (NotifyBackend)
//
// Plus helpers for sites, items, oracle replies and a fully mocked Monitor.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use ai_client::AiError;
use async_trait::async_trait;
use chrono::Utc;
use pagewatch_common::{AnalysisRecord, ContentSnapshot, ExtractedItem, MonitoredSite, RawContent, Rating};

use crate::detector::ChangeDetector;
use crate::error::{FetchError, OracleError, StoreError};
use crate::fetcher::PageFetcher;
use crate::notify::NotifyBackend;
use crate::orchestrator::{Monitor, MonitorParts, MonitorSettings};
use crate::rating::{PromptBuilder, RatingDispatcher, RatingOracle, RatingRequest};
use crate::recorder::AnalysisRecorder;
use crate::retry::RetryPolicy;
use crate::sites::SiteRegistry;
use crate::snapshot::SnapshotStore;
use crate::store::{AnalysisStore, SitePatch, SiteStore};
use crate::summary::RunSummary;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn site(url: &str, name: &str) -> MonitoredSite {
    MonitoredSite {
        url: url.to_string(),
        name: name.to_string(),
        category: pagewatch_common::DEFAULT_CATEGORY.to_string(),
        active: true,
        created_at: Utc::now(),
    }
}

pub fn item(title: &str) -> ExtractedItem {
    ExtractedItem {
        title: title.to_string(),
        date: None,
        content: String::new(),
        first_seen: None,
    }
}

/// A well-formed oracle reply with no items.
pub fn rating_reply(score: i64, explanation: &str) -> String {
    serde_json::json!({ "score": score, "explanation": explanation, "items": [] }).to_string()
}

pub fn rating(value: i64) -> Rating {
    Rating::new(value).unwrap()
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    Network,
    Blocked,
    Empty,
}

#[derive(Debug, Clone)]
enum MockPage {
    Content { text: String, items: Vec<ExtractedItem> },
    Fails(MockFailure),
}

/// HashMap-based page fetcher. Unregistered URLs fail with a network error.
/// Builder pattern: `.on_page()`, `.on_items()`, `.on_failure()`; pages can
/// also be swapped between runs with `set_page()`.
pub struct MockFetcher {
    name: String,
    pages: Mutex<HashMap<String, MockPage>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pages: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_page(self, url: &str, text: &str) -> Self {
        self.set_page(url, text);
        self
    }

    pub fn on_items(self, url: &str, text: &str, items: Vec<ExtractedItem>) -> Self {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            MockPage::Content {
                text: text.to_string(),
                items,
            },
        );
        self
    }

    pub fn on_failure(self, url: &str, failure: MockFailure) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), MockPage::Fails(failure));
        self
    }

    pub fn set_page(&self, url: &str, text: &str) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            MockPage::Content {
                text: text.to_string(),
                items: Vec::new(),
            },
        );
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let page = self.pages.lock().unwrap().get(url).cloned();

        match page {
            Some(MockPage::Content { text, items }) => Ok(RawContent {
                url: url.to_string(),
                title: None,
                text,
                items,
                fetcher: self.name.clone(),
                fetched_at: Utc::now(),
            }),
            Some(MockPage::Fails(MockFailure::Blocked)) => Err(FetchError::Blocked {
                url: url.to_string(),
                status: 403,
            }),
            Some(MockPage::Fails(MockFailure::Empty)) => Err(FetchError::Empty {
                url: url.to_string(),
            }),
            Some(MockPage::Fails(MockFailure::Network)) | None => Err(FetchError::Network {
                url: url.to_string(),
                message: "MockFetcher: connection refused".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Timeout,
    Unauthorized,
}

impl Scripted {
    fn produce(&self) -> Result<String, OracleError> {
        match self {
            Scripted::Reply(text) => Ok(text.clone()),
            Scripted::Timeout => Err(OracleError::Ai(AiError::Timeout)),
            Scripted::Unauthorized => Err(OracleError::Ai(AiError::Auth {
                status: 401,
                message: "invalid api key".into(),
            })),
        }
    }
}

/// Rating oracle that plays back queued replies, then repeats a default.
/// Records every request it receives.
pub struct ScriptedOracle {
    queue: Mutex<VecDeque<Scripted>>,
    default: Scripted,
    requests: Mutex<Vec<RatingRequest>>,
    calls: AtomicU32,
}

impl ScriptedOracle {
    fn with_default(default: Scripted) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default,
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Always answers with `reply`.
    pub fn replying(reply: &str) -> Self {
        Self::with_default(Scripted::Reply(reply.to_string()))
    }

    /// Always times out (transient).
    pub fn timing_out() -> Self {
        Self::with_default(Scripted::Timeout)
    }

    /// Always fails authentication (permanent).
    pub fn unauthorized() -> Self {
        Self::with_default(Scripted::Unauthorized)
    }

    /// Queue a timeout before the default behaviour resumes.
    pub fn then_timeout(self) -> Self {
        self.queue.lock().unwrap().push_back(Scripted::Timeout);
        self
    }

    /// Queue a one-off reply before the default behaviour resumes.
    pub fn then_reply(self, reply: &str) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(reply.to_string()));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RatingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RatingOracle for ScriptedOracle {
    async fn complete(&self, request: &RatingRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.default.clone()).produce()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Snapshot store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, ContentSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, snapshot: ContentSnapshot) -> Self {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.url.clone(), snapshot);
        self
    }

    pub fn snapshot(&self, url: &str) -> Option<ContentSnapshot> {
        self.snapshots.lock().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, url: &str) -> Result<Option<ContentSnapshot>, StoreError> {
        Ok(self.snapshot(url))
    }

    async fn put(&self, snapshot: &ContentSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.url.clone(), snapshot.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Analysis stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAnalysisStore {
    records: Mutex<Vec<AnalysisRecord>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insertion order.
    pub fn records(&self) -> Vec<AnalysisRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut records = self.records();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn for_url(&self, url: &str, limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut records: Vec<_> = self.records().into_iter().filter(|r| r.url == url).collect();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn latest_per_url(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut latest: HashMap<String, AnalysisRecord> = HashMap::new();
        for record in self.records() {
            latest.insert(record.url.clone(), record);
        }
        let mut out: Vec<_> = latest.into_values().collect();
        out.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(out)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Analysis store that is always unreachable.
pub struct FailingAnalysisStore;

#[async_trait]
impl AnalysisStore for FailingAnalysisStore {
    async fn insert(&self, _record: &AnalysisRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn for_url(&self, _url: &str, _limit: usize) -> Result<Vec<AnalysisRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn latest_per_url(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ---------------------------------------------------------------------------
// Site stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySiteStore {
    sites: Mutex<Vec<MonitoredSite>>,
}

impl MemorySiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: Vec<MonitoredSite>) -> Self {
        Self {
            sites: Mutex::new(sites),
        }
    }

    pub fn sites(&self) -> Vec<MonitoredSite> {
        self.sites.lock().unwrap().clone()
    }

    fn modify(&self, url: &str, edit: impl FnOnce(&mut MonitoredSite)) -> Result<(), StoreError> {
        let mut sites = self.sites.lock().unwrap();
        let site = sites
            .iter_mut()
            .find(|s| s.url == url)
            .ok_or_else(|| StoreError::NotFound(url.to_string()))?;
        edit(site);
        Ok(())
    }
}

#[async_trait]
impl SiteStore for MemorySiteStore {
    async fn list(&self, active_only: bool) -> Result<Vec<MonitoredSite>, StoreError> {
        Ok(self
            .sites()
            .into_iter()
            .filter(|s| !active_only || s.active)
            .collect())
    }

    async fn add(&self, site: &MonitoredSite) -> Result<(), StoreError> {
        let mut sites = self.sites.lock().unwrap();
        if sites.iter().any(|s| s.url == site.url) {
            return Err(StoreError::Duplicate(site.url.clone()));
        }
        sites.push(site.clone());
        Ok(())
    }

    async fn upsert(&self, site: &MonitoredSite) -> Result<(), StoreError> {
        let mut sites = self.sites.lock().unwrap();
        match sites.iter_mut().find(|s| s.url == site.url) {
            Some(existing) => *existing = site.clone(),
            None => sites.push(site.clone()),
        }
        Ok(())
    }

    async fn update(&self, url: &str, patch: &SitePatch) -> Result<(), StoreError> {
        self.modify(url, |site| {
            if let Some(name) = &patch.name {
                site.name = name.clone();
            }
            if let Some(category) = &patch.category {
                site.category = category.clone();
            }
        })
    }

    async fn set_active(&self, url: &str, active: bool) -> Result<(), StoreError> {
        self.modify(url, |site| site.active = active)
    }

    async fn remove(&self, url: &str) -> Result<(), StoreError> {
        let mut sites = self.sites.lock().unwrap();
        let before = sites.len();
        sites.retain(|s| s.url != url);
        if sites.len() == before {
            return Err(StoreError::NotFound(url.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Site store that is always unreachable.
pub struct FailingSiteStore;

#[async_trait]
impl SiteStore for FailingSiteStore {
    async fn list(&self, _active_only: bool) -> Result<Vec<MonitoredSite>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn add(&self, _site: &MonitoredSite) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn upsert(&self, _site: &MonitoredSite) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn update(&self, _url: &str, _patch: &SitePatch) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_active(&self, _url: &str, _active: bool) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn remove(&self, _url: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<AnalysisRecord>>,
    digests: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notified(&self) -> Vec<AnalysisRecord> {
        self.notified.lock().unwrap().clone()
    }

    pub fn digests(&self) -> u32 {
        self.digests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotifyBackend for RecordingNotifier {
    async fn notify(&self, record: &AnalysisRecord) -> anyhow::Result<()> {
        self.notified.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn send_digest(&self, _summary: &RunSummary) -> anyhow::Result<()> {
        self.digests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fully mocked monitor
// ---------------------------------------------------------------------------

/// A [`Monitor`] wired to in-memory mocks, with handles kept for assertions.
pub struct TestMonitor {
    pub monitor: Monitor,
    pub fetcher: Arc<MockFetcher>,
    pub oracle: Arc<ScriptedOracle>,
    pub snapshots: Arc<MemorySnapshotStore>,
    pub primary: Arc<MemoryAnalysisStore>,
    pub fallback: Arc<MemoryAnalysisStore>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Builder for [`TestMonitor`]. Defaults: no sites, an oracle replying 3,
/// a working primary store, threshold 0.9, notify at 4.
pub struct TestMonitorBuilder {
    sites: Vec<MonitoredSite>,
    fetcher: MockFetcher,
    oracle: ScriptedOracle,
    snapshots: MemorySnapshotStore,
    primary_down: bool,
    threshold: f64,
    max_concurrent: usize,
}

impl Default for TestMonitorBuilder {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            fetcher: MockFetcher::new(),
            oracle: ScriptedOracle::replying(&rating_reply(3, "routine")),
            snapshots: MemorySnapshotStore::new(),
            primary_down: false,
            threshold: 0.9,
            max_concurrent: 1,
        }
    }
}

impl TestMonitorBuilder {
    pub fn site(mut self, url: &str, name: &str) -> Self {
        self.sites.push(site(url, name));
        self
    }

    pub fn fetcher(mut self, fetcher: MockFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn oracle(mut self, oracle: ScriptedOracle) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn snapshots(mut self, snapshots: MemorySnapshotStore) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn primary_down(mut self) -> Self {
        self.primary_down = true;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn build(self) -> TestMonitor {
        let fetcher = Arc::new(self.fetcher);
        let oracle = Arc::new(self.oracle);
        let snapshots = Arc::new(self.snapshots);
        let primary = Arc::new(MemoryAnalysisStore::new());
        let fallback = Arc::new(MemoryAnalysisStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let primary_store: Arc<dyn AnalysisStore> = if self.primary_down {
            Arc::new(FailingAnalysisStore)
        } else {
            primary.clone()
        };

        let monitor = Monitor::new(
            MonitorParts {
                sites: Arc::new(SiteRegistry::new(
                    None,
                    Arc::new(MemorySiteStore::with_sites(self.sites)),
                )),
                fetcher: fetcher.clone(),
                snapshots: snapshots.clone(),
                detector: ChangeDetector::new(self.threshold),
                rating: RatingDispatcher::new(
                    Some(oracle.clone()),
                    RetryPolicy::immediate(3),
                    PromptBuilder::new("Local news", 5000, 5),
                ),
                recorder: Arc::new(AnalysisRecorder::new(Some(primary_store), fallback.clone())),
                notifier: notifier.clone(),
            },
            MonitorSettings {
                max_concurrent: self.max_concurrent,
                min_rating: rating(4),
                runs_dir: None,
            },
        );

        TestMonitor {
            monitor,
            fetcher,
            oracle,
            snapshots,
            primary,
            fallback,
            notifier,
        }
    }
}

impl TestMonitor {
    pub fn builder() -> TestMonitorBuilder {
        TestMonitorBuilder::default()
    }

    /// Records from both stores, insertion order within each.
    pub fn all_records(&self) -> Vec<AnalysisRecord> {
        let mut records = self.primary.records();
        records.extend(self.fallback.records());
        records
    }
}
