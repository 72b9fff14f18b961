//! The cache manager: lifecycle state machine and request strategies.
//!
//! One worker instance owns the two current generations for a deployed
//! build. Its life runs `Installing -> Waiting -> Active -> Superseded`:
//! install warms the static generation from the bootstrap manifest,
//! activation purges every generation left over from earlier deployments
//! and claims request handling, and supersession ends service when a
//! newer instance (or shutdown) takes over.
//!
//! Request handling follows one strategy per classification:
//!
//! - static assets are cache-first against the static generation;
//! - navigations are network-first, degrading to the cached entry for the
//!   key and then to the cached fallback document;
//! - dynamic requests are network-first, storing only success statuses and
//!   degrading to the cached entry if the network is gone.
//!
//! Stored bodies are copies; the bytes handed back to the caller are the
//! original response. Writes are awaited before the response is returned,
//! and a failed write is logged rather than failing the request.

use std::sync::Arc;

use bytes::Bytes;
use cachette_client::{Fetch, FetchResponse, join_origin};
use cachette_core::cache::hash::entry_key;
use cachette_core::{CacheDb, CachedEntry, Generations, RequestClass, RequestInfo, WorkerConfig, classify};
use url::Url;

use crate::error::WorkerError;

/// Lifecycle states of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Superseded,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
        }
    }
}

/// Where the bytes of a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "fallback",
        }
    }
}

/// A response the worker hands back for an intercepted request.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

/// Result of handling an intercepted request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Non-http(s) scheme; left to default handling.
    Ignored,
    Response(ServedResponse),
}

/// One bootstrap manifest entry that could not be warmed.
#[derive(Debug, Clone)]
pub struct InstallFailure {
    pub path: String,
    pub reason: String,
}

/// Explicit result of the install phase.
///
/// Install is best effort: failures are reported here instead of aborting,
/// so callers and tests can assert on partial-install states.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Manifest paths stored into the static generation.
    pub cached: Vec<String>,
    /// Manifest paths that failed, with reasons.
    pub failed: Vec<InstallFailure>,
}

impl InstallReport {
    /// Whether every manifest entry was warmed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of manifest entries attempted.
    pub fn requested(&self) -> usize {
        self.cached.len() + self.failed.len()
    }
}

/// The cache manager for one deployed build.
pub struct Worker {
    config: WorkerConfig,
    origin: Url,
    generations: Generations,
    cache: CacheDb,
    fetcher: Arc<dyn Fetch>,
    state: WorkerState,
}

impl Worker {
    /// Construct a worker from configuration.
    ///
    /// Generation names are derived here from the configured prefix and
    /// version; nothing about the deployment lives in globals.
    pub fn new(config: WorkerConfig, cache: CacheDb, fetcher: Arc<dyn Fetch>) -> Result<Self, WorkerError> {
        let origin = Url::parse(&config.origin).map_err(|e| WorkerError::InvalidOrigin(e.to_string()))?;
        let generations = Generations::new(&config.cache_prefix, &config.version);
        Ok(Self { config, origin, generations, cache, fetcher, state: WorkerState::Installing })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// The identifier reported over the control channel: the static
    /// generation's name.
    pub fn version(&self) -> &str {
        &self.generations.static_name
    }

    pub fn generations(&self) -> &Generations {
        &self.generations
    }

    /// Warm the static generation from the bootstrap manifest.
    ///
    /// Every entry is fetched and stored independently; a transport error,
    /// a non-2xx status, or a store failure marks that one path as failed
    /// without touching the others. The worker always ends up in
    /// `Waiting`. Runs once: the lifecycle is one-way, so installing
    /// again after the worker has left the installing state is refused.
    pub async fn install(&mut self) -> Result<InstallReport, WorkerError> {
        if self.state != WorkerState::Installing {
            return Err(WorkerError::AlreadyInstalled { state: self.state });
        }
        tracing::info!(generation = %self.generations.static_name, "installing");

        let mut report = InstallReport::default();
        for path in self.config.precache.clone() {
            match self.precache_one(&path).await {
                Ok(()) => report.cached.push(path),
                Err(reason) => {
                    tracing::warn!(path = %path, reason = %reason, "precache failed");
                    report.failed.push(InstallFailure { path, reason });
                }
            }
        }

        tracing::info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install finished"
        );
        self.state = WorkerState::Waiting;
        Ok(report)
    }

    async fn precache_one(&self, path: &str) -> Result<(), String> {
        let url = join_origin(&self.origin, path).map_err(|e| e.to_string())?;
        let request = RequestInfo::get(url);
        let response = self.fetcher.fetch(&request).await.map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("status {}", response.status));
        }
        self.store_entry(&self.generations.static_name, &request, &response)
            .await
            .map_err(|e| e.to_string())
    }

    /// Purge stale generations, then claim request handling.
    ///
    /// Runs only after install has completed; if the purge fails the
    /// worker stays in `Waiting` and can be activated again.
    pub async fn activate(&mut self) -> Result<u64, WorkerError> {
        if self.state == WorkerState::Superseded {
            return Err(WorkerError::NotActive { state: self.state });
        }

        let purged = self.cache.purge_stale_generations(&self.generations).await?;
        self.state = WorkerState::Active;
        tracing::info!(
            purged,
            generation = %self.generations.static_name,
            "worker activated"
        );
        Ok(purged)
    }

    /// Stop serving; a newer instance owns the store now.
    pub fn supersede(&mut self) {
        self.state = WorkerState::Superseded;
        tracing::info!(generation = %self.generations.static_name, "worker superseded");
    }

    /// Handle one intercepted request.
    ///
    /// Non-http(s) schemes are ignored entirely. Requests before
    /// activation (or after supersession) are refused.
    pub async fn handle_request(&self, request: &RequestInfo) -> Result<Outcome, WorkerError> {
        if !request.is_http() {
            return Ok(Outcome::Ignored);
        }
        if self.state != WorkerState::Active {
            return Err(WorkerError::NotActive { state: self.state });
        }

        let class = classify(request, &self.config.static_prefix);
        tracing::debug!(url = %request.url, class = ?class, "handling request");

        let response = match class {
            RequestClass::StaticAsset => self.cache_first(request).await?,
            RequestClass::Navigation => self.network_first_navigation(request).await?,
            RequestClass::Dynamic => self.network_first_dynamic(request).await?,
        };
        Ok(Outcome::Response(response))
    }

    /// Static assets: serve the stored entry if one exists, otherwise
    /// fetch, store into the static generation, and return. A network
    /// failure here propagates; assets are expected to be pre-cached.
    async fn cache_first(&self, request: &RequestInfo) -> Result<ServedResponse, WorkerError> {
        let key = entry_key(&request.method, request.url.as_str());

        if let Some(entry) = self.cache.get_entry(&self.generations.static_name, &key).await? {
            return Ok(served_from_entry(entry, ResponseSource::Cache));
        }

        let response = self.fetcher.fetch(request).await?;
        self.store_best_effort(&self.generations.static_name, request, &response)
            .await;
        Ok(served_from_fetch(response, ResponseSource::Network))
    }

    /// Navigations: network first, stored into the dynamic generation
    /// regardless of status. Offline, fall back to the cached entry for
    /// this key, then to the cached fallback document.
    async fn network_first_navigation(&self, request: &RequestInfo) -> Result<ServedResponse, WorkerError> {
        let key = entry_key(&request.method, request.url.as_str());

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.store_best_effort(&self.generations.dynamic_name, request, &response)
                    .await;
                Ok(served_from_fetch(response, ResponseSource::Network))
            }
            Err(err) => {
                if let Some(entry) = self.cache.get_entry_current(&self.generations, &key).await? {
                    return Ok(served_from_entry(entry, ResponseSource::Cache));
                }
                if let Some(entry) = self.fallback_document().await? {
                    return Ok(served_from_entry(entry, ResponseSource::Fallback));
                }
                tracing::warn!(url = %request.url, "offline navigation with no cached document");
                Err(err.into())
            }
        }
    }

    /// Dynamic requests: network first; only success statuses are stored,
    /// error statuses are returned uncached. Offline, fall back to the
    /// cached entry if one exists, otherwise surface the failure.
    async fn network_first_dynamic(&self, request: &RequestInfo) -> Result<ServedResponse, WorkerError> {
        let key = entry_key(&request.method, request.url.as_str());

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_best_effort(&self.generations.dynamic_name, request, &response)
                        .await;
                }
                Ok(served_from_fetch(response, ResponseSource::Network))
            }
            Err(err) => match self.cache.get_entry_current(&self.generations, &key).await? {
                Some(entry) => Ok(served_from_entry(entry, ResponseSource::Cache)),
                None => Err(err.into()),
            },
        }
    }

    async fn fallback_document(&self) -> Result<Option<CachedEntry>, WorkerError> {
        let url = match join_origin(&self.origin, &self.config.fallback_path) {
            Ok(url) => url,
            Err(_) => return Ok(None),
        };
        let key = entry_key("GET", url.as_str());
        Ok(self.cache.get_entry_current(&self.generations, &key).await?)
    }

    async fn store_entry(
        &self, generation: &str, request: &RequestInfo, response: &FetchResponse,
    ) -> Result<(), cachette_core::Error> {
        let entry = CachedEntry {
            key: entry_key(&request.method, request.url.as_str()),
            generation: generation.to_string(),
            method: request.method.clone(),
            url: request.url.to_string(),
            status: response.status,
            content_type: response.content_type.clone(),
            headers_json: serde_json::to_string(&response.headers).ok(),
            // the stored copy; the original bytes still go back to the caller
            body: response.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        self.cache.put_entry(&entry).await
    }

    async fn store_best_effort(&self, generation: &str, request: &RequestInfo, response: &FetchResponse) {
        if let Err(e) = self.store_entry(generation, request, response).await {
            tracing::warn!(url = %request.url, error = %e, "cache write failed, serving response uncached");
        }
    }
}

fn served_from_entry(entry: CachedEntry, source: ResponseSource) -> ServedResponse {
    ServedResponse {
        status: entry.status,
        content_type: entry.content_type,
        body: Bytes::from(entry.body),
        source,
    }
}

fn served_from_fetch(response: FetchResponse, source: ResponseSource) -> ServedResponse {
    ServedResponse {
        status: response.status,
        content_type: response.content_type,
        body: response.body,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cachette_client::FetchError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeFetcher {
        routes: Mutex<HashMap<String, Result<FetchResponse, FetchError>>>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self { routes: Mutex::new(HashMap::new()), calls: AtomicUsize::new(0) }
        }

        fn ok(self, url: &str, body: &[u8]) -> Self {
            self.routes.lock().unwrap().insert(
                url.to_string(),
                Ok(FetchResponse {
                    status: 200,
                    content_type: Some("text/html".to_string()),
                    headers: Vec::new(),
                    body: Bytes::copy_from_slice(body),
                    fetch_ms: 1,
                }),
            );
            self
        }

        fn failing(self, url: &str) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Err(FetchError::Network("connection refused".to_string())));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for FakeFetcher {
        async fn fetch(&self, request: &RequestInfo) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .unwrap_or_else(|| Err(FetchError::Network("no route".to_string())))
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            origin: "http://origin.test".to_string(),
            cache_prefix: "parkzen".to_string(),
            version: "v1".to_string(),
            precache: vec!["/".to_string(), "/manifest.json".to_string()],
            ..Default::default()
        }
    }

    async fn test_worker(fetcher: FakeFetcher) -> Worker {
        let cache = CacheDb::open_in_memory().await.unwrap();
        Worker::new(test_config(), cache, Arc::new(fetcher)).unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let fetcher = FakeFetcher::new()
            .ok("http://origin.test/", b"<html>")
            .ok("http://origin.test/manifest.json", b"{}");
        let mut worker = test_worker(fetcher).await;
        assert_eq!(worker.state(), WorkerState::Installing);

        let report = worker.install().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(worker.state(), WorkerState::Waiting);

        worker.activate().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Active);

        worker.supersede();
        assert_eq!(worker.state(), WorkerState::Superseded);
    }

    #[tokio::test]
    async fn test_install_reports_partial_failure() {
        let fetcher = FakeFetcher::new()
            .ok("http://origin.test/", b"<html>")
            .failing("http://origin.test/manifest.json");
        let mut worker = test_worker(fetcher).await;

        let report = worker.install().await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.requested(), 2);
        assert_eq!(report.cached, vec!["/"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "/manifest.json");

        // partial install still reaches waiting
        assert_eq!(worker.state(), WorkerState::Waiting);
    }

    #[tokio::test]
    async fn test_install_runs_once() {
        let fetcher = FakeFetcher::new()
            .ok("http://origin.test/", b"<html>")
            .ok("http://origin.test/manifest.json", b"{}");
        let mut worker = test_worker(fetcher).await;
        worker.install().await.unwrap();

        // the lifecycle is one-way: installing again is refused and the
        // state is untouched
        let result = worker.install().await;
        assert!(matches!(
            result,
            Err(WorkerError::AlreadyInstalled { state: WorkerState::Waiting })
        ));
        assert_eq!(worker.state(), WorkerState::Waiting);

        worker.activate().await.unwrap();
        let result = worker.install().await;
        assert!(matches!(
            result,
            Err(WorkerError::AlreadyInstalled { state: WorkerState::Active })
        ));
        assert_eq!(worker.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_requests_refused_before_activation() {
        let fetcher = FakeFetcher::new().ok("http://origin.test/", b"<html>");
        let mut worker = test_worker(fetcher).await;
        worker.install().await.unwrap();

        let request = RequestInfo::navigate(Url::parse("http://origin.test/").unwrap());
        let result = worker.handle_request(&request).await;
        assert!(matches!(
            result,
            Err(WorkerError::NotActive { state: WorkerState::Waiting })
        ));
    }

    #[tokio::test]
    async fn test_non_http_scheme_ignored() {
        let fetcher = FakeFetcher::new();
        let mut worker = test_worker(fetcher).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let request = RequestInfo::get(Url::parse("chrome-extension://abc/page").unwrap());
        let outcome = worker.handle_request(&request).await.unwrap();
        assert!(matches!(outcome, Outcome::Ignored));
    }

    #[tokio::test]
    async fn test_version_is_static_generation_name() {
        let fetcher = FakeFetcher::new();
        let worker = test_worker(fetcher).await;
        assert_eq!(worker.version(), "parkzen-static-v1");
    }

    #[tokio::test]
    async fn test_activation_purges_stale_generations() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let stale = CachedEntry {
            key: entry_key("GET", "http://origin.test/"),
            generation: "parkzen-static-v0".to_string(),
            method: "GET".to_string(),
            url: "http://origin.test/".to_string(),
            status: 200,
            content_type: None,
            headers_json: None,
            body: b"old".to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        cache.put_entry(&stale).await.unwrap();

        let fetcher = FakeFetcher::new().ok("http://origin.test/", b"<html>");
        let mut config = test_config();
        config.precache = vec!["/".to_string()];
        let mut worker = Worker::new(config, cache.clone(), Arc::new(fetcher)).unwrap();

        worker.install().await.unwrap();
        let purged = worker.activate().await.unwrap();
        assert_eq!(purged, 1);

        let generations = cache.list_generations().await.unwrap();
        assert_eq!(generations, vec!["parkzen-static-v1"]);
    }

    #[tokio::test]
    async fn test_static_hit_skips_network() {
        let fetcher = Arc::new(FakeFetcher::new().ok("http://origin.test/pwa-192x192.png", b"png-bytes"));
        let mut config = test_config();
        config.precache = vec![];
        let cache = CacheDb::open_in_memory().await.unwrap();
        let mut worker = Worker::new(config, cache, fetcher.clone()).unwrap();
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let url = Url::parse("http://origin.test/pwa-192x192.png").unwrap();
        let mut request = RequestInfo::get(url);
        request.destination = cachette_core::Destination::Image;

        // cold: one network fetch, stored into the static generation
        let Outcome::Response(first) = worker.handle_request(&request).await.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.body.as_ref(), b"png-bytes");
        assert_eq!(fetcher.calls(), 1);

        // warm: served from cache, no second fetch
        let Outcome::Response(second) = worker.handle_request(&request).await.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body.as_ref(), b"png-bytes");
        assert_eq!(fetcher.calls(), 1);
    }
}
