//! The offline cache router for one deployed version.
//!
//! A [`ServiceWorker`] owns the three partitions of its version, the
//! compiled classification rules and a view of its host. It moves through
//! the lifecycle in [`WorkerState`] order and only routes fetches through
//! the caching strategies once activated.

mod lifecycle;
mod strategy;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ringside_client::{UrlError, resolve, resolve_all};
use ringside_core::{AppConfig, CacheStorage, Error, Partition};
use serde::Serialize;
use url::Url;

use crate::host::Host;
use crate::partitions::{PartitionKind, PartitionNames};
use crate::rules::RuleSet;

/// Registration scope. The router controls every path of the origin.
pub const SCOPE: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed or a newer version took over.
    Redundant,
}

impl WorkerState {
    /// Only an activated worker routes fetches through its strategies.
    pub fn can_intercept_fetch(self) -> bool {
        self == WorkerState::Activated
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Configuration of one worker, with every URL resolved against the origin.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub version: String,
    pub origin: Url,
    pub static_manifest: Vec<Url>,
    pub critical_content: Vec<Url>,
    pub content_endpoints: Vec<Url>,
    pub analytics_endpoint: Url,
    pub offline_shell: Url,
    pub network_first_timeout: Duration,
}

pub(crate) fn url_error(err: UrlError) -> Error {
    Error::InvalidUrl(err.to_string())
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;

        Ok(Self {
            version: config.version.clone(),
            static_manifest: resolve_all(&config.static_manifest, &origin).map_err(url_error)?,
            critical_content: resolve_all(&config.critical_content, &origin).map_err(url_error)?,
            content_endpoints: resolve_all(&config.content_endpoints, &origin).map_err(url_error)?,
            analytics_endpoint: resolve(&config.analytics_endpoint, &origin).map_err(url_error)?,
            offline_shell: resolve(&config.offline_shell, &origin).map_err(url_error)?,
            network_first_timeout: config.network_first_timeout(),
            origin,
        })
    }
}

pub struct ServiceWorker {
    settings: WorkerSettings,
    rules: RuleSet,
    names: PartitionNames,
    storage: CacheStorage,
    host: Host,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("version", &self.settings.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Build a worker for the version named in `config`. Nothing is
    /// fetched or stored until [`ServiceWorker::install`].
    pub fn new(config: &AppConfig, storage: CacheStorage, host: Host) -> Result<Self, Error> {
        Ok(Self {
            settings: WorkerSettings::from_config(config)?,
            rules: RuleSet::from_config(config)?,
            names: PartitionNames::new(config.cache_base_name()),
            storage,
            host,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn version(&self) -> &str {
        &self.settings.version
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn names(&self) -> &PartitionNames {
        &self.names
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn state(&self) -> WorkerState {
        *self.lock_state()
    }

    /// Whether install asked to take control without waiting for old
    /// clients to close.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Mark a superseded worker.
    pub fn retire(&self) {
        self.set_state(WorkerState::Redundant);
    }

    pub(crate) fn partition(&self, kind: PartitionKind) -> Partition {
        self.storage.partition(&self.names.name(kind))
    }

    // the guarded value is Copy, so a poisoned lock still holds a whole state
    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_change(&self, previous: WorkerState, next: WorkerState) {
        if previous != next {
            tracing::info!(version = %self.settings.version, from = %previous, to = %next, "Worker state changed");
        }
    }

    fn set_state(&self, next: WorkerState) {
        let previous = std::mem::replace(&mut *self.lock_state(), next);
        self.log_change(previous, next);
    }

    /// Move to `next` if the current state is one of `allowed`.
    fn transition(&self, allowed: &[WorkerState], next: WorkerState) -> Result<WorkerState, Error> {
        let current = {
            let mut state = self.lock_state();
            let current = *state;
            if !allowed.contains(&current) {
                let expected = allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(" or ");
                return Err(Error::InvalidState { expected, actual: current.to_string() });
            }
            *state = next;
            current
        };
        self.log_change(current, next);
        Ok(current)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Doubles shared by the router tests.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use ringside_client::Network;
    use ringside_core::{AppConfig, CacheStorage, Error, Request, Response};

    use super::ServiceWorker;
    use crate::host::{Host, NotificationCenter, WindowClients};

    pub const ORIGIN: &str = "http://champ.example";

    #[derive(Clone)]
    enum Reply {
        Respond { status: u16, body: &'static str, delay: Duration },
        Fail,
    }

    /// Scripted network. Unscripted URLs fail like an unreachable host.
    #[derive(Default)]
    pub struct MockNetwork {
        replies: Mutex<HashMap<String, Reply>>,
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl MockNetwork {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn respond(&self, url: &str, status: u16, body: &'static str) {
            self.respond_after(url, status, body, Duration::ZERO);
        }

        pub fn respond_after(&self, url: &str, status: u16, body: &'static str, delay: Duration) {
            self.replies.lock().unwrap().insert(url.to_string(), Reply::Respond { status, body, delay });
        }

        pub fn fail(&self, url: &str) {
            self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail);
        }

        /// Answer every URL of the default manifest and critical content.
        pub fn serve_site(&self) {
            let config = AppConfig::default();
            for path in config.static_manifest.iter().chain(&config.critical_content) {
                let url = if path.starts_with("http") { path.clone() } else { format!("{ORIGIN}{path}") };
                self.respond(&url, 200, "site");
            }
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|(_, u, _)| u == url).count()
        }

        /// Every request as (method, url, body).
        pub fn requests(&self) -> Vec<(String, String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, Error> {
            let url = request.url.to_string();
            let body = request.body.as_ref().map(|b| String::from_utf8_lossy(b).into_owned());
            self.calls.lock().unwrap().push((request.method.clone(), url.clone(), body));

            let reply = self.replies.lock().unwrap().get(&url).cloned();
            match reply {
                Some(Reply::Respond { status, body, delay }) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(Response::new(url, status, body).with_header("content-type", "text/plain"))
                }
                Some(Reply::Fail) | None => Err(Error::Network(format!("{url}: connection refused"))),
            }
        }
    }

    pub struct Harness {
        pub network: Arc<MockNetwork>,
        pub clients: Arc<WindowClients>,
        pub notifier: Arc<NotificationCenter>,
        pub storage: CacheStorage,
    }

    impl Harness {
        pub async fn new() -> Self {
            Self {
                network: MockNetwork::new(),
                clients: Arc::new(WindowClients::new()),
                notifier: Arc::new(NotificationCenter::new()),
                storage: CacheStorage::open_in_memory().await.unwrap(),
            }
        }

        pub fn host(&self) -> Host {
            Host::new(self.network.clone(), self.clients.clone(), self.notifier.clone())
        }

        pub fn config(version: &str) -> AppConfig {
            AppConfig {
                version: version.into(),
                origin: ORIGIN.into(),
                network_first_timeout_ms: 200,
                ..Default::default()
            }
        }

        pub fn worker(&self, config: &AppConfig) -> Arc<ServiceWorker> {
            Arc::new(ServiceWorker::new(config, self.storage.clone(), self.host()).unwrap())
        }

        /// An installed and activated worker for `version`.
        pub async fn activated(&self, version: &str) -> Arc<ServiceWorker> {
            self.network.serve_site();
            let worker = self.worker(&Self::config(version));
            worker.install().await.unwrap();
            worker.activate().await.unwrap();
            worker
        }
    }

    pub fn url(path: &str) -> url::Url {
        url::Url::parse(&format!("{ORIGIN}{path}")).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_settings_resolve_against_origin() {
        let settings = WorkerSettings::from_config(&Harness::config("1.0.0")).unwrap();
        assert_eq!(settings.offline_shell.as_str(), "http://champ.example/");
        assert_eq!(settings.analytics_endpoint.as_str(), "http://champ.example/api/analytics");
        assert!(settings.static_manifest.iter().any(|u| u.as_str() == "http://champ.example/static/js/bundle.js"));
        assert!(settings.static_manifest.iter().any(|u| u.host_str() == Some("fonts.googleapis.com")));
        assert_eq!(settings.network_first_timeout, Duration::from_millis(200));
    }

    #[test]
    fn test_settings_reject_bad_manifest_entry() {
        let config = AppConfig { static_manifest: vec!["ftp://champ.example/file".into()], ..Harness::config("1.0.0") };
        assert!(matches!(WorkerSettings::from_config(&config), Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_new_worker_is_parsed() {
        let harness = Harness::new().await;
        let worker = harness.worker(&Harness::config("1.0.0"));
        assert_eq!(worker.state(), WorkerState::Parsed);
        assert!(!worker.skip_waiting_requested());
        assert_eq!(worker.names().name(PartitionKind::Static), "boxer-site-v1.0.0-static");
    }

    #[tokio::test]
    async fn test_transition_rejects_wrong_state() {
        let harness = Harness::new().await;
        let worker = harness.worker(&Harness::config("1.0.0"));
        let err = worker.transition(&[WorkerState::Installed], WorkerState::Activating).unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(err.to_string().contains("expected installed, got parsed"));
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_retire_marks_redundant() {
        let harness = Harness::new().await;
        let worker = harness.worker(&Harness::config("1.0.0"));
        worker.retire();
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(!worker.state().can_intercept_fetch());
    }
}
