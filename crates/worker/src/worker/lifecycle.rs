//! Install and activate.

use futures::future::{join_all, try_join_all};
use ringside_core::{Error, Partition, Request, Response};
use url::Url;

use super::{SCOPE, ServiceWorker, WorkerState};
use crate::partitions::PartitionKind;

impl ServiceWorker {
    /// Populate the static partition from the manifest and warm critical
    /// content.
    ///
    /// The manifest is all-or-nothing: every URL is fetched before anything
    /// is written, and a single failure fails the install and leaves the
    /// worker redundant. Warming is best effort.
    ///
    /// All three partitions of the version are created here; writes to a
    /// partition that does not exist are dropped. A failed install removes
    /// them again unless this version is the one recorded as active.
    pub async fn install(&self) -> Result<(), Error> {
        self.transition(&[WorkerState::Parsed], WorkerState::Installing)?;

        match self.run_install().await {
            Ok(cached) => {
                tracing::info!(version = %self.version(), cached, "Install complete");
                self.skip_waiting.store(true, std::sync::atomic::Ordering::Release);
                self.set_state(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(version = %self.version(), error = %e, "Install failed");
                self.set_state(WorkerState::Redundant);
                if let Err(cleanup) = self.discard_partitions().await {
                    tracing::warn!(version = %self.version(), error = %cleanup, "Failed to remove partitions of failed install");
                }
                Err(e)
            }
        }
    }

    async fn run_install(&self) -> Result<usize, Error> {
        for name in self.names.all() {
            self.storage.open_partition(&name).await?;
        }
        let static_partition = self.partition(PartitionKind::Static);
        let (precached, ()) = tokio::join!(self.precache(&static_partition), self.warm_critical_content());
        precached
    }

    /// Delete this version's partitions, unless it is the active version.
    async fn discard_partitions(&self) -> Result<(), Error> {
        if self.storage.active_version(SCOPE).await?.as_deref() == Some(self.version()) {
            return Ok(());
        }
        for name in self.names.all() {
            if self.storage.delete_partition(&name).await? {
                tracing::debug!(partition = %name, "Deleted partition of failed install");
            }
        }
        Ok(())
    }

    async fn precache(&self, partition: &Partition) -> Result<usize, Error> {
        let fetches = self.settings.static_manifest.iter().map(|url| self.fetch_manifest_entry(url));
        let entries = try_join_all(fetches).await?;
        partition.put_all(&entries).await?;
        Ok(entries.len())
    }

    async fn fetch_manifest_entry(&self, url: &Url) -> Result<(Request, Response), Error> {
        let request = Request::get(url.clone());
        let response = self
            .host
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed { url: url.to_string(), reason: e.to_string() })?;

        if !response.ok() {
            return Err(Error::InstallFailed { url: url.to_string(), reason: format!("status {}", response.status) });
        }
        Ok((request, response))
    }

    async fn warm_critical_content(&self) {
        let partition = self.partition(PartitionKind::Images);
        let warms = self.settings.critical_content.iter().map(|url| {
            let partition = &partition;
            async move {
                let request = Request::get(url.clone());
                match self.host.network.fetch(&request).await {
                    Ok(response) if response.ok() => match partition.put(&request, &response).await {
                        Ok(true) => {}
                        Ok(false) => tracing::debug!(url = %url, "Images partition gone, critical content dropped"),
                        Err(e) => tracing::warn!(url = %url, error = %e, "Failed to store critical content"),
                    },
                    Ok(response) => {
                        tracing::warn!(url = %url, status = response.status, "Critical content not cached");
                    }
                    Err(e) => tracing::warn!(url = %url, error = %e, "Critical content not cached"),
                }
            }
        });
        join_all(warms).await;
    }

    /// Delete every partition that does not belong to this version, claim
    /// open clients and record this version as active.
    ///
    /// Activating an already active worker repeats the eviction and changes
    /// nothing else. Returns the names of the deleted partitions.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let previous = self.transition(&[WorkerState::Installed, WorkerState::Activated], WorkerState::Activating)?;

        match self.run_activate().await {
            Ok(evicted) => {
                tracing::info!(version = %self.version(), evicted = evicted.len(), "Activation complete");
                self.set_state(WorkerState::Activated);
                Ok(evicted)
            }
            Err(e) => {
                tracing::warn!(version = %self.version(), error = %e, "Activation failed");
                self.set_state(previous);
                Err(e)
            }
        }
    }

    async fn run_activate(&self) -> Result<Vec<String>, Error> {
        let evicted = self.evict_stale_partitions().await?;
        self.host.clients.claim().await?;
        self.storage.set_active_version(SCOPE, self.version()).await?;
        Ok(evicted)
    }

    async fn evict_stale_partitions(&self) -> Result<Vec<String>, Error> {
        let mut evicted = Vec::new();
        for name in self.storage.partition_names().await? {
            if self.names.is_current(&name) {
                continue;
            }
            if self.storage.delete_partition(&name).await? {
                tracing::info!(partition = %name, "Deleted stale partition");
                evicted.push(name);
            }
        }
        Ok(evicted)
    }

    /// Take control again as an already activated version, e.g. after a
    /// restart or when a newer version failed to install.
    pub async fn resume(&self) -> Result<(), Error> {
        let name = self.names.name(PartitionKind::Static);
        if !self.storage.partition(&name).is_ready().await? {
            return Err(Error::CacheMiss(format!("partition {name} was never populated")));
        }
        self.transition(&[WorkerState::Parsed], WorkerState::Activated)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::testing::*;
    use super::*;
    use crate::lifetime::ExtendableEvent;
    use ringside_core::AppConfig;

    #[tokio::test]
    async fn test_install_caches_every_manifest_url() {
        let harness = Harness::new().await;
        harness.network.serve_site();
        let worker = harness.worker(&Harness::config("1.0.0"));

        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
        assert!(worker.skip_waiting_requested());

        let static_partition = worker.partition(PartitionKind::Static);
        assert!(static_partition.is_ready().await.unwrap());
        for url in &worker.settings().static_manifest {
            let cached = static_partition.match_request(&Request::get(url.clone())).await.unwrap();
            assert!(cached.is_some(), "{url} not cached");
        }

        let images = worker.partition(PartitionKind::Images);
        assert_eq!(images.keys().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_install_fails_atomically() {
        let harness = Harness::new().await;
        harness.network.respond(&format!("{ORIGIN}/"), 200, "home");
        harness.network.fail(&format!("{ORIGIN}/about"));
        let config = AppConfig { static_manifest: vec!["/".into(), "/about".into()], ..Harness::config("1.0.0") };
        let worker = harness.worker(&config);

        let err = worker.install().await.unwrap_err();
        assert_eq!(err.code(), "INSTALL_FAILED");
        assert!(err.to_string().contains("/about"));
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(!worker.skip_waiting_requested());

        let static_partition = worker.partition(PartitionKind::Static);
        assert!(!static_partition.is_ready().await.unwrap());
        assert!(static_partition.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_fails_on_error_status() {
        let harness = Harness::new().await;
        harness.network.respond(&format!("{ORIGIN}/"), 200, "home");
        harness.network.respond(&format!("{ORIGIN}/about"), 404, "missing");
        let config = AppConfig { static_manifest: vec!["/".into(), "/about".into()], ..Harness::config("1.0.0") };
        let worker = harness.worker(&config);

        let err = worker.install().await.unwrap_err();
        assert!(err.to_string().contains("status 404"));
        assert!(worker.partition(PartitionKind::Static).keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_creates_every_partition() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;
        assert_eq!(harness.storage.partition_names().await.unwrap(), worker.names().all());
    }

    #[tokio::test]
    async fn test_failed_install_discards_its_partitions() {
        let harness = Harness::new().await;
        let current = harness.activated("1.0.0").await;

        harness.network.fail(&format!("{ORIGIN}/about"));
        let broken = AppConfig { static_manifest: vec!["/".into(), "/about".into()], ..Harness::config("1.1.0") };
        harness.worker(&broken).install().await.unwrap_err();

        assert_eq!(harness.storage.partition_names().await.unwrap(), current.names().all());
    }

    #[tokio::test]
    async fn test_failed_reinstall_keeps_active_partitions() {
        let harness = Harness::new().await;
        let current = harness.activated("1.0.0").await;

        harness.network.fail(&format!("{ORIGIN}/favicon.ico"));
        harness.worker(&Harness::config("1.0.0")).install().await.unwrap_err();

        assert_eq!(harness.storage.partition_names().await.unwrap(), current.names().all());
        assert!(current.partition(PartitionKind::Static).is_ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_warm_failure_does_not_fail_install() {
        let harness = Harness::new().await;
        harness.network.serve_site();
        harness.network.fail(&format!("{ORIGIN}/images/hero-boxer.jpg"));
        harness.network.respond(&format!("{ORIGIN}/images/championship-belt.png"), 500, "oops");
        let worker = harness.worker(&Harness::config("1.0.0"));

        worker.install().await.unwrap();
        let images = worker.partition(PartitionKind::Images).keys().await.unwrap();
        assert_eq!(images, vec![format!("{ORIGIN}/images/fight-night-poster.jpg")]);
    }

    #[tokio::test]
    async fn test_install_twice_is_rejected() {
        let harness = Harness::new().await;
        harness.network.serve_site();
        let worker = harness.worker(&Harness::config("1.0.0"));
        worker.install().await.unwrap();

        let err = worker.install().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(worker.state(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let harness = Harness::new().await;
        let worker = harness.worker(&Harness::config("1.0.0"));
        let err = worker.activate().await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_activate_evicts_previous_version() {
        let harness = Harness::new().await;
        let old = harness.activated("1.0.0").await;
        old.partition(PartitionKind::Dynamic)
            .put(&Request::get(url("/api/fights")), &Response::new(format!("{ORIGIN}/api/fights"), 200, "[]"))
            .await
            .unwrap();
        harness.storage.open_partition("unrelated-cache").await.unwrap();

        let new = harness.worker(&Harness::config("1.1.0"));
        new.install().await.unwrap();
        let mut evicted = new.activate().await.unwrap();
        evicted.sort();

        assert_eq!(
            evicted,
            vec![
                "boxer-site-v1.0.0-dynamic".to_string(),
                "boxer-site-v1.0.0-images".to_string(),
                "boxer-site-v1.0.0-static".to_string(),
                "unrelated-cache".to_string(),
            ]
        );
        for name in harness.storage.partition_names().await.unwrap() {
            assert!(new.names().is_current(&name), "{name} survived activation");
        }
        assert_eq!(harness.storage.active_version(SCOPE).await.unwrap().as_deref(), Some("1.1.0"));
    }

    #[tokio::test]
    async fn test_late_revalidation_does_not_revive_evicted_partition() {
        let harness = Harness::new().await;
        let old = harness.activated("1.0.0").await;
        let photo = format!("{ORIGIN}/gallery/round-3.webp");
        harness.network.respond(&photo, 200, "round 3");
        old.handle_fetch(Request::get(url("/gallery/round-3.webp")), &ExtendableEvent::new()).await.unwrap();

        // the old worker serves from cache and revalidates slowly
        harness.network.respond_after(&photo, 200, "round 3 again", Duration::from_millis(300));
        let event = ExtendableEvent::new();
        let cached = old.handle_fetch(Request::get(url("/gallery/round-3.webp")), &event).await.unwrap();
        assert_eq!(cached.body.as_ref(), b"round 3");

        let new = harness.worker(&Harness::config("1.1.0"));
        new.install().await.unwrap();
        let evicted = new.activate().await.unwrap();
        assert!(evicted.contains(&"boxer-site-v1.0.0-images".to_string()));
        old.retire();

        event.settled().await;
        assert_eq!(harness.network.calls(&photo), 2);
        for name in harness.storage.partition_names().await.unwrap() {
            assert!(new.names().is_current(&name), "{name} survived activation");
        }
        assert!(harness.storage.match_any(&Request::get(url("/gallery/round-3.webp"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;
        let before = harness.storage.partition_names().await.unwrap();

        let evicted = worker.activate().await.unwrap();
        assert!(evicted.is_empty());
        assert_eq!(harness.storage.partition_names().await.unwrap(), before);
        assert_eq!(worker.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_claims_clients() {
        let harness = Harness::new().await;
        harness.clients.open(&url("/fights")).await;
        harness.activated("1.0.0").await;
        assert!(harness.clients.list().await.iter().all(|w| w.controlled));
    }

    #[tokio::test]
    async fn test_resume_requires_populated_partition() {
        let harness = Harness::new().await;
        let worker = harness.worker(&Harness::config("1.0.0"));
        let err = worker.resume().await.unwrap_err();
        assert_eq!(err.code(), "CACHE_MISS");
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_resume_after_restart() {
        let harness = Harness::new().await;
        harness.activated("1.0.0").await;

        let restarted = harness.worker(&Harness::config("1.0.0"));
        restarted.resume().await.unwrap();
        assert_eq!(restarted.state(), WorkerState::Activated);
    }
}
