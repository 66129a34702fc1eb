//! Which worker controls the origin.
//!
//! A [`Registration`] installs and activates new versions and keeps the
//! previous version in control when an install fails. The version in
//! control is persisted, so a restarted host can resume it without
//! fetching anything.

use std::sync::Arc;

use ringside_core::{AppConfig, CacheStorage, Error};
use tokio::sync::RwLock;

use crate::events::{Dispatcher, Event, EventOutcome};
use crate::host::Host;
use crate::lifetime::ExtendableEvent;
use crate::worker::{SCOPE, ServiceWorker, WorkerState};

#[derive(Debug)]
pub struct Registration {
    storage: CacheStorage,
    host: Host,
    dispatcher: &'static Dispatcher,
    active: RwLock<Option<Arc<ServiceWorker>>>,
}

impl Registration {
    pub fn new(storage: CacheStorage, host: Host) -> Self {
        Self { storage, host, dispatcher: Dispatcher::global(), active: RwLock::new(None) }
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// The worker currently in control, if any.
    pub async fn controller(&self) -> Option<Arc<ServiceWorker>> {
        self.active.read().await.clone()
    }

    /// Install the version in `config` and let it take control.
    ///
    /// If the install fails the new worker is discarded. When nothing is in
    /// control yet, the version recorded as active is resumed so the
    /// previous deployment keeps serving.
    pub async fn update(&self, config: &AppConfig) -> Result<Arc<ServiceWorker>, Error> {
        let worker = Arc::new(ServiceWorker::new(config, self.storage.clone(), self.host.clone())?);
        tracing::info!(version = %worker.version(), "Updating registration");

        match self.install_and_activate(&worker).await {
            Ok(()) if worker.state() == WorkerState::Activated => {
                let previous = self.active.write().await.replace(Arc::clone(&worker));
                if let Some(previous) = previous {
                    previous.retire();
                }
                Ok(worker)
            }
            Ok(()) => {
                tracing::info!(version = %worker.version(), "Installed, waiting to activate");
                Ok(worker)
            }
            Err(e) => {
                if self.controller().await.is_none() {
                    match self.restore(config).await {
                        Ok(Some(previous)) => {
                            tracing::info!(version = %previous.version(), "Previous version remains in control");
                        }
                        Ok(None) => {}
                        Err(restore_err) => {
                            tracing::warn!(error = %restore_err, "Could not resume the previous version");
                        }
                    }
                }
                Err(e)
            }
        }
    }

    async fn install_and_activate(&self, worker: &Arc<ServiceWorker>) -> Result<(), Error> {
        self.dispatcher.dispatch_and_settle(worker, Event::Install).await?;
        if worker.skip_waiting_requested() {
            self.dispatcher.dispatch_and_settle(worker, Event::Activate).await?;
        }
        Ok(())
    }

    /// Resume the version recorded as active.
    ///
    /// `config` supplies everything but the version. Returns `None` when no
    /// version was ever activated.
    pub async fn restore(&self, config: &AppConfig) -> Result<Option<Arc<ServiceWorker>>, Error> {
        let Some(version) = self.storage.active_version(SCOPE).await? else {
            return Ok(None);
        };

        let recorded = AppConfig { version, ..config.clone() };
        let worker = Arc::new(ServiceWorker::new(&recorded, self.storage.clone(), self.host.clone())?);
        worker.resume().await?;
        tracing::info!(version = %worker.version(), "Resumed active version");

        *self.active.write().await = Some(Arc::clone(&worker));
        Ok(Some(worker))
    }

    /// Deliver an event to the worker in control.
    ///
    /// Without a controller, fetches go straight to the network and every
    /// other event is rejected.
    pub async fn dispatch(&self, event: Event, extendable: &ExtendableEvent) -> Result<EventOutcome, Error> {
        if let Some(worker) = self.controller().await {
            return self.dispatcher.dispatch(&worker, event, extendable).await;
        }

        match event {
            Event::Fetch(request) => self.host.network.fetch(&request).await.map(EventOutcome::Response),
            other => Err(Error::InvalidState {
                expected: "an active worker".into(),
                actual: format!("no worker to receive {}", other.kind()),
            }),
        }
    }

    /// Like [`Registration::dispatch`], waiting for extended work.
    pub async fn dispatch_and_settle(&self, event: Event) -> Result<EventOutcome, Error> {
        let extendable = ExtendableEvent::new();
        let outcome = self.dispatch(event, &extendable).await;
        extendable.settled().await;
        outcome
    }
}
