//! Capabilities the router borrows from whatever hosts it.
//!
//! The router never talks to windows or a notification tray directly. It goes
//! through [`Clients`] and [`Notifier`], which a host implements. The
//! in-memory implementations here back the proxy server and the tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ringside_client::Network;
use ringside_core::Error;
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use crate::push::Notification;

/// Shows and tracks notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Display a notification and return its id.
    async fn show(&self, notification: Notification) -> Result<u64, Error>;

    async fn get(&self, id: u64) -> Option<Notification>;

    async fn close(&self, id: u64);
}

/// Open windows under the router's scope.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of every already-open window.
    async fn claim(&self) -> Result<(), Error>;

    /// Focus a window already showing `url`, or open a new one at it.
    async fn focus_or_open(&self, url: &Url) -> Result<WindowClient, Error>;
}

/// A shown notification with its id.
#[derive(Debug, Clone, Serialize)]
pub struct ShownNotification {
    pub id: u64,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Debug, Default)]
pub struct NotificationCenter {
    next_id: AtomicU64,
    shown: Mutex<BTreeMap<u64, Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently displayed notifications, oldest first.
    pub async fn list(&self) -> Vec<ShownNotification> {
        self.shown
            .lock()
            .await
            .iter()
            .map(|(id, notification)| ShownNotification { id: *id, notification: notification.clone() })
            .collect()
    }
}

#[async_trait]
impl Notifier for NotificationCenter {
    async fn show(&self, notification: Notification) -> Result<u64, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.shown.lock().await.insert(id, notification);
        Ok(id)
    }

    async fn get(&self, id: u64) -> Option<Notification> {
        self.shown.lock().await.get(&id).cloned()
    }

    async fn close(&self, id: u64) {
        self.shown.lock().await.remove(&id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowClient {
    pub id: u64,
    pub url: String,
    pub focused: bool,
    /// Whether the router controls this window.
    pub controlled: bool,
}

#[derive(Debug, Default)]
pub struct WindowClients {
    next_id: AtomicU64,
    windows: Mutex<Vec<WindowClient>>,
}

impl WindowClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window that was opened outside the router (uncontrolled).
    pub async fn open(&self, url: &Url) -> WindowClient {
        let mut windows = self.windows.lock().await;
        let window = WindowClient {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            url: url.to_string(),
            focused: false,
            controlled: false,
        };
        windows.push(window.clone());
        window
    }

    pub async fn list(&self) -> Vec<WindowClient> {
        self.windows.lock().await.clone()
    }
}

#[async_trait]
impl Clients for WindowClients {
    async fn claim(&self) -> Result<(), Error> {
        let mut windows = self.windows.lock().await;
        for window in windows.iter_mut() {
            window.controlled = true;
        }
        Ok(())
    }

    async fn focus_or_open(&self, url: &Url) -> Result<WindowClient, Error> {
        let mut windows = self.windows.lock().await;
        for window in windows.iter_mut() {
            window.focused = false;
        }

        if let Some(window) = windows.iter_mut().find(|w| w.url == url.as_str()) {
            window.focused = true;
            return Ok(window.clone());
        }

        let window = WindowClient {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            url: url.to_string(),
            focused: true,
            controlled: true,
        };
        windows.push(window.clone());
        Ok(window)
    }
}

/// Everything a router needs from outside itself.
#[derive(Clone)]
pub struct Host {
    pub network: Arc<dyn Network>,
    pub clients: Arc<dyn Clients>,
    pub notifier: Arc<dyn Notifier>,
}

impl Host {
    pub fn new(network: Arc<dyn Network>, clients: Arc<dyn Clients>, notifier: Arc<dyn Notifier>) -> Self {
        Self { network, clients, notifier }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
