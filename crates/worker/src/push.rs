//! Push payloads and the notifications they produce.

use ringside_client::resolve;
use ringside_core::Error;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::worker::{ServiceWorker, url_error};

pub const DEFAULT_TITLE: &str = "Boxing Update";
pub const DEFAULT_BODY: &str = "New fight news is in. Tap to see what's happening in the ring.";
pub const DEFAULT_URL: &str = "/";
pub const ICON: &str = "/icons/icon-192x192.png";
pub const BADGE: &str = "/icons/icon-72x72.png";

pub const VIEW_ACTION: &str = "view";
pub const DISMISS_ACTION: &str = "dismiss";

/// Optional JSON body of a push message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse a push body. Missing or malformed bodies yield an empty payload,
    /// which renders with the brand defaults.
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return Self::default();
        };
        match serde_json::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed push payload, using defaults");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Default for Notification {
    fn default() -> Self {
        Self::from_payload(PushPayload::default())
    }
}

impl Notification {
    pub fn from_payload(payload: PushPayload) -> Self {
        let non_empty = |value: Option<String>, fallback: &str| {
            value.filter(|v| !v.trim().is_empty()).unwrap_or_else(|| fallback.to_string())
        };

        Self {
            title: non_empty(payload.title, DEFAULT_TITLE),
            body: non_empty(payload.body, DEFAULT_BODY),
            icon: ICON.into(),
            badge: BADGE.into(),
            vibrate: vec![100, 50, 100],
            data: NotificationData { url: non_empty(payload.url, DEFAULT_URL) },
            actions: vec![
                NotificationAction { action: VIEW_ACTION.into(), title: "View".into() },
                NotificationAction { action: DISMISS_ACTION.into(), title: "Dismiss".into() },
            ],
        }
    }

    /// Where a click with the given action should navigate, if anywhere.
    ///
    /// `None` and unknown actions behave like a plain click on the body.
    pub fn click_target(&self, action: Option<&str>) -> Option<&str> {
        match action {
            Some(DISMISS_ACTION) => None,
            _ => Some(self.data.url.as_str()),
        }
    }
}

impl ServiceWorker {
    /// Show the notification for a push message. Returns its id.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Result<(u64, Notification), Error> {
        let notification = Notification::from_payload(PushPayload::parse(data));
        let id = self.host().notifier.show(notification.clone()).await?;
        tracing::info!(id, title = %notification.title, "Notification shown");
        Ok((id, notification))
    }

    /// Close the notification and, unless dismissed, focus or open a window
    /// at its URL. Returns the URL navigated to.
    pub async fn handle_notification_click(&self, id: u64, action: Option<&str>) -> Result<Option<Url>, Error> {
        let notification = self
            .host()
            .notifier
            .get(id)
            .await
            .ok_or_else(|| Error::InvalidInput(format!("no notification with id {id}")))?;
        self.host().notifier.close(id).await;

        let Some(target) = notification.click_target(action) else {
            tracing::debug!(id, "Notification dismissed");
            return Ok(None);
        };
        let url = resolve(target, &self.settings().origin).map_err(url_error)?;
        let window = self.host().clients.focus_or_open(&url).await?;
        tracing::info!(id, url = %url, window = window.id, "Notification clicked");
        Ok(Some(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let notification = Notification::from_payload(PushPayload::parse(Some(b"{}".as_slice())));
        assert_eq!(notification.title, DEFAULT_TITLE);
        assert_eq!(notification.body, DEFAULT_BODY);
        assert_eq!(notification.data.url, "/");
        assert_eq!(notification.icon, ICON);
        assert_eq!(notification.badge, BADGE);
    }

    #[test]
    fn test_missing_payload_uses_defaults() {
        assert_eq!(PushPayload::parse(None), PushPayload::default());
        assert_eq!(PushPayload::parse(Some(b"".as_slice())), PushPayload::default());
    }

    #[test]
    fn test_malformed_payload_uses_defaults() {
        assert_eq!(PushPayload::parse(Some(b"not json".as_slice())), PushPayload::default());
        assert_eq!(PushPayload::parse(Some(b"[1,2,3]".as_slice())), PushPayload::default());
        assert_eq!(PushPayload::parse(Some(br#"{"title": 42}"#.as_slice())), PushPayload::default());
    }

    #[test]
    fn test_payload_fields() {
        let payload = PushPayload::parse(Some(br#"{"title":"X","url":"/fights"}"#.as_slice()));
        let notification = Notification::from_payload(payload);
        assert_eq!(notification.title, "X");
        assert_eq!(notification.body, DEFAULT_BODY);
        assert_eq!(notification.data.url, "/fights");
    }

    #[test]
    fn test_blank_fields_fall_back() {
        let payload = PushPayload::parse(Some(br#"{"title":"  ","url":""}"#.as_slice()));
        let notification = Notification::from_payload(payload);
        assert_eq!(notification.title, DEFAULT_TITLE);
        assert_eq!(notification.data.url, DEFAULT_URL);
    }

    #[test]
    fn test_actions() {
        let notification = Notification::default();
        let actions: Vec<_> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["view", "dismiss"]);
    }

    #[test]
    fn test_click_target() {
        let notification = Notification::from_payload(PushPayload { url: Some("/fights".into()), ..Default::default() });
        assert_eq!(notification.click_target(None), Some("/fights"));
        assert_eq!(notification.click_target(Some("view")), Some("/fights"));
        assert_eq!(notification.click_target(Some("dismiss")), None);
    }

    #[tokio::test]
    async fn test_push_click_opens_target() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;

        let (id, notification) = worker.handle_push(Some(br#"{"title":"X","url":"/fights"}"#.as_slice())).await.unwrap();
        assert_eq!(notification.title, "X");
        assert_eq!(harness.notifier.list().await.len(), 1);

        let opened = worker.handle_notification_click(id, None).await.unwrap();
        assert_eq!(opened, Some(url("/fights")));
        let windows = harness.clients.list().await;
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].url, format!("{ORIGIN}/fights"));
        assert!(windows[0].focused);
        assert!(harness.notifier.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_push_with_empty_object() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;

        let (id, notification) = worker.handle_push(Some(b"{}".as_slice())).await.unwrap();
        assert_eq!(notification.title, DEFAULT_TITLE);
        assert_eq!(notification.body, DEFAULT_BODY);

        let opened = worker.handle_notification_click(id, Some(VIEW_ACTION)).await.unwrap();
        assert_eq!(opened, Some(url("/")));
    }

    #[tokio::test]
    async fn test_view_focuses_existing_window() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;
        harness.clients.open(&url("/fights")).await;

        let (id, _) = worker.handle_push(Some(br#"{"url":"/fights"}"#.as_slice())).await.unwrap();
        worker.handle_notification_click(id, Some(VIEW_ACTION)).await.unwrap();
        assert_eq!(harness.clients.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dismiss_does_not_navigate() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;

        let (id, _) = worker.handle_push(Some(br#"{"url":"/fights"}"#.as_slice())).await.unwrap();
        let opened = worker.handle_notification_click(id, Some(DISMISS_ACTION)).await.unwrap();
        assert_eq!(opened, None);
        assert!(harness.clients.list().await.is_empty());
        assert!(harness.notifier.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_click_unknown_notification() {
        let harness = Harness::new().await;
        let worker = harness.activated("1.0.0").await;
        let err = worker.handle_notification_click(42, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }
}
