//! Background sync.
//!
//! A sync tag is redeemed when connectivity returns. Each handler either
//! finishes its whole job or fails with [`Error::SyncFailed`] so the host
//! can deliver the tag again later. Queued work is only removed from the
//! outbox once the network accepted it.

use std::fmt;
use std::str::FromStr;

use futures::future::join_all;
use ringside_client::resolve;
use ringside_core::cache::{ANALYTICS_QUEUE, USER_ACTIONS_QUEUE};
use ringside_core::{Error, OutboxEntry, Request};
use serde::Serialize;
use serde_json::json;
use url::Url;

use crate::partitions::PartitionKind;
use crate::worker::ServiceWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
    /// Refresh the cached API responses.
    ContentSync,
    /// Flush queued analytics events in one batch.
    AnalyticsSync,
    /// Replay queued user actions in order.
    UserActionsSync,
}

impl SyncTag {
    pub const ALL: [SyncTag; 3] = [SyncTag::ContentSync, SyncTag::AnalyticsSync, SyncTag::UserActionsSync];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncTag::ContentSync => "content-sync",
            SyncTag::AnalyticsSync => "analytics-sync",
            SyncTag::UserActionsSync => "user-actions-sync",
        }
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| Error::UnknownSyncTag(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub tag: String,
    /// URLs refreshed or queued entries delivered.
    pub processed: usize,
}

/// Status codes after which a replay is worth retrying later.
fn is_retryable(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

impl ServiceWorker {
    pub async fn handle_sync(&self, tag: SyncTag) -> Result<SyncOutcome, Error> {
        tracing::info!(%tag, "Sync started");
        let result = match tag {
            SyncTag::ContentSync => self.sync_content().await,
            SyncTag::AnalyticsSync => self.sync_analytics().await,
            SyncTag::UserActionsSync => self.sync_user_actions().await,
        };

        match result {
            Ok(processed) => {
                tracing::info!(%tag, processed, "Sync complete");
                Ok(SyncOutcome { tag: tag.to_string(), processed })
            }
            Err(e) => {
                tracing::warn!(%tag, error = %e, "Sync failed");
                Err(match e {
                    Error::SyncFailed { .. } => e,
                    other => Error::SyncFailed { tag: tag.to_string(), reason: other.to_string() },
                })
            }
        }
    }

    async fn sync_content(&self) -> Result<usize, Error> {
        let partition = self.partition(PartitionKind::Dynamic);

        let mut urls: Vec<Url> = Vec::new();
        for key in partition.keys().await? {
            match Url::parse(&key) {
                Ok(url) => urls.push(url),
                Err(e) => tracing::warn!(url = %key, error = %e, "Skipping unparsable cached URL"),
            }
        }
        for endpoint in &self.settings().content_endpoints {
            if !urls.contains(endpoint) {
                urls.push(endpoint.clone());
            }
        }

        let refreshes = urls.iter().map(|url| {
            let partition = &partition;
            async move {
                let request = Request::get(url.clone());
                let response = self.host().network.fetch(&request).await?;
                if !response.ok() {
                    return Err(Error::Network(format!("{url} returned {}", response.status)));
                }
                partition.put(&request, &response).await?;
                Ok(())
            }
        });

        let failures: Vec<String> = join_all(refreshes)
            .await
            .into_iter()
            .filter_map(|result| result.err().map(|e| e.to_string()))
            .collect();

        if !failures.is_empty() {
            return Err(Error::SyncFailed {
                tag: SyncTag::ContentSync.to_string(),
                reason: format!("{} of {} refreshes failed: {}", failures.len(), urls.len(), failures.join("; ")),
            });
        }
        Ok(urls.len())
    }

    async fn sync_analytics(&self) -> Result<usize, Error> {
        let pending = self.storage().pending(ANALYTICS_QUEUE).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let events: Vec<serde_json::Value> = pending.iter().map(analytics_event).collect();
        let body = serde_json::to_vec(&json!({ "events": events })).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let request = Request::get(self.settings().analytics_endpoint.clone())
            .with_method("POST")
            .with_header("content-type", "application/json")
            .with_body(body);

        let response = self.host().network.fetch(&request).await?;
        if !response.ok() {
            return Err(Error::Network(format!("{} returned {}", request.url, response.status)));
        }

        let ids: Vec<i64> = pending.iter().map(|entry| entry.id).collect();
        self.storage().acknowledge(&ids).await?;
        Ok(ids.len())
    }

    async fn sync_user_actions(&self) -> Result<usize, Error> {
        let mut replayed = 0;

        for entry in self.storage().pending(USER_ACTIONS_QUEUE).await? {
            let origin = &self.settings().origin;
            let url = match resolve(&entry.url, origin) {
                Ok(url) if url.origin() == origin.origin() => url,
                Ok(url) => {
                    tracing::warn!(id = entry.id, url = %url, "Dropping action aimed at another origin");
                    self.storage().acknowledge(&[entry.id]).await?;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(id = entry.id, url = %entry.url, error = %e, "Dropping unreplayable action");
                    self.storage().acknowledge(&[entry.id]).await?;
                    continue;
                }
            };

            let mut request = Request::get(url).with_method(entry.method.as_str());
            if let Some(content_type) = &entry.content_type {
                request = request.with_header("content-type", content_type.as_str());
            }
            if let Some(body) = &entry.body {
                request = request.with_body(body.clone());
            }

            let response = self.host().network.fetch(&request).await?;
            if is_retryable(response.status) {
                return Err(Error::SyncFailed {
                    tag: SyncTag::UserActionsSync.to_string(),
                    reason: format!("{} returned {} after {replayed} replayed", request.url, response.status),
                });
            }
            if !response.ok() {
                tracing::warn!(id = entry.id, url = %request.url, status = response.status, "Action rejected");
            }

            self.storage().acknowledge(&[entry.id]).await?;
            replayed += 1;
        }
        Ok(replayed)
    }
}

/// One analytics event as sent in the batch.
fn analytics_event(entry: &OutboxEntry) -> serde_json::Value {
    let payload = entry
        .body
        .as_ref()
        .and_then(|body| serde_json::from_slice::<serde_json::Value>(body).ok())
        .unwrap_or(serde_json::Value::Null);
    json!({
        "url": entry.url,
        "enqueued_at": entry.enqueued_at,
        "payload": payload,
    })
}
