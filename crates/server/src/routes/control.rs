//! Control endpoints: dispatch non-fetch events and inspect router state.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use bytes::Bytes;
use ringside_client::resolve;
use ringside_core::cache::{ANALYTICS_QUEUE, NewOutboxEntry, PartitionInfo, USER_ACTIONS_QUEUE};
use ringside_worker::{Event, EventOutcome, ShownNotification, SyncOutcome, WindowClient, WorkerState};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct HealthOutput {
    pub status: &'static str,
    /// Version in control, if any.
    pub version: Option<String>,
    pub state: Option<WorkerState>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickRequest {
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClickOutput {
    pub navigated: Option<String>,
}

/// A request to defer until the queue's sync tag is redeemed.
#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub url: String,
    pub method: Option<String>,
    /// JSON body sent when the entry is delivered.
    pub body: Option<serde_json::Value>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueOutput {
    pub id: i64,
    pub queue: String,
}

fn unexpected(outcome: &EventOutcome) -> ApiError {
    ApiError::Router(ringside_core::Error::InvalidInput(format!("unexpected outcome {outcome:?}")))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthOutput> {
    let controller = state.registration.controller().await;
    Json(HealthOutput {
        status: "ok",
        version: controller.as_ref().map(|worker| worker.version().to_string()),
        state: controller.map(|worker| worker.state()),
    })
}

pub async fn sync(State(state): State<AppState>, Path(tag): Path<String>) -> Result<Json<SyncOutcome>, ApiError> {
    match state.registration.dispatch_and_settle(Event::Sync { tag }).await? {
        EventOutcome::Synced(outcome) => Ok(Json(outcome)),
        other => Err(unexpected(&other)),
    }
}

pub async fn push(State(state): State<AppState>, body: Bytes) -> Result<Json<ShownNotification>, ApiError> {
    let data = (!body.is_empty()).then_some(body);
    match state.registration.dispatch_and_settle(Event::Push { data }).await? {
        EventOutcome::NotificationShown { id, notification } => Ok(Json(ShownNotification { id, notification })),
        other => Err(unexpected(&other)),
    }
}

pub async fn notifications(State(state): State<AppState>) -> Json<Vec<ShownNotification>> {
    Json(state.notifications.list().await)
}

pub async fn click(
    State(state): State<AppState>, Path(id): Path<u64>, body: Bytes,
) -> Result<Json<ClickOutput>, ApiError> {
    let request: ClickRequest = if body.is_empty() {
        ClickRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidInput(format!("click body: {e}")))?
    };

    let event = Event::NotificationClick { notification_id: id, action: request.action };
    match state.registration.dispatch_and_settle(event).await? {
        EventOutcome::Navigated(url) => Ok(Json(ClickOutput { navigated: url.map(|u| u.to_string()) })),
        other => Err(unexpected(&other)),
    }
}

pub async fn clients(State(state): State<AppState>) -> Json<Vec<WindowClient>> {
    Json(state.clients.list().await)
}

pub async fn enqueue(
    State(state): State<AppState>, Path(queue): Path<String>, Json(request): Json<QueueRequest>,
) -> Result<(StatusCode, Json<QueueOutput>), ApiError> {
    if queue != ANALYTICS_QUEUE && queue != USER_ACTIONS_QUEUE {
        return Err(ApiError::InvalidInput(format!(
            "unknown queue {queue:?}, expected {ANALYTICS_QUEUE:?} or {USER_ACTIONS_QUEUE:?}"
        )));
    }

    // replayed actions only ever go back to the origin
    if queue == USER_ACTIONS_QUEUE {
        let target =
            resolve(&request.url, &state.origin).map_err(|e| ApiError::InvalidInput(format!("queued url: {e}")))?;
        if target.origin() != state.origin.origin() {
            return Err(ApiError::InvalidInput(format!("queued url {target} is not on {}", state.origin)));
        }
    }

    let body = match &request.body {
        Some(value) => Some(Bytes::from(
            serde_json::to_vec(value).map_err(|e| ApiError::InvalidInput(format!("queued body: {e}")))?,
        )),
        None => None,
    };
    let content_type = request
        .content_type
        .or_else(|| body.as_ref().map(|_| "application/json".to_string()));

    let entry = NewOutboxEntry { method: request.method.unwrap_or_default(), url: request.url, body, content_type };
    let id = state.registration.storage().enqueue(&queue, entry).await?;
    tracing::debug!(id, %queue, "Queued for background sync");

    Ok((StatusCode::ACCEPTED, Json(QueueOutput { id, queue })))
}

pub async fn partitions(State(state): State<AppState>) -> Result<Json<Vec<PartitionInfo>>, ApiError> {
    Ok(Json(state.registration.storage().partitions().await?))
}
