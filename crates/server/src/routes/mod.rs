//! HTTP surface of the server.
//!
//! Everything under [`CONTROL_PREFIX`] drives the router directly; every
//! other request is a fetch event answered by the router.

mod control;
mod proxy;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ringside_core::AppConfig;
use ringside_worker::{NotificationCenter, Registration, WindowClients};
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use url::Url;

pub const CONTROL_PREFIX: &str = "/__ringside";

#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    pub notifications: Arc<NotificationCenter>,
    pub clients: Arc<WindowClients>,
    /// Background work extended from fetch events; drained on shutdown.
    pub tracker: TaskTracker,
    pub origin: Url,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        registration: Arc<Registration>, notifications: Arc<NotificationCenter>, clients: Arc<WindowClients>,
        config: &AppConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            registration,
            notifications,
            clients,
            tracker: TaskTracker::new(),
            origin: config.origin_url()?,
            max_body_bytes: config.max_bytes,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let control = Router::new()
        .route("/health", get(control::health))
        .route("/sync/{tag}", post(control::sync))
        .route("/push", post(control::push))
        .route("/notifications", get(control::notifications))
        .route("/notifications/{id}/click", post(control::click))
        .route("/clients", get(control::clients))
        .route("/queue/{queue}", post(control::enqueue))
        .route("/partitions", get(control::partitions));

    Router::new()
        .nest(CONTROL_PREFIX, control)
        .fallback(proxy::proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
