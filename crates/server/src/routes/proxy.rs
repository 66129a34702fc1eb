//! The reverse proxy: every non-control request is a fetch event.

use axum::body::{Body, to_bytes};
use axum::extract::{Request as HttpRequest, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::Response as HttpResponse;
use ringside_core::{Error, Request, RequestMode, Response};
use ringside_worker::{Event, EventOutcome, ExtendableEvent};

use super::AppState;
use crate::error::ApiError;

/// Request mode as a browser would report it.
///
/// `Sec-Fetch-Mode` wins when present. Otherwise a GET that accepts HTML is
/// treated as a document navigation.
pub fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    let declared = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok());
    match declared {
        Some("navigate") => RequestMode::Navigate,
        Some("same-origin") => RequestMode::SameOrigin,
        Some("no-cors") => RequestMode::NoCors,
        Some(_) => RequestMode::Cors,
        None => {
            let accepts_html = headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|accept| accept.contains("text/html"));
            if *method == Method::GET && accepts_html { RequestMode::Navigate } else { RequestMode::Cors }
        }
    }
}

async fn to_router_request(state: &AppState, request: HttpRequest) -> Result<Request, ApiError> {
    let (parts, body) = request.into_parts();

    // only the path and query are taken from the client; the origin is fixed
    let mut url = state.origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| ApiError::InvalidInput(format!("request body: {e}")))?;

    let mut converted = Request::get(url).with_method(parts.method.as_str());
    converted.mode = request_mode(&parts.method, &parts.headers);
    for (name, value) in &parts.headers {
        if name == header::HOST {
            continue;
        }
        if let Ok(value) = value.to_str() {
            converted = converted.with_header(name.as_str(), value);
        }
    }
    if !body.is_empty() {
        converted = converted.with_body(body);
    }
    Ok(converted)
}

fn to_http_response(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = HttpResponse::new(Body::from(response.body));
    *out.status_mut() = status;

    for (name, value) in &response.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => tracing::debug!(header = %name, "Dropping invalid response header"),
        }
    }
    out
}

pub async fn proxy(State(state): State<AppState>, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let request = to_router_request(&state, request).await?;

    let extendable = ExtendableEvent::new();
    let outcome = state.registration.dispatch(Event::Fetch(request), &extendable).await;
    state.tracker.spawn(async move { extendable.settled().await });

    match outcome? {
        EventOutcome::Response(response) => Ok(to_http_response(response)),
        other => Err(Error::InvalidInput(format!("unexpected fetch outcome {other:?}")).into()),
    }
}
