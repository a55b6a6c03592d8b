//! HTTP front end
//!
//! Worker endpoints live under `/_worker/`; every other request is handed
//! to the interceptor as if the page had issued it against the origin.

use crate::error::WorkerError;
use crate::fetch::FetchRequest;
use crate::lifecycle::LifecycleState;
use crate::messages::ControlMessage;
use crate::types::{ErrorResponse, HealthResponse};
use crate::worker::OfflineWorker;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use url::Url;

/// Shared state for the HTTP server
pub struct ServerState {
    pub worker: OfflineWorker,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(worker: OfflineWorker) -> Self {
        Self {
            worker,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/_worker/health", get(health))
        .route("/_worker/messages", post(post_message))
        .route("/_worker/events", get(events))
        .fallback(intercept)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache = state.worker.stats().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to read cache stats");
        Default::default()
    });
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.worker.config().cache_name.clone(),
        lifecycle: state.worker.state().await,
        uptime_secs,
        cache,
    })
}

/// Accept a control message; the work itself runs in the background
async fn post_message(State(state): State<SharedState>, body: String) -> Response {
    let message = match body.parse::<ControlMessage>() {
        Ok(message) => message,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let lifecycle = state.worker.state().await;
    if lifecycle != LifecycleState::Active {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("worker is {}", lifecycle),
        );
    }

    tokio::spawn(async move {
        if let Err(e) = state.worker.post_message(message).await {
            error!(?message, error = %e, "Failed to handle control message");
        }
    });

    StatusCode::ACCEPTED.into_response()
}

/// Server-sent stream of worker notifications
async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.worker.subscribe())
        .filter_map(|notification| notification.ok())
        .map(|notification| Ok(Event::default().data(notification.to_string())));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Every other request goes through the worker
async fn intercept(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = match request_url(&state.worker.config().origin, &uri) {
        Ok(url) => url,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let request = FetchRequest::new(method, url, headers, body);
    match state.worker.fetch(&request).await {
        Ok(response) => response.into_response(),
        Err(WorkerError::InvalidState { actual, .. }) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("worker is {}", actual),
        ),
        Err(e) => {
            warn!(url = %request.url, error = %e, "Request failed with no fallback");
            error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
    }
}

/// Resolve a request path under the origin's base path. Only the path and
/// query are taken, so a request can never escape the configured origin.
fn request_url(origin: &Url, uri: &Uri) -> Result<Url, url::ParseError> {
    // "./" keeps a leading segment like `a:b` from reading as a scheme
    let path = format!("./{}", uri.path().trim_start_matches('/'));
    let mut url = origin.join(&path)?;
    url.set_query(uri.query());
    Ok(url)
}
