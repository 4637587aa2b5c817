//! HTTP control surface: parameter submission and health probes

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::params::{ParameterUpdate, PendingParameters};

#[derive(Clone)]
pub struct ServerState {
    pub pending: Arc<PendingParameters>,
}

impl ServerState {
    pub fn new(pending: Arc<PendingParameters>) -> Self {
        Self { pending }
    }
}

/// Routes only. Any path or method not listed answers 404.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/SetParameters", post(set_parameters).fallback(not_found))
        .route("/Alive", get(alive).fallback(not_found))
        .route("/GetLicense", get(get_license).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

/// [`router`] with request tracing and a per-request deadline
pub fn app(state: ServerState, request_timeout: Duration) -> Router {
    router(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then finish in-flight requests
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Configuration server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Configuration server stopped");
    Ok(())
}

async fn set_parameters(State(state): State<ServerState>, body: Bytes) -> Response {
    let update = match ParameterUpdate::from_json(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Rejected SetParameters: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    info!(
        url = %update.analytics_event_api_url,
        width = update.image_width,
        height = update.image_height,
        jpg_compress = update.jpg_compress,
        groups = update.rois.len(),
        "Parameters received"
    );
    if state.pending.submit(update) {
        debug!("Replaced unapplied parameters");
    }

    (
        StatusCode::OK,
        Json(json!({ "message": "Parameters set successfully" })),
    )
        .into_response()
}

async fn alive() -> StatusCode {
    StatusCode::OK
}

// No license check is performed
async fn get_license() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
