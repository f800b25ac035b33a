//! HTTP routes of the read API.

mod quotes;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::main_lib::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn app_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/v1/stock/{symbol}", get(quotes::get_stock))
        .route("/v1/stocks", get(quotes::get_stocks))
        .with_state(state.clone());
    with_middleware(routes, state, request_timeout)
}

/// Applies the layers shared by every route: request metrics, gzip,
/// a per-request deadline and request tracing.
pub fn with_middleware(routes: Router, state: Arc<AppState>, request_timeout: Duration) -> Router {
    routes
        .layer(middleware::from_fn_with_state(state, track_requests))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let _in_flight = state.metrics.track_server_request();
    let response = next.run(request).await;
    // Measured before compression.
    if let Some(bytes) = response.body().size_hint().exact() {
        state.metrics.record_response_bytes(bytes);
    }
    response
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], state.metrics.render())
}
