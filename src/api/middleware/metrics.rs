use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

/// Label for requests that matched no route (404s, probes)
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Emits one `request_completed` event per request on the `metrics` target,
/// labelled by route template rather than raw path. 5xx responses are warnings.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned());
    let method = req.method().clone();
    let started = Instant::now();

    let response = next.run(req).await;

    let route = route.as_deref().unwrap_or(UNMATCHED_ROUTE);
    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        warn!(target: "metrics", %method, route, status, latency_ms, "request_completed");
    } else {
        info!(target: "metrics", %method, route, status, latency_ms, "request_completed");
    }

    response
}
