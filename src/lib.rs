pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;

use crate::config::AppConfig;
use crate::services::blob_store::BlobStore;
use crate::services::item_service::ItemService;
use crate::api::middleware::request_id::REQUEST_ID_HEADER;
use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, Response},
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Span, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::home::home,
        api::handlers::health::health_check,
        api::handlers::items::create_item,
        api::handlers::upload::upload_file,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::items::ItemResponse,
            api::handlers::upload::UploadResponse,
        )
    ),
    tags(
        (name = "system", description = "Greeting and health endpoints"),
        (name = "items", description = "Cosmos DB item endpoints"),
        (name = "files", description = "Blob upload endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub items: Arc<ItemService>,
    pub blobs: Arc<dyn BlobStore>,
    pub config: AppConfig,
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Span per request, carrying the id assigned by the request-id middleware
fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

pub fn create_app(state: AppState) -> Router {
    // Multipart framing overhead on top of the file itself
    let upload_limit = state.config.max_upload_size.saturating_add(1024 * 1024);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(request_span)
        .on_request(|request: &Request<Body>, _span: &Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(|response: &Response<Body>, latency: Duration, _span: &Span| {
            info!("📤 Finished in {:?} with status {}", latency, response.status());
        });

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::home::home))
        .route("/health", get(api::handlers::health::health_check))
        .route("/items", post(api::handlers::items::create_item))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file)
                .layer(axum::extract::DefaultBodyLimit::max(upload_limit)),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        // Inside the request-id layer so the span sees generated ids
        .layer(trace_layer)
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
