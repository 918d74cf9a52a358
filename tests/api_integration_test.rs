use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use azure_item_gateway::api::handlers::home::GREETING;
use azure_item_gateway::config::AppConfig;
use azure_item_gateway::services::blob_store::BlobStore;
use azure_item_gateway::services::item_service::ItemService;
use azure_item_gateway::services::item_store::ItemStore;
use azure_item_gateway::services::{Provisioned, StoreError};
use azure_item_gateway::{AppState, create_app};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Default)]
struct MockItemStore {
    items: Mutex<Vec<Map<String, Value>>>,
    fail: bool,
}

#[async_trait]
impl ItemStore for MockItemStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_item(&self, item: &Map<String, Value>) -> Result<Value, StoreError> {
        if self.fail {
            return Err(StoreError::Remote {
                status: 403,
                body: "Forbidden".to_string(),
            });
        }
        self.items.lock().unwrap().push(item.clone());
        Ok(Value::Object(item.clone()))
    }
}

#[derive(Default)]
struct MockBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn ensure_container(&self) -> Result<Provisioned, StoreError> {
        Ok(Provisioned::AlreadyExists)
    }

    async fn upload_blob(
        &self,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }
}

struct TestApp {
    app: axum::Router,
    items: Arc<MockItemStore>,
    blobs: Arc<MockBlobStore>,
}

fn setup_with(items: MockItemStore, config: AppConfig) -> TestApp {
    let items = Arc::new(items);
    let blobs = Arc::new(MockBlobStore::default());

    let state = AppState {
        items: Arc::new(ItemService::new(items.clone(), &config)),
        blobs: blobs.clone(),
        config,
    };

    TestApp {
        app: create_app(state),
        items,
        blobs,
    }
}

fn setup() -> TestApp {
    setup_with(MockItemStore::default(), AppConfig::default())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

fn post_multipart(parts: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(format!("{}--{}--\r\n", parts, BOUNDARY)))
        .unwrap()
}

fn file_part(field: &str, filename: &str, content_type: &str, content: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
        Content-Type: {content_type}\r\n\r\n\
        {content}\r\n"
    )
}

fn text_part(field: &str, value: &str) -> String {
    format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"{field}\"\r\n\r\n\
        {value}\r\n"
    )
}

#[tokio::test]
async fn test_home_returns_greeting() {
    let t = setup();

    for request in [
        Request::builder().uri("/").body(Body::empty()).unwrap(),
        Request::builder()
            .uri("/?name=ignored")
            .body(Body::from("ignored body"))
            .unwrap(),
    ] {
        let response = t.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], GREETING.as_bytes());
    }
}

#[tokio::test]
async fn test_health_reports_version() {
    let t = setup();
    let response = t
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_create_item_defaults_partition_key() {
    let t = setup();
    let response = t
        .app
        .oneshot(post_json("/items", r#"{"id": "1", "name": "tea"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["message"], "Item created");
    assert_eq!(
        json["item"],
        json!({"id": "1", "name": "tea", "partitionKey": "default"})
    );

    let stored = t.items.items.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["partitionKey"], "default");
}

#[tokio::test]
async fn test_create_item_preserves_partition_key() {
    let t = setup();
    let response = t
        .app
        .oneshot(post_json(
            "/items",
            r#"{"id": "2", "partitionKey": "tenant-42"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["item"]["partitionKey"], "tenant-42");
    assert_eq!(t.items.items.lock().unwrap()[0]["partitionKey"], "tenant-42");
}

#[tokio::test]
async fn test_create_item_uses_configured_default() {
    let config = AppConfig {
        default_partition_key: "shared".to_string(),
        ..AppConfig::default()
    };
    let t = setup_with(MockItemStore::default(), config);

    let response = t.app.oneshot(post_json("/items", "{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(t.items.items.lock().unwrap()[0]["partitionKey"], "shared");
}

#[tokio::test]
async fn test_create_item_rejects_non_object() {
    let t = setup();
    let response = t.app.oneshot(post_json("/items", "[1, 2, 3]")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Item must be a JSON object"})
    );
    assert!(t.items.items.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_item_malformed_json_is_rejected() {
    let t = setup();
    let response = t.app.oneshot(post_json("/items", "{not json")).await.unwrap();

    assert!(response.status().is_client_error());
    assert!(t.items.items.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_item_store_failure_is_500() {
    let t = setup_with(
        MockItemStore {
            fail: true,
            ..Default::default()
        },
        AppConfig::default(),
    );
    let response = t
        .app
        .oneshot(post_json("/items", r#"{"id": "3"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Internal Server Error"})
    );
}

#[tokio::test]
async fn test_upload_stores_blob_under_filename() {
    let t = setup();
    let response = t
        .app
        .oneshot(post_multipart(&file_part(
            "file",
            "test.txt",
            "text/plain",
            "Hello, this is a test file content!",
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await,
        json!({"message": "File test.txt uploaded"})
    );

    let blobs = t.blobs.blobs.lock().unwrap();
    let (data, content_type) = blobs.get("test.txt").expect("blob stored under filename");
    assert_eq!(data, b"Hello, this is a test file content!");
    assert_eq!(content_type, "text/plain");
}

#[tokio::test]
async fn test_upload_ignores_other_fields() {
    let t = setup();
    let parts = format!(
        "{}{}",
        text_part("description", "a note"),
        file_part("file", "notes.md", "text/markdown", "# Notes")
    );
    let response = t.app.oneshot(post_multipart(&parts)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let blobs = t.blobs.blobs.lock().unwrap();
    assert_eq!(blobs.len(), 1);
    assert!(blobs.contains_key("notes.md"));
}

#[tokio::test]
async fn test_upload_without_file_field_is_400() {
    let t = setup();
    let parts = file_part("attachment", "test.txt", "text/plain", "content");
    let response = t.app.oneshot(post_multipart(&parts)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "No file provided"}));
    assert!(t.blobs.blobs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_file_field_without_filename_is_400() {
    let t = setup();
    let response = t
        .app
        .oneshot(post_multipart(&text_part("file", "just text")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({"error": "No file provided"}));
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let config = AppConfig {
        max_upload_size: 16,
        ..AppConfig::default()
    };
    let t = setup_with(MockItemStore::default(), config);
    let big = "x".repeat(2 * 1024 * 1024);
    let response = t
        .app
        .oneshot(post_multipart(&file_part("file", "big.bin", "application/octet-stream", &big)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(t.blobs.blobs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_id_is_echoed_or_generated() {
    let t = setup();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let response = t
        .app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(generated.len(), 36);
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let t = setup();
    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    for path in ["/", "/health", "/items", "/upload"] {
        assert!(json["paths"].get(path).is_some(), "missing {}", path);
    }
}

#[tokio::test]
async fn test_upload_without_multipart_body_is_json_400() {
    let t = setup();

    for content_type in [None, Some("application/x-www-form-urlencoded")] {
        let mut request = Request::builder().method("POST").uri("/upload");
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }
        let response = t
            .app
            .clone()
            .oneshot(request.body(Body::from("file=test.txt")).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "No file provided"}));
    }
    assert!(t.blobs.blobs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_dot_segment_filenames() {
    let t = setup();

    for filename in ["../other/x.txt", "a/./b.txt", ".."] {
        let response = t
            .app
            .clone()
            .oneshot(post_multipart(&file_part("file", filename, "text/plain", "x")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", filename);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains(filename));
    }
    assert!(t.blobs.blobs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_huge_upload_limit_does_not_overflow() {
    let config = AppConfig {
        max_upload_size: usize::MAX,
        ..AppConfig::default()
    };
    let t = setup_with(MockItemStore::default(), config);
    let response = t
        .app
        .oneshot(post_multipart(&file_part("file", "a.txt", "text/plain", "ok")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

/// Records span fields and `metrics` events as `name=value` lines
#[derive(Clone, Default)]
struct Captured {
    spans: Arc<Mutex<Vec<String>>>,
    metrics: Arc<Mutex<Vec<String>>>,
}

#[derive(Default)]
struct Fields(Vec<String>);

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push(format!("{}={}", field.name(), value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.push(format!("{}={:?}", field.name(), value));
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        self.spans.lock().unwrap().push(fields.0.join(" "));
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() == "metrics" {
            let mut fields = Fields::default();
            event.record(&mut fields);
            self.metrics.lock().unwrap().push(fields.0.join(" "));
        }
    }
}

#[tokio::test]
async fn test_request_span_carries_generated_request_id() {
    let captured = Captured::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));
    let t = setup();

    let response = t
        .app
        .oneshot(post_json("/items", r#"{"id": "traced"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();

    let spans = captured.spans.lock().unwrap();
    let http_span = spans
        .iter()
        .find(|s| s.contains("request_id="))
        .expect("request span recorded");
    assert!(http_span.contains(&format!("request_id={}", request_id)));
    assert!(!http_span.contains("request_id=unknown"));

    let metrics = captured.metrics.lock().unwrap();
    assert_eq!(metrics.len(), 1);
    assert!(metrics[0].contains("route=/items"), "{}", metrics[0]);
    assert!(metrics[0].contains("status=201"), "{}", metrics[0]);
}
