//! Wire-contract tests for the HEC delivery client against a live local
//! capture server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use hec_sink::{EventWriter, HecClient, HecConfig};
use nozzle_core::{EventFields, RoutedRecord};
use parking_lot::Mutex;
use serde_json::json;

/// Everything the capture server saw, plus the response it should give.
#[derive(Default)]
struct Capture {
    path: Mutex<Option<String>>,
    headers: Mutex<Option<HeaderMap>>,
    body: Mutex<Option<String>>,
    respond_status: AtomicU16,
    respond_body: Mutex<String>,
}

impl Capture {
    fn new() -> Arc<Self> {
        let capture = Arc::new(Self::default());
        capture.respond_status.store(200, Ordering::SeqCst);
        *capture.respond_body.lock() = "{}".to_string();
        capture
    }

    fn body(&self) -> String {
        self.body.lock().clone().expect("request captured")
    }

    fn header(&self, name: &str) -> String {
        self.headers
            .lock()
            .as_ref()
            .expect("request captured")
            .get(name)
            .expect("header present")
            .to_str()
            .unwrap()
            .to_string()
    }
}

async fn capture_handler(
    State(capture): State<Arc<Capture>>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    *capture.path.lock() = Some(uri.path().to_string());
    *capture.headers.lock() = Some(headers);
    *capture.body.lock() = Some(body);
    (
        StatusCode::from_u16(capture.respond_status.load(Ordering::SeqCst)).unwrap(),
        capture.respond_body.lock().clone(),
    )
}

async fn spawn_capture_server() -> (SocketAddr, Arc<Capture>) {
    let capture = Capture::new();
    let app = Router::new()
        .fallback(capture_handler)
        .with_state(capture.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, capture)
}

fn client_for(addr: SocketAddr, index: &str) -> HecClient {
    HecClient::new(HecConfig {
        host: format!("http://{addr}"),
        token: "abc-some-random-token".to_string(),
        index: index.to_string(),
        ..HecConfig::default()
    })
    .unwrap()
}

fn greeting_record(greeting: &str) -> RoutedRecord {
    let mut fields = EventFields::new();
    fields.insert("greeting".into(), json!(greeting));
    RoutedRecord::new(fields, "")
}

#[tokio::test]
async fn test_posts_to_collector_endpoint_with_auth_headers() {
    let (addr, capture) = spawn_capture_server().await;
    let client = client_for(addr, "");

    client.write(&[greeting_record("hello world")]).await.unwrap();

    assert_eq!(capture.path.lock().clone().unwrap(), "/services/collector");
    assert_eq!(
        capture.header("authorization"),
        "Splunk abc-some-random-token"
    );
    assert_eq!(capture.header("content-type"), "application/json");
}

#[tokio::test]
async fn test_batch_body_is_double_newline_separated() {
    let (addr, capture) = spawn_capture_server().await;
    let client = client_for(addr, "");

    let records = vec![
        greeting_record("hello world"),
        greeting_record("hello mars"),
        greeting_record("hello pluto"),
    ];
    client.write(&records).await.unwrap();

    let expected = concat!(
        r#"{"event":{"greeting":"hello world"}}"#,
        "\n\n",
        r#"{"event":{"greeting":"hello mars"}}"#,
        "\n\n",
        r#"{"event":{"greeting":"hello pluto"}}"#,
    );
    assert_eq!(capture.body(), expected);
}

#[tokio::test]
async fn test_configured_index_in_payload() {
    let (addr, capture) = spawn_capture_server().await;
    let client = client_for(addr, "index_cf");

    let records = vec![greeting_record("hello world"), greeting_record("hello mars")];
    client.write(&records).await.unwrap();

    let expected = concat!(
        r#"{"event":{"greeting":"hello world"},"index":"index_cf"}"#,
        "\n\n",
        r#"{"event":{"greeting":"hello mars"},"index":"index_cf"}"#,
    );
    assert_eq!(capture.body(), expected);
}

#[tokio::test]
async fn test_static_fields_in_payload() {
    let (addr, capture) = spawn_capture_server().await;
    let mut config = HecConfig {
        host: format!("http://{addr}"),
        token: "token".to_string(),
        ..HecConfig::default()
    };
    config.fields.insert("foo".to_string(), "bar".to_string());
    config
        .fields
        .insert("hello".to_string(), "world".to_string());
    let client = HecClient::new(config).unwrap();

    client.write(&[greeting_record("hello world")]).await.unwrap();

    assert_eq!(
        capture.body(),
        r#"{"event":{"greeting":"hello world"},"fields":{"foo":"bar","hello":"world"}}"#
    );
}

#[tokio::test]
async fn test_non_2xx_response_surfaces_status() {
    let (addr, capture) = spawn_capture_server().await;
    capture.respond_status.store(500, Ordering::SeqCst);
    *capture.respond_body.lock() = "Internal server error".to_string();
    let client = client_for(addr, "");

    let error = client
        .write(&[greeting_record("hello")])
        .await
        .expect_err("500 must surface");
    let message = error.to_string();
    assert!(message.contains("500"), "missing status in: {message}");
    assert!(
        message.contains("Internal server error"),
        "missing body in: {message}"
    );
}

#[tokio::test]
async fn test_unreachable_host_surfaces_connection_failure() {
    // Nothing listens on this port.
    let client = HecClient::new(HecConfig {
        host: "http://127.0.0.1:1".to_string(),
        token: "token".to_string(),
        ..HecConfig::default()
    })
    .unwrap();

    let error = client
        .write(&[greeting_record("hello")])
        .await
        .expect_err("connection must fail");
    assert!(!error.to_string().is_empty());
}

#[tokio::test]
async fn test_malformed_host_surfaces_error() {
    let client = HecClient::new(HecConfig {
        host: "foo://example.com".to_string(),
        token: "token".to_string(),
        ..HecConfig::default()
    })
    .unwrap();

    let error = client
        .write(&[greeting_record("hello")])
        .await
        .expect_err("unsupported scheme must fail");
    assert!(!error.to_string().is_empty());
}

#[tokio::test]
async fn test_debug_mode_skips_network() {
    let client = HecClient::new(HecConfig {
        host: "http://127.0.0.1:1".to_string(),
        token: "token".to_string(),
        debug: true,
        ..HecConfig::default()
    })
    .unwrap();

    // Debug mode writes to stdout and always succeeds, even with an
    // unreachable host configured.
    client.write(&[greeting_record("hello")]).await.unwrap();
}
