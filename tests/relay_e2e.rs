//! End-to-end relay tests: a real gateway router in front of a stub
//! upstream server, exercised over loopback HTTP.
//!
//! Covers header rewriting on the upstream call, byte-exact buffered relay,
//! status passthrough, local error mapping, and incremental line-streamed
//! delivery.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use promptgate::{Config, Gateway};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One request as seen by the stub upstream.
#[derive(Debug, Clone)]
struct Captured {
    headers: HeaderMap,
    body: Vec<u8>,
}

type Capture = Arc<Mutex<Option<Captured>>>;

async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Stub upstream that records the request and answers with a fixed body.
async fn spawn_upstream(capture: Capture, status: StatusCode, reply: &'static str) -> SocketAddr {
    async fn handler(
        State((capture, status, reply)): State<(Capture, StatusCode, &'static str)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        *capture.lock().unwrap() = Some(Captured {
            headers,
            body: body.to_vec(),
        });
        (status, [("x-upstream", "stub")], reply).into_response()
    }

    let router = Router::new()
        .route("/v1/chat/completions", post(handler))
        .route("/v1/complete", post(handler))
        .with_state((capture, status, reply));
    spawn(router).await
}

/// Gateway with defaults pointed at the given upstream endpoint.
async fn spawn_gateway(endpoint: String) -> SocketAddr {
    let mut config = Config::default();
    config.upstream.model = "gw-model".to_string();
    config.upstream.api_key = "test-key".to_string();
    config.upstream.endpoint = endpoint;
    config.upstream.timeout_secs = 5;

    let gateway = Gateway::new(&config).unwrap();
    spawn(gateway.router()).await
}

#[tokio::test]
async fn test_buffered_relay_rewrites_request_and_relays_bytes() {
    let capture: Capture = Arc::new(Mutex::new(None));
    let reply = r#"{"id":"resp-1","choices":[{"message":{"content":"pong"}}]}"#;
    let upstream = spawn_upstream(capture.clone(), StatusCode::OK, reply).await;
    let gateway = spawn_gateway(format!("http://{upstream}/v1/chat/completions")).await;

    let response = reqwest::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .header("authorization", "Bearer caller-key")
        .header("x-custom", "pass-through")
        .body(r#"{"model":"caller-model","messages":[{"role":"user","content":"ping"}]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "stub");
    // Buffered body relayed byte for byte
    assert_eq!(response.bytes().await.unwrap(), reply.as_bytes());

    let seen = capture.lock().unwrap().clone().unwrap();
    // Caller credential replaced with the resolved one
    assert_eq!(seen.headers["authorization"], "Bearer test-key");
    assert_eq!(
        seen.headers["http-referer"],
        "https://github.com/promptgate/promptgate"
    );
    // Other caller headers pass through
    assert_eq!(seen.headers["x-custom"], "pass-through");

    let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
    // Routed model wins over whatever the caller asked for
    assert_eq!(body["model"], "gw-model");
    assert_eq!(body["messages"][0]["content"], "ping");
}

#[tokio::test]
async fn test_upstream_error_status_passes_through() {
    let capture: Capture = Arc::new(Mutex::new(None));
    let reply = r#"{"error":{"type":"rate_limit_error"}}"#;
    let upstream = spawn_upstream(capture, StatusCode::TOO_MANY_REQUESTS, reply).await;
    let gateway = spawn_gateway(format!("http://{upstream}/v1/chat/completions")).await;

    let response = reqwest::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .body(r#"{"messages":[]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.bytes().await.unwrap(), reply.as_bytes());
}

#[tokio::test]
async fn test_malformed_request_rejected_without_forwarding() {
    let capture: Capture = Arc::new(Mutex::new(None));
    let upstream = spawn_upstream(capture.clone(), StatusCode::OK, "{}").await;
    let gateway = spawn_gateway(format!("http://{upstream}/v1/chat/completions")).await;
    let client = reqwest::Client::new();

    // Not JSON at all
    let response = client
        .post(format!("http://{gateway}/v1/chat/completions"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    // Valid JSON but no messages array to inject into
    let mut config = Config::default();
    config.upstream.endpoint = format!("http://{upstream}/v1/chat/completions");
    config.upstream.api_key = "k".to_string();
    let prompt = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(prompt.path(), "prompt").unwrap();
    config.pipeline.system_prompt = Some(prompt.path().to_path_buf());
    let gateway = spawn(Gateway::new(&config).unwrap().router()).await;

    let response = client
        .post(format!("http://{gateway}/v1/chat/completions"))
        .body(r#"{"model":"m"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    // Nothing ever reached the stub
    assert!(capture.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_unreachable_upstream_maps_to_bad_gateway() {
    // Bind and drop to get a port with no listener behind it.
    let dead = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let gateway = spawn_gateway(format!("http://{dead_addr}/v1/chat/completions")).await;

    let response = reqwest::Client::new()
        .post(format!("http://{gateway}/v1/chat/completions"))
        .body(r#"{"messages":[]}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_legacy_completion_template_over_http() {
    let capture: Capture = Arc::new(Mutex::new(None));
    let upstream = spawn_upstream(capture.clone(), StatusCode::OK, "{}").await;

    let mut config = Config::default();
    config.upstream.model = "legacy-model".to_string();
    config.upstream.api_key = "k".to_string();
    config.upstream.endpoint = format!("http://{upstream}/v1/complete");
    let prompt = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(prompt.path(), "Answer tersely.").unwrap();
    config.pipeline.system_prompt = Some(prompt.path().to_path_buf());
    let gateway = spawn(Gateway::new(&config).unwrap().router()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{gateway}/v1/complete"))
        .body(r#"{"prompt":"what is 2+2?"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let seen = capture.lock().unwrap().clone().unwrap();
    let body: serde_json::Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(
        body["prompt"],
        "Answer tersely.\n\nHuman: what is 2+2?\n\nAssistant:"
    );
    assert_eq!(body["model"], "legacy-model");
}

#[tokio::test]
async fn test_streaming_relay_delivers_lines_incrementally() {
    // Stub whose response body is fed by the test one line at a time, so a
    // line observed at the client proves it was relayed before the next one
    // existed (no whole-body buffering).
    type Feed = Arc<Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>>;

    async fn stream_handler(State(feed): State<Feed>) -> Response {
        let mut rx = feed.lock().unwrap().take().unwrap();
        let body = Body::from_stream(async_stream::stream! {
            while let Some(chunk) = rx.recv().await {
                yield Ok::<_, Infallible>(chunk);
            }
        });
        Response::new(body)
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let feed: Feed = Arc::new(Mutex::new(Some(rx)));
    let upstream = spawn(
        Router::new()
            .route("/v1/chat/completions", post(stream_handler))
            .with_state(feed),
    )
    .await;
    let gateway = spawn_gateway(format!("http://{upstream}/v1/chat/completions")).await;

    let response = reqwest::Client::new()
        .post(format!(
            "http://{gateway}/v1/chat/completions?stream=true"
        ))
        .body(r#"{"messages":[]}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let mut lines = response.bytes_stream();

    tx.send(Bytes::from_static(b"data: {\"token\":\"one\"}\n")).unwrap();
    let first = timeout(READ_TIMEOUT, lines.next())
        .await
        .expect("first line not relayed before the second was produced")
        .unwrap()
        .unwrap();
    assert_eq!(first, Bytes::from_static(b"data: {\"token\":\"one\"}\n"));

    tx.send(Bytes::from_static(b"data: {\"token\":\"two\"}\n")).unwrap();
    let second = timeout(READ_TIMEOUT, lines.next())
        .await
        .expect("second line not relayed")
        .unwrap()
        .unwrap();
    assert_eq!(second, Bytes::from_static(b"data: {\"token\":\"two\"}\n"));

    // Unterminated remainder is flushed when the upstream closes.
    tx.send(Bytes::from_static(b"data: [DONE]")).unwrap();
    drop(tx);
    let rest = timeout(READ_TIMEOUT, lines.next())
        .await
        .expect("remainder not flushed at EOF")
        .unwrap()
        .unwrap();
    assert_eq!(rest, Bytes::from_static(b"data: [DONE]"));
    assert!(timeout(READ_TIMEOUT, lines.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_midstream_upstream_error_truncates_relay() {
    // Stub whose body stream delivers one line and then dies. The status
    // line has already been relayed, so the gateway must pass the line
    // through and then just end the client stream: no error frame, no hang.
    async fn broken_stream_handler() -> Response {
        let body = Body::from_stream(async_stream::stream! {
            yield Ok::<_, std::io::Error>(Bytes::from_static(b"data: one\n"));
            sleep(Duration::from_millis(200)).await;
            yield Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upstream died",
            ));
        });
        Response::new(body)
    }

    let upstream = spawn(
        Router::new().route("/v1/chat/completions", post(broken_stream_handler)),
    )
    .await;
    let gateway = spawn_gateway(format!("http://{upstream}/v1/chat/completions")).await;

    let response = reqwest::Client::new()
        .post(format!(
            "http://{gateway}/v1/chat/completions?stream=true"
        ))
        .body(r#"{"messages":[]}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let mut lines = response.bytes_stream();

    let first = timeout(READ_TIMEOUT, lines.next())
        .await
        .expect("first line not relayed")
        .unwrap()
        .unwrap();
    assert_eq!(first, Bytes::from_static(b"data: one\n"));

    // Everything after the upstream failure is a clean end of stream.
    let end = timeout(READ_TIMEOUT, lines.next())
        .await
        .expect("relay hung after upstream error");
    assert!(end.is_none(), "unexpected bytes after truncation: {end:?}");
}

#[tokio::test]
async fn test_slow_script_does_not_stall_other_requests() {
    // Single-threaded runtime: if script execution held an async worker,
    // the concurrent scriptless request below could not make progress
    // until the busy-wait finished.
    let capture: Capture = Arc::new(Mutex::new(None));
    let upstream = spawn_upstream(capture, StatusCode::OK, "{}").await;

    let script = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        script.path(),
        "function preprocess(payload) {\
            const start = Date.now();\
            while (Date.now() - start < 800) {}\
            return payload;\
        }",
    )
    .unwrap();

    let mut config = Config::default();
    config.upstream.api_key = "k".to_string();
    config.upstream.endpoint = format!("http://{upstream}/v1/chat/completions");
    config.pipeline.preprocess_script = Some(script.path().to_path_buf());
    let slow_gateway = spawn(Gateway::new(&config).unwrap().router()).await;
    let plain_gateway = spawn_gateway(format!("http://{upstream}/v1/chat/completions")).await;

    let client = reqwest::Client::new();
    let started = Instant::now();
    let slow = tokio::spawn({
        let client = client.clone();
        async move {
            client
                .post(format!("http://{slow_gateway}/v1/chat/completions"))
                .body(r#"{"messages":[]}"#)
                .send()
                .await
        }
    });
    // Let the slow request reach its script before racing it.
    sleep(Duration::from_millis(100)).await;

    let response = timeout(
        READ_TIMEOUT,
        client
            .post(format!("http://{plain_gateway}/v1/chat/completions"))
            .body(r#"{"messages":[]}"#)
            .send(),
    )
    .await
    .expect("scriptless request stalled behind a busy script")
    .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    // Completed while the script was still spinning, not after it.
    assert!(
        started.elapsed() < Duration::from_millis(700),
        "scriptless request waited out the script: {:?}",
        started.elapsed()
    );
    assert!(!slow.is_finished());

    assert_eq!(
        slow.await.unwrap().unwrap().status(),
        reqwest::StatusCode::OK
    );
}
