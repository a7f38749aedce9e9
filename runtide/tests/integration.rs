//! End-to-end tests for the invocation dispatcher.
//!
//! Both routers are bound on ephemeral ports and driven over real HTTP;
//! workers are emulated in-process by polling the internal Runtime API the
//! way a bootstrap process would.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use runtide::gateway::{gateway_router, Gateway};
use runtide::metrics::StatsReporter;
use runtide::runtime_api::runtime_api_router;
use runtide::sender::Sender;
use runtide_codec::{CloudEventsConfig, Codec};
use runtide_core::Dispatcher;

struct TestRuntime {
    external_url: String,
    internal_url: String,
}

async fn start_runtime(
    ttl: Duration,
    codec: Codec,
    sink: Option<String>,
    request_size_limit: usize,
) -> TestRuntime {
    let dispatcher = Arc::new(Dispatcher::new(ttl));
    let content_type = codec.content_type();

    let gateway = Arc::new(Gateway {
        dispatcher: dispatcher.clone(),
        codec,
        sender: Sender::new(sink, content_type),
        reporter: Arc::new(StatsReporter::new()),
        request_size_limit,
    });

    let internal = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let internal_url = format!("http://{}", internal.local_addr().unwrap());
    let internal_router = runtime_api_router(dispatcher);
    tokio::spawn(async move {
        axum::serve(internal, internal_router).await.unwrap();
    });

    let external = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let external_url = format!("http://{}", external.local_addr().unwrap());
    let external_router = gateway_router(gateway);
    tokio::spawn(async move {
        axum::serve(external, external_router).await.unwrap();
    });

    TestRuntime {
        external_url,
        internal_url,
    }
}

fn plain() -> Codec {
    Codec::from_format(None, CloudEventsConfig::default())
}

/// Polls the internal API once and answers the invocation, the way a
/// bootstrap process would. Returns the invocation payload it saw.
async fn run_worker_once(internal_url: String, kind: &'static str, reply: Vec<u8>) -> Vec<u8> {
    let client = reqwest::Client::new();

    let next = client
        .get(format!(
            "{internal_url}/2018-06-01/runtime/invocation/next"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(next.status(), 200);

    let request_id = next
        .headers()
        .get("Lambda-Runtime-Aws-Request-Id")
        .expect("request id header")
        .to_str()
        .unwrap()
        .to_string();
    assert!(!request_id.is_empty());

    let deadline_ms: i64 = next
        .headers()
        .get("Lambda-Runtime-Deadline-Ms")
        .expect("deadline header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    // Milliseconds since epoch, not nanoseconds.
    assert!(deadline_ms > 1_600_000_000_000);
    assert!(deadline_ms < 100_000_000_000_000);

    let payload = next.bytes().await.unwrap().to_vec();

    let posted = client
        .post(format!(
            "{internal_url}/2018-06-01/runtime/invocation/{request_id}/{kind}"
        ))
        .body(reply)
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 202);

    payload
}

#[tokio::test]
async fn test_plain_happy_path() {
    let runtime = start_runtime(Duration::from_secs(10), plain(), None, 5_000_000).await;

    let internal_url = runtime.internal_url.clone();
    let worker = tokio::spawn(async move {
        let payload = run_worker_once(internal_url.clone(), "response", b"hello".to_vec()).await;
        assert_eq!(payload, b"hello");
    });

    let response = reqwest::Client::new()
        .post(&runtime.external_url)
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "plain/text"
    );
    assert_eq!(response.text().await.unwrap(), "hello");
    worker.await.unwrap();
}

#[tokio::test]
async fn test_worker_error_is_propagated() {
    let runtime = start_runtime(Duration::from_secs(10), plain(), None, 5_000_000).await;

    let internal_url = runtime.internal_url.clone();
    let worker = tokio::spawn(async move {
        run_worker_once(internal_url, "error", b"boom".to_vec()).await;
    });

    let response = reqwest::Client::new()
        .post(&runtime.external_url)
        .body("input")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "boom");
    worker.await.unwrap();
}

#[tokio::test]
async fn test_deadline_and_late_reply() {
    let runtime = start_runtime(Duration::from_millis(100), plain(), None, 5_000_000).await;
    let client = reqwest::Client::new();

    let response = client
        .post(&runtime.external_url)
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 410);
    assert_eq!(
        response.text().await.unwrap(),
        "Deadline is reached, data payload"
    );

    // The invocation is still queued; a worker claiming it now is too late.
    let next = client
        .get(format!(
            "{}/2018-06-01/runtime/invocation/next",
            runtime.internal_url
        ))
        .send()
        .await
        .unwrap();
    let request_id = next
        .headers()
        .get("Lambda-Runtime-Aws-Request-Id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let late = client
        .post(format!(
            "{}/2018-06-01/runtime/invocation/{request_id}/response",
            runtime.internal_url
        ))
        .body("too late")
        .send()
        .await
        .unwrap();
    assert_eq!(late.status(), 410);
    assert_eq!(late.text().await.unwrap(), "Function deadline is reached");
}

#[tokio::test]
async fn test_ping() {
    let runtime = start_runtime(Duration::from_secs(1), plain(), None, 5_000_000).await;

    let response = reqwest::get(format!("{}/2018-06-01/ping", runtime.internal_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "pong");
}

#[tokio::test]
async fn test_unknown_endpoint_kind() {
    let runtime = start_runtime(Duration::from_secs(10), plain(), None, 5_000_000).await;
    let client = reqwest::Client::new();

    // An absent id answers 410 whatever the kind is.
    let response = client
        .post(format!(
            "{}/2018-06-01/runtime/invocation/some-id/bleh",
            runtime.internal_url
        ))
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 410);
    assert_eq!(response.text().await.unwrap(), "Function deadline is reached");

    // Only a live invocation is told about a bad endpoint.
    let external_url = runtime.external_url.clone();
    let caller = tokio::spawn(async move {
        reqwest::Client::new()
            .post(&external_url)
            .body("input")
            .send()
            .await
            .unwrap()
    });

    let next = client
        .get(format!(
            "{}/2018-06-01/runtime/invocation/next",
            runtime.internal_url
        ))
        .send()
        .await
        .unwrap();
    let request_id = next
        .headers()
        .get("Lambda-Runtime-Aws-Request-Id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let response = client
        .post(format!(
            "{}/2018-06-01/runtime/invocation/{request_id}/bleh",
            runtime.internal_url
        ))
        .body("data")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "Unknown endpoint: bleh");

    // Settle the invocation so the caller is not left to its deadline.
    let posted = client
        .post(format!(
            "{}/2018-06-01/runtime/invocation/{request_id}/response",
            runtime.internal_url
        ))
        .body("done")
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 202);

    let response = caller.await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "done");
}

#[tokio::test]
async fn test_malformed_invocation_path() {
    let runtime = start_runtime(Duration::from_secs(1), plain(), None, 5_000_000).await;
    let client = reqwest::Client::new();

    for path in [
        "/2018-06-01/runtime/invocation/only-one-segment",
        "/2018-06-01/runtime/invocation/a/b/c",
    ] {
        let response = client
            .post(format!("{}{path}", runtime.internal_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "path {path}");
        assert_eq!(response.text().await.unwrap(), "incorrect URL path");
    }
}

#[tokio::test]
async fn test_request_size_limit_boundary() {
    let runtime = start_runtime(Duration::from_secs(10), plain(), None, 1_000_000).await;
    let client = reqwest::Client::new();

    // One byte over the cap is rejected without touching the queue.
    let response = client
        .post(&runtime.external_url)
        .body(vec![b'x'; 1_000_001])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);

    // Exactly at the cap goes through.
    let internal_url = runtime.internal_url.clone();
    let worker = tokio::spawn(async move {
        let payload = run_worker_once(internal_url, "response", b"ok".to_vec()).await;
        assert_eq!(payload.len(), 1_000_000);
    });

    let response = client
        .post(&runtime.external_url)
        .body(vec![b'x'; 1_000_000])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
    worker.await.unwrap();
}

#[tokio::test]
async fn test_cloudevents_structured_round_trip() {
    let codec = Codec::from_format(Some("CLOUDEVENTS"), CloudEventsConfig::default());
    let runtime = start_runtime(Duration::from_secs(10), codec, None, 5_000_000).await;

    let internal_url = runtime.internal_url.clone();
    let worker = tokio::spawn(async move {
        let client = reqwest::Client::new();
        let next = client
            .get(format!(
                "{internal_url}/2018-06-01/runtime/invocation/next"
            ))
            .send()
            .await
            .unwrap();

        // Event attributes ride along as runtime context headers.
        let context = next
            .headers()
            .get("Lambda-Runtime-Cloudevents-Context")
            .expect("cloudevents context header")
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(context, r#"{"source":"t"}"#);
        let client_context = next
            .headers()
            .get("Lambda-Runtime-Client-Context")
            .expect("client context header")
            .to_str()
            .unwrap()
            .to_string();
        assert_eq!(client_context, r#"{"custom":{"source":"t"}}"#);

        let request_id = next
            .headers()
            .get("Lambda-Runtime-Aws-Request-Id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let payload = next.bytes().await.unwrap();
        assert_eq!(&payload[..], br#"{"x":1}"#);

        client
            .post(format!(
                "{internal_url}/2018-06-01/runtime/invocation/{request_id}/response"
            ))
            .body(payload)
            .send()
            .await
            .unwrap();
    });

    let response = reqwest::Client::new()
        .post(&runtime.external_url)
        .header(header::CONTENT_TYPE, "application/cloudevents+json")
        .body(r#"{"source":"t","data":{"x":1}}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/cloudevents+json"
    );

    let envelope: serde_json::Value =
        serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(envelope["data"]["x"], 1);
    assert_eq!(envelope["datacontenttype"], "application/json");
    assert_eq!(envelope["specversion"], "1.0");
    assert_eq!(envelope["type"], "ce.klr.triggermesh.io");
    assert_eq!(envelope["source"], "knative-lambda-runtime");
    assert!(!envelope["id"].as_str().unwrap().is_empty());
    assert!(!envelope["time"].as_str().unwrap().is_empty());
    worker.await.unwrap();
}

#[tokio::test]
async fn test_sink_mode_forwards_encoded_response() {
    // Stand-in collector that records what the sidecar POSTs at it.
    let collected: Arc<Mutex<Option<(String, Vec<u8>)>>> = Arc::new(Mutex::new(None));
    let collector_state = collected.clone();
    let collector = axum::Router::new().route(
        "/",
        axum::routing::post(
            move |headers: axum::http::HeaderMap, body: bytes::Bytes| {
                let collected = collector_state.clone();
                async move {
                    let content_type = headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *collected.lock().await = Some((content_type, body.to_vec()));
                    axum::http::StatusCode::OK
                }
            },
        ),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let sink_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, collector).await.unwrap();
    });

    let runtime =
        start_runtime(Duration::from_secs(10), plain(), Some(sink_url), 5_000_000).await;

    let internal_url = runtime.internal_url.clone();
    let worker = tokio::spawn(async move {
        run_worker_once(internal_url, "response", b"ok".to_vec()).await;
    });

    let response = reqwest::Client::new()
        .post(&runtime.external_url)
        .body("input")
        .send()
        .await
        .unwrap();

    // The caller sees the worker's status with an empty body.
    assert_eq!(response.status(), 200);
    assert!(response.text().await.unwrap().is_empty());
    worker.await.unwrap();

    let collected = collected.lock().await.take().expect("sink was called");
    assert_eq!(collected.0, "plain/text");
    assert_eq!(collected.1, b"ok");
}

#[tokio::test]
async fn test_sink_transport_failure_returns_500() {
    // Nothing listens on this port.
    let runtime = start_runtime(
        Duration::from_secs(10),
        plain(),
        Some("http://127.0.0.1:1/".to_string()),
        5_000_000,
    )
    .await;

    let internal_url = runtime.internal_url.clone();
    let worker = tokio::spawn(async move {
        run_worker_once(internal_url, "response", b"ok".to_vec()).await;
    });

    let response = reqwest::Client::new()
        .post(&runtime.external_url)
        .body("input")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    worker.await.unwrap();
}
