//! Lambda Runtime API served to bootstrap processes.
//!
//! Implements the worker-facing side of the contract: long-poll for the
//! next invocation, post its result or error, report init failures.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use runtide_core::{Dispatcher, InvocationReply};

const INVOCATION_PREFIX: &str = "/2018-06-01/runtime/invocation/";
const INVOKED_FUNCTION_ARN: &str =
    "arn:aws:lambda:us-east-1:123456789012:function:custom-runtime";

pub fn runtime_api_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/2018-06-01/runtime/invocation/next", get(next_invocation))
        .route(
            "/2018-06-01/runtime/invocation/:id/:kind",
            post(invocation_result),
        )
        .route("/2018-06-01/runtime/init/error", post(init_error))
        .route("/2018-06-01/ping", get(ping))
        .fallback(unknown_path)
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// GET /2018-06-01/runtime/invocation/next
///
/// Blocks on the task queue until an invocation is available.
async fn next_invocation(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    let Some(invocation) = dispatcher.next_invocation().await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "invocation queue is closed")
            .into_response();
    };

    debug!(id = %invocation.id, "delivering invocation to runtime");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("Lambda-Runtime-Aws-Request-Id", &invocation.id)
        .header(
            "Lambda-Runtime-Deadline-Ms",
            invocation.deadline_ms().to_string(),
        )
        .header("Lambda-Runtime-Invoked-Function-Arn", INVOKED_FUNCTION_ARN)
        .header("Lambda-Runtime-Trace-Id", "0");

    for (name, value) in &invocation.context {
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), value);
        }
    }

    builder.body(Body::from(invocation.payload)).unwrap()
}

/// POST /2018-06-01/runtime/invocation/{id}/{response|error}
async fn invocation_result(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path((id, kind)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    // An expired or unknown id answers 410 whatever the kind; only a live
    // invocation gets told about a bad endpoint.
    if !dispatcher.has_pending(&id).await {
        return (StatusCode::GONE, "Function deadline is reached").into_response();
    }

    let reply = match kind.as_str() {
        "response" => InvocationReply::response(&id, body),
        "error" => InvocationReply::error(&id, body),
        _ => {
            return (StatusCode::NOT_FOUND, format!("Unknown endpoint: {kind}"))
                .into_response()
        }
    };

    debug!(id = %id, kind = %kind, "runtime result received");

    if dispatcher.deliver(&id, reply).await {
        StatusCode::ACCEPTED.into_response()
    } else {
        (StatusCode::GONE, "Function deadline is reached").into_response()
    }
}

/// POST /2018-06-01/runtime/init/error
///
/// The worker could not initialize; nothing useful can happen anymore, the
/// orchestrator owns the restart.
async fn init_error(body: Bytes) -> Response {
    error!(
        error = %String::from_utf8_lossy(&body),
        "runtime initialization error"
    );
    std::process::exit(1);
}

async fn ping() -> Response {
    (StatusCode::OK, "pong").into_response()
}

/// Anything under the invocation prefix that is not exactly two non-empty
/// segments is a malformed runtime request.
async fn unknown_path(uri: Uri) -> Response {
    if uri.path().starts_with(INVOCATION_PREFIX) {
        return (StatusCode::BAD_REQUEST, "incorrect URL path").into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}
