//! External request surface.
//!
//! A single catch-all handler runs every request through the configured
//! codec, hands it to the dispatcher, and sends the outcome back through
//! the sender.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use runtide_codec::{Codec, Encoded};
use runtide_core::Dispatcher;

use crate::metrics::{self, StatsReporter, DEFAULT_REQUEST_SOURCE, DEFAULT_REQUEST_TYPE};
use crate::sender::Sender;

/// Everything one request needs, shared across connections.
pub struct Gateway {
    pub dispatcher: Arc<Dispatcher>,
    pub codec: Codec,
    pub sender: Sender,
    pub reporter: Arc<StatsReporter>,
    /// Request body cap in bytes.
    pub request_size_limit: usize,
}

pub fn gateway_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", any(serve))
        .route("/*path", any(serve))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn serve(State(gateway): State<Arc<Gateway>>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let mut event_type = DEFAULT_REQUEST_TYPE.to_string();
    let mut event_source = DEFAULT_REQUEST_SOURCE.to_string();

    let body = match axum::body::to_bytes(body, gateway.request_size_limit).await {
        Ok(body) => body,
        Err(err) => {
            gateway
                .reporter
                .report_processing_error(false, &event_type, &event_source);
            gateway
                .reporter
                .report_processing_latency(start.elapsed(), &event_type, &event_source);
            error!("request exceeds allowed size limit, rejecting");
            return (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()).into_response();
        }
    };

    let (payload, context) = match gateway.codec.decode_request(&parts, body) {
        Ok(decoded) => decoded,
        Err(err) => {
            gateway
                .reporter
                .report_processing_error(false, &event_type, &event_source);
            gateway
                .reporter
                .report_processing_latency(start.elapsed(), &event_type, &event_source);
            error!(error = %err, "cannot convert request");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    (event_type, event_source) = metrics::tags_from_context(&context);

    debug!(?context, "enqueuing request");
    let reply = gateway.dispatcher.dispatch(payload, context).await;
    debug!(id = %reply.id, status = %reply.status, "invocation finished");

    let encoded = match gateway.codec.encode_response(reply.body.clone()) {
        Ok(encoded) => encoded,
        Err(err) => {
            error!(error = %err, "cannot convert response");
            Encoded::body(Bytes::from(format!("Response conversion error: {err}")))
        }
    };

    let (response, delivered) = gateway.sender.send(encoded, reply.status).await;
    if delivered {
        gateway
            .reporter
            .report_processing_success(&event_type, &event_source);
    } else {
        gateway
            .reporter
            .report_processing_error(false, &event_type, &event_source);
    }
    gateway
        .reporter
        .report_processing_latency(start.elapsed(), &event_type, &event_source);

    response
}
