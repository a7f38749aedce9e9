//! Response dispatch: reply on the original connection or forward to a sink.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use tracing::error;

use runtide_codec::Encoded;

/// Writes encoded responses either back to the caller or, when a sink is
/// configured, to the sink with only the status mirrored to the caller.
pub struct Sender {
    target: Option<String>,
    content_type: &'static str,
    client: reqwest::Client,
}

impl Sender {
    pub fn new(target: Option<String>, content_type: &'static str) -> Self {
        Self {
            target,
            content_type,
            client: reqwest::Client::new(),
        }
    }

    /// Returns the response for the original caller and whether the dispatch
    /// succeeded.
    pub async fn send(&self, encoded: Encoded, status: StatusCode) -> (Response, bool) {
        match &self.target {
            Some(target) => self.forward(target, encoded.body, status).await,
            None => (self.reply(encoded, status), true),
        }
    }

    fn reply(&self, encoded: Encoded, status: StatusCode) -> Response {
        let status = encoded.status.unwrap_or(status);
        let mut response = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, self.content_type)
            .body(Body::from(encoded.body))
            .unwrap();
        // Codec-extracted headers win over the advertised content type.
        response.headers_mut().extend(encoded.headers);
        response
    }

    async fn forward(
        &self,
        target: &str,
        body: Bytes,
        status: StatusCode,
    ) -> (Response, bool) {
        let result = self
            .client
            .post(target)
            .header(header::CONTENT_TYPE, self.content_type)
            .body(body)
            .send()
            .await;

        match result {
            Ok(upstream) => {
                // The sink's response body may carry useful information, but
                // there is nowhere to deliver it.
                let _ = upstream.bytes().await;
                let response = Response::builder()
                    .status(status)
                    .body(Body::empty())
                    .unwrap();
                (response, true)
            }
            Err(err) => {
                error!(error = %err, "failed to send data to the sink");
                let response = Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::empty())
                    .unwrap();
                (response, false)
            }
        }
    }
}
