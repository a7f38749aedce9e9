//! Request/response codecs for the runtide sidecar.
//!
//! A codec bridges the external wire format (plain HTTP, CloudEvents,
//! API Gateway proxy events) to the opaque payloads exchanged with workers.
//! Codecs are selected once at startup and never perform I/O beyond
//! (de)serialization.

pub mod apigateway;
pub mod cloudevents;
pub mod plain;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use thiserror::Error;

pub use cloudevents::{CloudEvents, CloudEventsConfig, ResponseMode};
pub use runtide_core::Context;

use apigateway::ApiGateway;
use plain::Plain;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot parse CloudEvents envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("cannot encode request context: {0}")]
    ContextEncode(#[source] serde_json::Error),

    #[error("cannot build API Gateway proxy event: {0}")]
    ProxyEvent(#[source] serde_json::Error),

    #[error("cannot parse API Gateway proxy response: {0}")]
    ProxyResponse(#[source] serde_json::Error),

    #[error("cannot decode base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An encoded response plus the transport overrides a codec may extract
/// (only the API Gateway codec sets status or headers).
#[derive(Debug, Default)]
pub struct Encoded {
    pub body: Bytes,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

impl Encoded {
    pub fn body(body: Bytes) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }
}

/// The codec selected from configuration. A tagged variant rather than a
/// trait object: the set is closed and selection happens once.
pub enum Codec {
    Plain(Plain),
    CloudEvents(CloudEvents),
    ApiGateway(ApiGateway),
}

impl Codec {
    /// Selects the codec for a `RESPONSE_FORMAT` value. Unknown or absent
    /// values fall back to the plain codec.
    pub fn from_format(format: Option<&str>, config: CloudEventsConfig) -> Self {
        match format {
            Some("CLOUDEVENTS") => Self::CloudEvents(CloudEvents::new(config)),
            Some("API_GATEWAY") => Self::ApiGateway(ApiGateway::new()),
            _ => Self::Plain(Plain::new()),
        }
    }

    /// Translates an external request into the payload and protocol context
    /// handed to a worker.
    pub fn decode_request(
        &self,
        head: &Parts,
        body: Bytes,
    ) -> Result<(Bytes, Context), CodecError> {
        match self {
            Self::Plain(codec) => codec.decode_request(body),
            Self::CloudEvents(codec) => codec.decode_request(head, body),
            Self::ApiGateway(codec) => codec.decode_request(head, body),
        }
    }

    /// Translates a worker's output into the externally visible response.
    pub fn encode_response(&self, body: Bytes) -> Result<Encoded, CodecError> {
        match self {
            Self::Plain(codec) => codec.encode_response(body),
            Self::CloudEvents(codec) => codec.encode_response(body),
            Self::ApiGateway(codec) => codec.encode_response(body),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Plain(codec) => codec.content_type(),
            Self::CloudEvents(codec) => codec.content_type(),
            Self::ApiGateway(codec) => codec.content_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_selection() {
        let config = CloudEventsConfig::default();
        assert!(matches!(
            Codec::from_format(Some("CLOUDEVENTS"), config.clone()),
            Codec::CloudEvents(_)
        ));
        assert!(matches!(
            Codec::from_format(Some("API_GATEWAY"), config.clone()),
            Codec::ApiGateway(_)
        ));
        assert!(matches!(
            Codec::from_format(Some("bogus"), config.clone()),
            Codec::Plain(_)
        ));
        assert!(matches!(Codec::from_format(None, config), Codec::Plain(_)));
    }
}
