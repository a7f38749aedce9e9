//! Identity codec: bytes in, bytes out.

use bytes::Bytes;

use crate::{CodecError, Context, Encoded};

// Historical literal, kept for wire compatibility with existing consumers.
const CONTENT_TYPE: &str = "plain/text";

#[derive(Debug, Default)]
pub struct Plain;

impl Plain {
    pub fn new() -> Self {
        Self
    }

    pub fn decode_request(&self, body: Bytes) -> Result<(Bytes, Context), CodecError> {
        Ok((body, Context::new()))
    }

    pub fn encode_response(&self, body: Bytes) -> Result<Encoded, CodecError> {
        Ok(Encoded::body(body))
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_identity() {
        let codec = Plain::new();
        let input = Bytes::from_static(b"hello world");

        let (payload, context) = codec.decode_request(input.clone()).unwrap();
        assert_eq!(payload, input);
        assert!(context.is_empty());

        let encoded = codec.encode_response(payload).unwrap();
        assert_eq!(encoded.body, input);
        assert!(encoded.status.is_none());
        assert!(encoded.headers.is_empty());
    }
}
