//! CloudEvents v1 codec.
//!
//! Requests arrive either structured (`application/cloudevents+json`) or
//! binary (`application/json` plus `ce-*` headers); the event attributes are
//! projected into the runtime context headers a Lambda SDK exposes to the
//! handler. Worker output is wrapped back into a v1 envelope, or passed
//! through with mandatory attributes filled in when the function response
//! mode is `event`.

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::request::Parts;
use http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{CodecError, Context, Encoded};

/// Context key carrying the serialized event attributes.
pub const CE_CONTEXT_HEADER: &str = "Lambda-Runtime-Cloudevents-Context";
/// Context key mirroring the attributes in the Lambda client-context shape.
pub const CLIENT_CONTEXT_HEADER: &str = "Lambda-Runtime-Client-Context";

const CONTENT_TYPE: &str = "application/cloudevents+json";
const BINARY_CONTENT_TYPE: &str = "application/json";
const SPEC_VERSION: &str = "1.0";

/// What the function returns: the data payload only, or a full event
/// envelope in binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    #[default]
    Data,
    Event,
}

impl ResponseMode {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "data" => Some(Self::Data),
            "event" => Some(Self::Event),
            _ => None,
        }
    }
}

/// Output-side attribute overrides, configured through the `CE_*` variables.
#[derive(Debug, Clone)]
pub struct CloudEventsConfig {
    pub event_type: String,
    pub source: String,
    pub subject: String,
    pub response_mode: ResponseMode,
}

impl Default for CloudEventsConfig {
    fn default() -> Self {
        Self {
            event_type: "ce.klr.triggermesh.io".to_string(),
            source: "knative-lambda-runtime".to_string(),
            subject: "klr-response".to_string(),
            response_mode: ResponseMode::Data,
        }
    }
}

/// CloudEvents v1 envelope in binary JSON form.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    source: String,
    specversion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    #[serde(rename = "datacontenttype", skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct CloudEvents {
    config: CloudEventsConfig,
}

impl CloudEvents {
    pub fn new(config: CloudEventsConfig) -> Self {
        Self { config }
    }

    pub fn decode_request(
        &self,
        head: &Parts,
        body: Bytes,
    ) -> Result<(Bytes, Context), CodecError> {
        let content_type = head
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let (payload, attributes) = match content_type {
            CONTENT_TYPE => parse_structured(&body)?,
            BINARY_CONTENT_TYPE => (body, binary_attributes(&head.headers)),
            _ => return Ok((body, Context::new())),
        };

        let serialized =
            serde_json::to_string(&attributes).map_err(CodecError::ContextEncode)?;
        let client_context = serde_json::json!({ "custom": attributes }).to_string();

        let mut context = Context::new();
        context.insert(CE_CONTEXT_HEADER.to_string(), serialized);
        context.insert(CLIENT_CONTEXT_HEADER.to_string(), client_context);
        Ok((payload, context))
    }

    pub fn encode_response(&self, body: Bytes) -> Result<Encoded, CodecError> {
        if body.is_empty() {
            return Ok(Encoded::default());
        }

        if self.config.response_mode == ResponseMode::Event {
            return self.fill_in_envelope(&body);
        }

        // An empty configured type means the reply is dropped.
        if self.config.event_type.is_empty() {
            return Ok(Encoded::default());
        }

        let trimmed = body.trim_ascii();
        let (content_type, data) = match serde_json::from_slice::<serde_json::Value>(trimmed) {
            Ok(value) if matches!(trimmed.first(), Some(b'{') | Some(b'[')) => {
                ("application/json", value)
            }
            _ => {
                let text = String::from_utf8_lossy(trimmed);
                let unquoted = text
                    .strip_prefix('"')
                    .and_then(|t| t.strip_suffix('"'))
                    .unwrap_or(&text);
                ("text/plain", serde_json::Value::String(unquoted.to_string()))
            }
        };

        let envelope = Envelope {
            id: Uuid::new_v4().to_string(),
            event_type: self.config.event_type.clone(),
            source: self.config.source.clone(),
            specversion: SPEC_VERSION.to_string(),
            subject: (!self.config.subject.is_empty()).then(|| self.config.subject.clone()),
            time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
            content_type: Some(content_type.to_string()),
            data: Some(data),
        };

        let body = serde_json::to_vec(&envelope).map_err(CodecError::Envelope)?;
        Ok(Encoded::body(Bytes::from(body)))
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Pass-through mode: the worker already returned an envelope; only the
    /// mandatory attributes it omitted are filled in.
    fn fill_in_envelope(&self, body: &[u8]) -> Result<Encoded, CodecError> {
        let mut envelope: Envelope =
            serde_json::from_slice(body).map_err(CodecError::Envelope)?;

        if envelope.id.is_empty() {
            envelope.id = Uuid::new_v4().to_string();
        }
        if envelope.event_type.is_empty() {
            envelope.event_type = self.config.event_type.clone();
        }
        if envelope.source.is_empty() {
            envelope.source = self.config.source.clone();
        }
        if envelope.specversion.is_empty() {
            envelope.specversion = SPEC_VERSION.to_string();
        }

        let body = serde_json::to_vec(&envelope).map_err(CodecError::Envelope)?;
        Ok(Encoded::body(Bytes::from(body)))
    }
}

/// Structured mode: the body is the envelope. `data` becomes the worker
/// payload, every other top-level attribute goes into the context.
fn parse_structured(body: &[u8]) -> Result<(Bytes, BTreeMap<String, String>), CodecError> {
    let mut event: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(body).map_err(CodecError::Envelope)?;

    let payload = match event.remove("data") {
        Some(data) => Bytes::from(serde_json::to_vec(&data).map_err(CodecError::Envelope)?),
        None => Bytes::new(),
    };

    let attributes = event
        .into_iter()
        .map(|(name, value)| (name, stringify(value)))
        .collect();
    Ok((payload, attributes))
}

/// Binary mode: attributes come from `ce-*` headers, prefix stripped,
/// repeated values comma-joined.
fn binary_attributes(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for (name, value) in headers {
        let Some(attribute) = name.as_str().strip_prefix("ce-") else {
            continue;
        };
        let Ok(value) = value.to_str() else { continue };
        match attributes.entry(attribute.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
            }
            Entry::Occupied(mut slot) => {
                let joined = slot.get_mut();
                joined.push(',');
                joined.push_str(value);
            }
        }
    }
    attributes
}

fn stringify(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
