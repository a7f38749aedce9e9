//! API Gateway proxy event codec.
//!
//! Requests are rewritten into the API Gateway proxy event JSON a Lambda
//! handler expects; worker output must be a proxy response object whose
//! status, headers and body are lifted onto the outgoing HTTP response.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::{CodecError, Context, Encoded};

const CONTENT_TYPE: &str = "application/json";

/// API Gateway proxy integration request event.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRequest {
    body: String,
    headers: BTreeMap<String, String>,
    http_method: String,
    path: String,
    query_string_parameters: BTreeMap<String, String>,
    is_base64_encoded: bool,
}

/// API Gateway proxy integration response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProxyResponse {
    status_code: u16,
    headers: BTreeMap<String, String>,
    body: String,
    is_base64_encoded: bool,
}

#[derive(Debug, Default)]
pub struct ApiGateway;

impl ApiGateway {
    pub fn new() -> Self {
        Self
    }

    pub fn decode_request(
        &self,
        head: &Parts,
        body: Bytes,
    ) -> Result<(Bytes, Context), CodecError> {
        let mut headers = BTreeMap::new();
        for (name, value) in &head.headers {
            let Ok(value) = value.to_str() else { continue };
            join_value(&mut headers, name.as_str(), value);
        }

        let mut query = BTreeMap::new();
        if let Some(raw) = head.uri.query() {
            for (name, value) in form_urlencoded::parse(raw.as_bytes()) {
                join_value(&mut query, &name, &value);
            }
        }

        // Binary bodies ride through the proxy event base64-encoded.
        let (body, is_base64_encoded) = match String::from_utf8(body.to_vec()) {
            Ok(text) => (text, false),
            Err(_) => (BASE64.encode(&body), true),
        };

        let event = ProxyRequest {
            body,
            headers,
            http_method: head.method.to_string(),
            path: head.uri.path().to_string(),
            query_string_parameters: query,
            is_base64_encoded,
        };

        let payload = serde_json::to_vec(&event).map_err(CodecError::ProxyEvent)?;
        Ok((Bytes::from(payload), Context::new()))
    }

    pub fn encode_response(&self, body: Bytes) -> Result<Encoded, CodecError> {
        let proxy: ProxyResponse =
            serde_json::from_slice(&body).map_err(CodecError::ProxyResponse)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &proxy.headers {
            let Ok(name) = HeaderName::try_from(name.as_str()) else {
                continue;
            };
            let Ok(value) = HeaderValue::from_str(value) else {
                continue;
            };
            headers.insert(name, value);
        }

        let status = (proxy.status_code >= 200)
            .then(|| StatusCode::from_u16(proxy.status_code).ok())
            .flatten();

        let body = if proxy.is_base64_encoded {
            Bytes::from(BASE64.decode(proxy.body.as_bytes())?)
        } else {
            Bytes::from(proxy.body)
        };

        Ok(Encoded {
            body,
            status,
            headers,
        })
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }
}

fn join_value(map: &mut BTreeMap<String, String>, name: &str, value: &str) {
    match map.entry(name.to_string()) {
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
