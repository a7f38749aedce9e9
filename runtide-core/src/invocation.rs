//! Invocation data model

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Protocol headers attached to the invocation when it is handed to a worker.
pub type Context = HashMap<String, String>;

/// A single in-flight unit of work, created by the external API and consumed
/// by exactly one polling worker.
#[derive(Debug)]
pub struct Invocation {
    pub id: String,
    pub deadline: DateTime<Utc>,
    pub payload: Bytes,
    pub context: Context,
}

impl Invocation {
    pub fn new(payload: Bytes, context: Context, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            id: Uuid::new_v4().to_string(),
            deadline: Utc::now() + ttl,
            payload,
            context,
        }
    }

    /// Deadline as milliseconds since epoch, the unit the documented Lambda
    /// contract uses for `Lambda-Runtime-Deadline-Ms`.
    pub fn deadline_ms(&self) -> i64 {
        self.deadline.timestamp_millis()
    }
}

/// The terminal outcome of an invocation: a worker reply, a worker error,
/// or the synthesized deadline message.
#[derive(Debug)]
pub struct InvocationReply {
    pub id: String,
    pub body: Bytes,
    pub status: StatusCode,
}

impl InvocationReply {
    pub fn response(id: &str, body: Bytes) -> Self {
        Self {
            id: id.to_string(),
            body,
            status: StatusCode::OK,
        }
    }

    pub fn error(id: &str, body: Bytes) -> Self {
        Self {
            id: id.to_string(),
            body,
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Synthesized when the TTL fires before a worker delivers.
    pub fn deadline(id: &str, payload: &Bytes) -> Self {
        Self {
            id: id.to_string(),
            body: Bytes::from(format!(
                "Deadline is reached, data {}",
                String::from_utf8_lossy(payload)
            )),
            status: StatusCode::GONE,
        }
    }
}
