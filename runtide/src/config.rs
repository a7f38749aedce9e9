//! Runtime configuration.

use clap::Parser;
use runtide_codec::{CloudEventsConfig, ResponseMode};
use std::time::Duration;

/// Sidecar configuration. Every flag binds the environment variable the
/// deployment contract names, so `runtide` needs no arguments in practice.
#[derive(Parser, Debug, Clone)]
#[command(name = "runtide")]
#[command(about = "AWS Lambda Custom Runtime API emulator", long_about = None)]
pub struct Config {
    /// Number of bootstrap processes
    #[arg(long, env = "INVOKER_COUNT", default_value_t = 4)]
    pub invoker_count: usize,

    /// Request body size limit, MB
    #[arg(long, env = "REQUEST_SIZE_LIMIT", default_value_t = 5)]
    pub request_size_limit: u64,

    /// Per-invocation deadline
    #[arg(long, env = "FUNCTION_TTL", default_value = "10s", value_parser = parse_duration)]
    pub function_ttl: Duration,

    /// Lambda Runtime API port served to the bootstrap processes
    #[arg(long, env = "INTERNAL_API_PORT", default_value_t = 80)]
    pub internal_api_port: u16,

    /// Port to accept function requests on. Knative communicates the
    /// expected port through the same variable.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Optional address to POST responses to instead of replying
    #[arg(long, env = "K_SINK")]
    pub sink: Option<String>,

    /// Response format: CLOUDEVENTS, API_GATEWAY, anything else is plain
    #[arg(long, env = "RESPONSE_FORMAT")]
    pub response_format: Option<String>,

    /// CloudEvents type for wrapped responses; empty drops the reply body
    #[arg(long, env = "CE_TYPE", default_value = "ce.klr.triggermesh.io")]
    pub ce_type: String,

    /// CloudEvents source for wrapped responses
    #[arg(long, env = "CE_SOURCE", default_value = "knative-lambda-runtime")]
    pub ce_source: String,

    /// CloudEvents subject for wrapped responses
    #[arg(long, env = "CE_SUBJECT", default_value = "klr-response")]
    pub ce_subject: String,

    /// "data" wraps the worker payload, "event" passes its envelope through
    #[arg(long, env = "CE_FUNCTION_RESPONSE_MODE", default_value = "data")]
    pub ce_function_response_mode: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Request body cap in bytes.
    pub fn request_size_limit_bytes(&self) -> usize {
        self.request_size_limit.saturating_mul(1_000_000) as usize
    }

    pub fn cloudevents(&self) -> CloudEventsConfig {
        CloudEventsConfig {
            event_type: self.ce_type.clone(),
            source: self.ce_source.clone(),
            subject: self.ce_subject.clone(),
            response_mode: ResponseMode::from_str(&self.ce_function_response_mode)
                .unwrap_or_default(),
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}
