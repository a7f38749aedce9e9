//! Event processing stats.
//!
//! Counters are keyed by the event type/source tags extracted from the
//! request context, so CloudEvents traffic is broken out per event kind
//! while raw HTTP lands under the defaults. The reporter is internally
//! synchronized and consumed on every request.

use dashmap::DashMap;
use runtide_codec::cloudevents::CE_CONTEXT_HEADER;
use runtide_core::Context;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_REQUEST_TYPE: &str = "plain-http";
pub const DEFAULT_REQUEST_SOURCE: &str = "unknown";

#[derive(Debug, Default)]
struct EventStats {
    success_count: AtomicU64,
    error_count: AtomicU64,
    user_managed_error_count: AtomicU64,
    latency_count: AtomicU64,
    latency_sum_ms: AtomicU64,
}

/// Point-in-time view of one tag pair's counters, for tests and reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub success_count: u64,
    pub error_count: u64,
    pub user_managed_error_count: u64,
    pub latency_count: u64,
    pub latency_sum_ms: u64,
}

#[derive(Debug, Default)]
pub struct StatsReporter {
    events: DashMap<(String, String), EventStats>,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_processing_success(&self, event_type: &str, event_source: &str) {
        self.entry(event_type, event_source, |stats| {
            stats.success_count.fetch_add(1, Ordering::Relaxed);
        });
    }

    pub fn report_processing_error(
        &self,
        user_managed: bool,
        event_type: &str,
        event_source: &str,
    ) {
        self.entry(event_type, event_source, |stats| {
            stats.error_count.fetch_add(1, Ordering::Relaxed);
            if user_managed {
                stats.user_managed_error_count.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    pub fn report_processing_latency(
        &self,
        elapsed: Duration,
        event_type: &str,
        event_source: &str,
    ) {
        self.entry(event_type, event_source, |stats| {
            stats.latency_count.fetch_add(1, Ordering::Relaxed);
            stats
                .latency_sum_ms
                .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        });
    }

    pub fn snapshot(&self, event_type: &str, event_source: &str) -> StatsSnapshot {
        let key = (event_type.to_string(), event_source.to_string());
        match self.events.get(&key) {
            Some(stats) => StatsSnapshot {
                success_count: stats.success_count.load(Ordering::Relaxed),
                error_count: stats.error_count.load(Ordering::Relaxed),
                user_managed_error_count: stats
                    .user_managed_error_count
                    .load(Ordering::Relaxed),
                latency_count: stats.latency_count.load(Ordering::Relaxed),
                latency_sum_ms: stats.latency_sum_ms.load(Ordering::Relaxed),
            },
            None => StatsSnapshot::default(),
        }
    }

    fn entry(&self, event_type: &str, event_source: &str, record: impl FnOnce(&EventStats)) {
        let key = (event_type.to_string(), event_source.to_string());
        record(&self.events.entry(key).or_default());
    }
}

/// CloudEvents type/source tags from a decoded request context, falling back
/// to the raw-request defaults.
pub fn tags_from_context(context: &Context) -> (String, String) {
    let defaults = || {
        (
            DEFAULT_REQUEST_TYPE.to_string(),
            DEFAULT_REQUEST_SOURCE.to_string(),
        )
    };

    let Some(raw) = context.get(CE_CONTEXT_HEADER) else {
        return defaults();
    };
    let Ok(attributes) = serde_json::from_str::<HashMap<String, String>>(raw) else {
        return defaults();
    };

    (
        attributes
            .get("type")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REQUEST_TYPE.to_string()),
        attributes
            .get("source")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REQUEST_SOURCE.to_string()),
    )
}
