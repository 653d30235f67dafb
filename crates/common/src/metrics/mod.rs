//! Metrics and observability utilities
//!
//! Prometheus metrics for the chat gateway. Everything is recorded through
//! the `metrics` facade; the gateway installs the exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::{Duration, Instant};

/// Metrics prefix for all LingoChat metrics
pub const METRICS_PREFIX: &str = "lingochat";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Buckets for model completion latency (much slower than plain requests)
pub const COMPLETION_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    4.000, // 4s
    8.000, // 8s
    15.00, // 15s
    30.00, // 30s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Chat metrics
    describe_counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        Unit::Count,
        "Chat turns by outcome"
    );

    describe_counter!(
        format!("{}_detected_languages_total", METRICS_PREFIX),
        Unit::Count,
        "Detected language of user messages"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Model completion latency in seconds"
    );

    describe_counter!(
        format!("{}_completion_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total model completion errors"
    );

    // Usage metrics
    describe_counter!(
        format!("{}_usage_flushes_total", METRICS_PREFIX),
        Unit::Count,
        "Usage flushes by outcome"
    );

    // Session metrics
    describe_counter!(
        format!("{}_sessions_created_total", METRICS_PREFIX),
        Unit::Count,
        "Sessions started"
    );

    describe_counter!(
        format!("{}_sessions_expired_total", METRICS_PREFIX),
        Unit::Count,
        "Sessions discarded after the idle timeout"
    );

    describe_counter!(
        format!("{}_sessions_closed_total", METRICS_PREFIX),
        Unit::Count,
        "Sessions ended by logout or identity switch"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Outcome of one chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Success,
    Rejected,
    ProviderError,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Success => "success",
            TurnOutcome::Rejected => "rejected",
            TurnOutcome::ProviderError => "provider_error",
        }
    }
}

pub fn record_chat_turn(outcome: TurnOutcome) {
    counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_language(lang: &str) {
    counter!(
        format!("{}_detected_languages_total", METRICS_PREFIX),
        "lang" => lang.to_string()
    )
    .increment(1);
}

/// Helper to record completion metrics
pub fn record_completion(duration: Duration, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    if !success {
        counter!(
            format!("{}_completion_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

pub fn record_usage_flush(success: bool) {
    counter!(
        format!("{}_usage_flushes_total", METRICS_PREFIX),
        "outcome" => if success { "success" } else { "error" }
    )
    .increment(1);
}

pub fn record_session_created() {
    counter!(format!("{}_sessions_created_total", METRICS_PREFIX)).increment(1);
}

pub fn record_session_expired() {
    counter!(format!("{}_sessions_expired_total", METRICS_PREFIX)).increment(1);
}

/// `reason` is `logout` or `identity_switch`
pub fn record_session_closed(reason: &'static str) {
    counter!(
        format!("{}_sessions_closed_total", METRICS_PREFIX),
        "reason" => reason
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_sorted() {
        for buckets in [LATENCY_BUCKETS, COMPLETION_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
        // Completions can run up to the provider timeout
        assert_eq!(COMPLETION_BUCKETS.last(), Some(&60.0));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        let metrics = RequestMetrics::start("POST", "/api/chat");
        metrics.finish(200);
        record_chat_turn(TurnOutcome::Success);
        record_completion(Duration::from_millis(120), "gemini-2.5-flash", false);
        record_usage_flush(true);
        record_session_closed("logout");
    }

    #[test]
    fn test_turn_outcome_labels() {
        assert_eq!(TurnOutcome::ProviderError.as_str(), "provider_error");
        assert_eq!(TurnOutcome::Rejected.as_str(), "rejected");
    }
}
