//! Observability: tracing subscriber setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global `fmt` subscriber. `RUST_LOG` wins over the configured filter.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording request-layer and poller counters
#[derive(Debug, Default)]
pub struct Metrics {
    requests_sent: AtomicU64,
    dedupe_hits: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    polls: AtomicU64,
    poll_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "requests_sent", "Metric incremented");
    }

    pub fn dedupe_hit(&self) {
        self.dedupe_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "dedupe_hits", "Metric incremented");
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "retries", "Metric incremented");
    }

    pub fn attempt_timed_out(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "timeouts", "Metric incremented");
    }

    pub fn poll_issued(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "polls", "Metric incremented");
    }

    pub fn poll_failed(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "poll_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            dedupe_hits: self.dedupe_hits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_sent: u64,
    pub dedupe_hits: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub polls: u64,
    pub poll_failures: u64,
}
