//! Global atomic counters for HelixRun.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    runs_started: AtomicU64,
    runs_failed: AtomicU64,
    events_projected: AtomicU64,
    build_failures: AtomicU64,
    tool_calls: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            events_projected: AtomicU64::new(0),
            build_failures: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    pub fn inc_events_projected(&self) {
        self.events_projected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_build_failures(&self) {
        self.build_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "build_failures", "counter incremented");
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_calls", "counter incremented");
    }

    /// Emit all current counter values as one `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            runs_failed = self.runs_failed(),
            events_projected = self.events_projected(),
            build_failures = self.build_failures(),
            tool_calls = self.tool_calls(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn events_projected(&self) -> u64 {
        self.events_projected.load(Ordering::Relaxed)
    }

    pub fn build_failures(&self) -> u64 {
        self.build_failures.load(Ordering::Relaxed)
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_started.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.events_projected.store(0, Ordering::Relaxed);
        self.build_failures.store(0, Ordering::Relaxed);
        self.tool_calls.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_reset() {
        let m = Metrics::new();
        m.inc_runs_started();
        m.inc_runs_started();
        m.inc_tool_calls();
        assert_eq!(m.runs_started(), 2);
        assert_eq!(m.tool_calls(), 1);
        assert_eq!(m.runs_failed(), 0);

        m.reset();
        assert_eq!(m.runs_started(), 0);
        assert_eq!(m.tool_calls(), 0);
    }
}
