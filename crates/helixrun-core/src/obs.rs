//! Structured observability hooks for the run lifecycle.
//!
//! - `span` tags everything logged by one run's producer with its request id
//! - `emit_*` functions log lifecycle events at a stable `event` field
//!
//! Filter with `HELIXRUN_LOG`, e.g. `HELIXRUN_LOG=helixrun_core=debug`.

use tracing::{info, warn};

/// Run-scoped span, for instrumenting the spawned producer.
pub fn span(request_id: &str, agent_id: &str) -> tracing::Span {
    tracing::info_span!("helixrun.run", request_id = %request_id, agent_id = %agent_id)
}

/// Emit event: run started.
pub fn emit_run_started(request_id: &str, agent_id: &str, session: &str) {
    info!(event = "run.started", request_id = %request_id, agent_id = %agent_id, session = %session);
}

/// Emit event: run finished with duration, emitted event count and outcome.
pub fn emit_run_finished(request_id: &str, duration_ms: u64, total_events: u64, success: bool) {
    info!(
        event = "run.finished",
        request_id = %request_id,
        duration_ms = duration_ms,
        total_events = total_events,
        success = success,
    );
}

pub fn emit_agent_built(agent_id: &str, kind: &str) {
    info!(event = "agent.built", agent_id = %agent_id, kind = %kind);
}

/// Emit event: agent construction failed (warning level).
pub fn emit_agent_build_failed(agent_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "agent.build_failed", agent_id = %agent_id, error = %error);
}

/// Emit event: an outbound event stream closed.
pub fn emit_stream_closed(request_id: &str, frames: u64, reason: &str) {
    info!(event = "stream.closed", request_id = %request_id, frames = frames, reason = %reason);
}

