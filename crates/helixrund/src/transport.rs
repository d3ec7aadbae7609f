//! SSE stream transport.
//!
//! Every execution event becomes exactly one `data:` frame holding a
//! [`WireEnvelope`]. Frames are never batched and no keep-alive comments are
//! interleaved. A frame that cannot be encoded is replaced by one error frame
//! and the stream ends there.

use std::convert::Infallible;
use std::pin::Pin;

use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream, StreamExt};
use helixrun_core::obs;
use helixrun_core::{EventProjector, ExecutionEvent, WireEnvelope};
use tracing::{debug, warn};

const ENCODE_FALLBACK: &str = r#"{"type":"error","error":{"message":"failed to encode event"}}"#;

type FrameBody = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub type FrameStream = Sse<FrameBody>;

fn encode(envelope: &WireEnvelope) -> Result<String, serde_json::Error> {
    serde_json::to_string(envelope)
}

fn error_frame(message: &str) -> Event {
    let data = encode(&WireEnvelope::error(message))
        .unwrap_or_else(|_| ENCODE_FALLBACK.to_string());
    Event::default().data(data)
}

/// Per-response bookkeeping. Dropping it before the stream finished means the
/// client went away.
struct Frames<S> {
    events: S,
    projector: EventProjector,
    request_id: String,
    sent: u64,
    closed: bool,
}

impl<S> Frames<S> {
    fn close(&mut self, reason: &str) {
        if !self.closed {
            self.closed = true;
            obs::emit_stream_closed(&self.request_id, self.sent, reason);
        }
    }
}

impl<S> Drop for Frames<S> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(request_id = %self.request_id, "client disconnected mid-stream");
            self.close("disconnected");
        }
    }
}

/// Frame an event stream for SSE delivery.
pub fn frames<S>(request_id: impl Into<String>, events: S) -> FrameStream
where
    S: Stream<Item = ExecutionEvent> + Send + Unpin + 'static,
{
    let state = Frames {
        events,
        projector: EventProjector::new(),
        request_id: request_id.into(),
        sent: 0,
        closed: false,
    };

    let body = stream::unfold(state, |mut state| async move {
        if state.closed {
            return None;
        }
        let Some(event) = state.events.next().await else {
            state.close("drained");
            return None;
        };

        let wire = state.projector.project(&event);
        let terminal = wire.is_terminal();
        state.sent += 1;

        let frame = match encode(&WireEnvelope::event(wire)) {
            Ok(data) => {
                if terminal {
                    state.close("completed");
                }
                Event::default().data(data)
            }
            Err(err) => {
                warn!(request_id = %state.request_id, error = %err, "event encoding failed");
                state.close("encode_error");
                error_frame(&format!("failed to encode event: {err}"))
            }
        };
        Some((Ok(frame), state))
    });

    let body: FrameBody = Box::pin(body);
    Sse::new(body)
}

/// A response carrying a single error frame.
pub fn single_error(message: &str) -> FrameStream {
    let body: FrameBody = Box::pin(stream::iter([Ok(error_frame(message))]));
    Sse::new(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use helixrun_core::domain::{object, EventOrigin};

    fn origin() -> EventOrigin {
        EventOrigin {
            author: "bot".into(),
            request_id: "req".into(),
            invocation_id: "inv".into(),
            parent_invocation_id: None,
            filter_key: "bot".into(),
        }
    }

    async fn body_text(sse: FrameStream) -> String {
        let response = sse.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_one_frame_per_event() {
        let mut done = ExecutionEvent::new(&origin(), object::RUNNER_COMPLETION);
        done.done = true;
        let events = vec![
            ExecutionEvent::new(&origin(), object::GRAPH_NODE_START),
            ExecutionEvent::new(&origin(), object::GRAPH_NODE_COMPLETE),
            done,
        ];

        let text = body_text(frames("req", stream::iter(events))).await;
        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.starts_with("data: ")));
        assert!(frames[2].contains("\"runnerCompletion\":true"));
    }

    #[tokio::test]
    async fn test_nothing_after_terminal_event() {
        let error = ExecutionEvent::error(&origin(), "tool_error", "boom");
        let trailing = ExecutionEvent::new(&origin(), object::GRAPH_NODE_START);

        let text = body_text(frames("req", stream::iter(vec![error, trailing]))).await;
        assert_eq!(text.matches("data: ").count(), 1);
        assert!(text.contains("boom"));
    }

    #[tokio::test]
    async fn test_single_error_frame() {
        let text = body_text(single_error("unknown agent ID: ghost")).await;
        assert_eq!(
            text.trim_end(),
            r#"data: {"type":"error","error":{"message":"unknown agent ID: ghost"}}"#
        );
    }
}
