//! Internal event to canonical wire event projection.
//!
//! [`project`] is a pure one-to-one mapping. It never drops, merges or
//! reorders events; a stream of K execution events projects to exactly K
//! canonical events in the same order.

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::event::{
    METADATA_KEY_CHANNEL, METADATA_KEY_MODEL, METADATA_KEY_NODE, METADATA_KEY_PREGEL,
    METADATA_KEY_STATE,
};
use crate::domain::{
    ChannelUpdateMetadata, ExecutionEvent, ModelExecutionMetadata, NodeExecutionMetadata,
    PregelStepMetadata, ResponseError, StateUpdateMetadata, ToolCall, Usage,
};
use crate::metrics::METRICS;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Transport-ready view of one execution event.
///
/// Partial events only carry `content_delta`/`tool_calls_delta`; final events
/// only carry `content`/`tool_calls`/`usage`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub object: String,
    pub event_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    /// RFC 3339 with nanoseconds.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub invocation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter_key: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub runner_completion: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub graph_completion: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls_delta: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_metadata: Option<ModelExecutionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_metadata: Option<NodeExecutionMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pregel_metadata: Option<PregelStepMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_metadata: Option<ChannelUpdateMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_metadata: Option<StateUpdateMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl CanonicalEvent {
    pub fn is_terminal(&self) -> bool {
        self.runner_completion || self.error.is_some()
    }
}

/// Decode one metadata payload; failures leave the field unset.
fn decode<T: DeserializeOwned>(event: &ExecutionEvent, key: &str) -> Option<T> {
    let bytes = event.state_delta.get(key)?;
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            trace!(key, error = %err, "dropping undecodable metadata");
            None
        }
    }
}

fn non_empty<T>(items: &[T]) -> Option<Vec<T>>
where
    T: Clone,
{
    (!items.is_empty()).then(|| items.to_vec())
}

/// Project one execution event.
pub fn project(event: &ExecutionEvent) -> CanonicalEvent {
    let mut out = CanonicalEvent {
        event_type: event.object.clone(),
        object: event.object.clone(),
        event_id: event.id.clone(),
        author: event.author.clone(),
        timestamp: event
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
        request_id: event.request_id.clone(),
        invocation_id: event.invocation_id.clone(),
        parent_invocation_id: event.parent_invocation_id.clone(),
        filter_key: event.filter_key.clone(),
        runner_completion: event.is_runner_completion(),
        graph_completion: event.is_graph_completion(),
        ..CanonicalEvent::default()
    };

    out.error = event
        .error
        .clone()
        .or_else(|| event.response.as_ref().and_then(|r| r.error.clone()));

    if let Some(response) = &event.response {
        if let Some(choice) = response.first_choice() {
            if response.is_partial {
                out.content_delta =
                    (!choice.delta.content.is_empty()).then(|| choice.delta.content.clone());
                out.tool_calls_delta = non_empty(&choice.delta.tool_calls);
            } else {
                out.content =
                    (!choice.message.content.is_empty()).then(|| choice.message.content.clone());
                out.tool_calls = non_empty(&choice.message.tool_calls);
            }
        }
        if !response.is_partial {
            out.usage = response.usage;
        }
    }

    if !event.state_delta.is_empty() {
        out.model_metadata = decode(event, METADATA_KEY_MODEL);
        out.node_metadata = decode(event, METADATA_KEY_NODE);
        out.pregel_metadata = decode(event, METADATA_KEY_PREGEL);
        out.channel_metadata = decode(event, METADATA_KEY_CHANNEL);
        out.state_metadata = decode(event, METADATA_KEY_STATE);
    }

    out
}

/// Counting wrapper around [`project`].
#[derive(Debug, Default)]
pub struct EventProjector {
    projected: u64,
}

impl EventProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(&mut self, event: &ExecutionEvent) -> CanonicalEvent {
        self.projected += 1;
        METRICS.inc_events_projected();
        project(event)
    }

    pub fn projected(&self) -> u64 {
        self.projected
    }
}

/// Lazily project a stream of execution events.
pub fn project_stream<S>(events: S) -> impl Stream<Item = CanonicalEvent>
where
    S: Stream<Item = ExecutionEvent>,
{
    let mut projector = EventProjector::new();
    events.map(move |event| projector.project(&event))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireErrorBody {
    pub message: String,
}

/// One frame of the outbound stream: `{type, event}` or `{type:"error", error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<CanonicalEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireErrorBody>,
}

impl WireEnvelope {
    pub fn event(event: CanonicalEvent) -> Self {
        Self {
            kind: event.event_type.clone(),
            event: Some(event),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            event: None,
            error: Some(WireErrorBody {
                message: message.into(),
            }),
        }
    }
}
