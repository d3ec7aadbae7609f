//! Internal execution events.
//!
//! An [`ExecutionEvent`] is one occurrence during a run: a model delta, a
//! final model result, a tool result, a graph node or superstep boundary, a
//! state update, an error, or the run-level completion marker. Events are
//! produced by agents, consumed once by the projector, then dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

/// Event object tags.
pub mod object {
    pub const CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";
    pub const CHAT_COMPLETION: &str = "chat.completion";
    pub const TOOL_RESPONSE: &str = "tool.response";
    pub const GRAPH_NODE_START: &str = "graph.node.start";
    pub const GRAPH_NODE_COMPLETE: &str = "graph.node.complete";
    pub const GRAPH_NODE_ERROR: &str = "graph.node.error";
    pub const GRAPH_PREGEL_STEP: &str = "graph.pregel.step";
    pub const GRAPH_CHANNEL_UPDATE: &str = "graph.channel.update";
    pub const GRAPH_STATE_UPDATE: &str = "graph.state.update";
    pub const GRAPH_EXECUTION: &str = "graph.execution";
    pub const RUNNER_COMPLETION: &str = "runner.completion";
    pub const ERROR: &str = "error";
}

/// `state_delta` keys under which structured metadata is attached.
pub const METADATA_KEY_MODEL: &str = "_model_metadata";
pub const METADATA_KEY_NODE: &str = "_node_metadata";
pub const METADATA_KEY_PREGEL: &str = "_pregel_metadata";
pub const METADATA_KEY_CHANNEL: &str = "_channel_metadata";
pub const METADATA_KEY_STATE: &str = "_state_metadata";

/// Token accounting for one model call.
///
/// Counts come from the provider unchecked, so arithmetic saturates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Error description carried on events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ResponseError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            code: None,
        }
    }
}

/// One choice of a model response. Partial responses fill `delta`, final
/// responses fill `message`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Choice {
    pub index: usize,
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub delta: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A partial or final response from the model capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub is_partial: bool,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl ModelResponse {
    /// An in-progress increment of model output.
    pub fn partial(id: impl Into<String>, model: impl Into<String>, delta: Message) -> Self {
        Self {
            id: id.into(),
            object: object::CHAT_COMPLETION_CHUNK.to_string(),
            created: Utc::now().timestamp(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                delta,
                ..Choice::default()
            }],
            usage: None,
            is_partial: true,
            done: false,
            error: None,
        }
    }

    /// The completed result of one model call.
    pub fn complete(
        id: impl Into<String>,
        model: impl Into<String>,
        message: Message,
        usage: Option<Usage>,
    ) -> Self {
        let finish_reason = if message.has_tool_calls() {
            "tool_calls"
        } else {
            "stop"
        };
        Self {
            id: id.into(),
            object: object::CHAT_COMPLETION.to_string(),
            created: Utc::now().timestamp(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: Some(finish_reason.to_string()),
                ..Choice::default()
            }],
            usage,
            is_partial: false,
            done: true,
            error: None,
        }
    }

    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }
}

/// Correlation identity stamped on every event of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventOrigin {
    pub author: String,
    pub request_id: String,
    pub invocation_id: String,
    pub parent_invocation_id: Option<String>,
    pub filter_key: String,
}

/// One occurrence during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub id: String,
    pub object: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub invocation_id: String,
    pub parent_invocation_id: Option<String>,
    pub filter_key: String,
    pub response: Option<ModelResponse>,
    /// Raw JSON payloads keyed by `METADATA_KEY_*`.
    pub state_delta: BTreeMap<String, Vec<u8>>,
    pub error: Option<ResponseError>,
    pub done: bool,
}

impl ExecutionEvent {
    pub fn new(origin: &EventOrigin, object: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            object: object.into(),
            author: origin.author.clone(),
            timestamp: Utc::now(),
            request_id: origin.request_id.clone(),
            invocation_id: origin.invocation_id.clone(),
            parent_invocation_id: origin.parent_invocation_id.clone(),
            filter_key: origin.filter_key.clone(),
            response: None,
            state_delta: BTreeMap::new(),
            error: None,
            done: false,
        }
    }

    /// Wrap a model response; the event object follows the response object.
    pub fn from_response(origin: &EventOrigin, response: ModelResponse) -> Self {
        let object = if response.object.is_empty() {
            if response.is_partial {
                object::CHAT_COMPLETION_CHUNK.to_string()
            } else {
                object::CHAT_COMPLETION.to_string()
            }
        } else {
            response.object.clone()
        };
        let mut event = Self::new(origin, object);
        event.done = response.done;
        event.response = Some(response);
        event
    }

    pub fn error(origin: &EventOrigin, kind: &str, message: impl Into<String>) -> Self {
        let mut event = Self::new(origin, object::ERROR);
        event.error = Some(ResponseError::new(kind, message));
        event.done = true;
        event
    }

    /// Attach a metadata payload. Serialization failures leave the key unset.
    pub fn with_metadata<T: Serialize>(mut self, key: &str, value: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.state_delta.insert(key.to_string(), bytes);
        }
        self
    }

    pub fn with_raw_metadata(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.state_delta.insert(key.to_string(), bytes);
        self
    }

    pub fn is_partial(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.is_partial)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.response.as_ref().is_some_and(|r| r.error.is_some())
    }

    /// True only for the single event that ends a whole invocation.
    pub fn is_runner_completion(&self) -> bool {
        self.object == object::RUNNER_COMPLETION && self.done
    }

    pub fn is_graph_completion(&self) -> bool {
        self.object == object::GRAPH_EXECUTION && self.done
    }
}
