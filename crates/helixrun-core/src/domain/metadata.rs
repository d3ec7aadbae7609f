//! Structured metadata attached to execution events.
//!
//! Each kind is serialized into the event's `state_delta` under its
//! `METADATA_KEY_*` key and decoded independently by the projector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a node or model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Start,
    Streaming,
    Complete,
    Error,
}

/// Phase of one superstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Planning,
    Execution,
    Update,
    Complete,
}

/// A model call made on behalf of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelExecutionMetadata {
    pub node_id: String,
    pub model_name: String,
    pub phase: ExecutionPhase,
    pub step_number: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Start, completion or failure of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionMetadata {
    pub node_id: String,
    pub node_type: String,
    pub phase: ExecutionPhase,
    pub step_number: usize,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One superstep of the graph executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PregelStepMetadata {
    pub step_number: usize,
    pub phase: StepPhase,
    pub active_nodes: Vec<String>,
    pub total_nodes: usize,
    pub completed_nodes: usize,
}

/// A write to one state channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdateMetadata {
    pub channel_name: String,
    pub channel_type: String,
    pub value_count: usize,
    pub triggered_nodes: Vec<String>,
    pub step_number: usize,
}

/// Summary of the state merge at the end of a superstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdateMetadata {
    pub updated_keys: Vec<String>,
    pub removed_keys: Vec<String>,
    pub state_size: usize,
    pub step_number: usize,
}
