//! Shared graph state and merge rules.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::{ExecutionError, Message};

pub const KEY_MESSAGES: &str = "messages";
pub const KEY_USER_INPUT: &str = "user_input";
pub const KEY_LAST_RESPONSE: &str = "last_response";
pub const KEY_NODE_RESPONSES: &str = "node_responses";

/// Channel kind reported in channel update metadata.
pub fn channel_type(key: &str) -> &'static str {
    match key {
        KEY_MESSAGES => "append",
        KEY_NODE_RESPONSES => "merge",
        _ => "last_value",
    }
}

/// Accumulated graph state.
///
/// `messages` is an append channel, `node_responses` merges per node id and
/// every other key is overwritten by the latest write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    values: BTreeMap<String, Value>,
}

/// Incremental output of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    values: BTreeMap<String, Value>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn messages(&self) -> Result<Vec<Message>, ExecutionError> {
        match self.values.get(KEY_MESSAGES) {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ExecutionError::State(format!("messages channel: {e}"))),
        }
    }

    pub fn last_response(&self) -> Option<&str> {
        self.values.get(KEY_LAST_RESPONSE).and_then(Value::as_str)
    }

    /// Number of values held by a channel, used for update metadata.
    pub fn value_count(&self, key: &str) -> usize {
        match self.values.get(key) {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(map)) => map.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        }
    }

    /// Merge a delta and return the keys it touched, sorted.
    pub fn apply(&mut self, delta: StateDelta) -> Vec<String> {
        let mut updated = Vec::with_capacity(delta.values.len());
        for (key, value) in delta.values {
            match key.as_str() {
                KEY_MESSAGES => {
                    let incoming = match value {
                        Value::Array(items) => items,
                        other => vec![other],
                    };
                    let slot = self
                        .values
                        .entry(key.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    match slot {
                        Value::Array(existing) => existing.extend(incoming),
                        other => *other = Value::Array(incoming),
                    }
                }
                KEY_NODE_RESPONSES => {
                    let slot = self
                        .values
                        .entry(key.clone())
                        .or_insert_with(|| Value::Object(Default::default()));
                    match (slot, value) {
                        (Value::Object(existing), Value::Object(incoming)) => {
                            existing.extend(incoming)
                        }
                        (slot, value) => *slot = value,
                    }
                }
                _ => {
                    self.values.insert(key.clone(), value);
                }
            }
            updated.push(key);
        }
        updated
    }
}
