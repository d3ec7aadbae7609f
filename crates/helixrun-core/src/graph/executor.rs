//! Superstep executor for compiled graphs.
//!
//! Each superstep runs every active node against the same state snapshot,
//! merges their deltas, then activates the successors of the nodes that
//! ran. Execution ends once the active set is empty; the finish node must
//! have run by then.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, instrument};

use super::compiler::{CompiledGraph, NodeKind};
use super::state::{
    channel_type, GraphState, StateDelta, KEY_LAST_RESPONSE, KEY_MESSAGES, KEY_NODE_RESPONSES,
    KEY_USER_INPUT,
};
use crate::agent::llm::stream_model_call;
use crate::agent::{EventSink, Invocation};
use crate::domain::event::{
    METADATA_KEY_CHANNEL, METADATA_KEY_MODEL, METADATA_KEY_NODE, METADATA_KEY_PREGEL,
    METADATA_KEY_STATE,
};
use crate::domain::{
    object, ChannelUpdateMetadata, EventOrigin, ExecutionError, ExecutionEvent, ExecutionPhase,
    Message, ModelExecutionMetadata, NodeExecutionMetadata, PregelStepMetadata,
    StateUpdateMetadata, StepPhase, Usage,
};
use crate::model::{GenerationConfig, Model, ModelRequest};

/// Default bound on supersteps per run.
pub const MAX_SUPERSTEPS: usize = 100;

/// Terminal graph state plus the usage accumulated by its model calls.
#[derive(Debug, Clone)]
pub struct GraphOutcome {
    pub state: GraphState,
    pub usage: Usage,
    pub supersteps: usize,
}

#[derive(Debug)]
pub struct GraphExecutor {
    graph: CompiledGraph,
    model: Arc<dyn Model>,
    generation: GenerationConfig,
    max_supersteps: usize,
}

impl GraphExecutor {
    pub fn new(graph: CompiledGraph, model: Arc<dyn Model>, generation: GenerationConfig) -> Self {
        Self {
            graph,
            model,
            generation,
            max_supersteps: MAX_SUPERSTEPS,
        }
    }

    pub fn with_max_supersteps(mut self, max_supersteps: usize) -> Self {
        self.max_supersteps = max_supersteps;
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    #[instrument(skip_all, fields(graph_nodes = self.graph.len()))]
    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: &EventSink,
    ) -> Result<GraphOutcome, ExecutionError> {
        let origin = &invocation.origin;
        let mut state = GraphState::new();

        let mut initial = invocation.history.clone();
        initial.push(Message::user(&invocation.message));
        state.apply(
            StateDelta::new()
                .set(KEY_MESSAGES, json!(initial))
                .set(KEY_USER_INPUT, json!(invocation.message)),
        );

        let finish = self.graph.finish();
        let mut active = vec![self.graph.entry()];
        let mut finished = false;
        let mut completed = 0usize;
        let mut usage = Usage::default();
        let mut step = 0usize;

        while !active.is_empty() {
            if step >= self.max_supersteps {
                return Err(ExecutionError::SuperstepLimit(self.max_supersteps));
            }
            debug!(step, active = active.len(), "superstep");

            sink.emit(self.pregel_event(origin, step, StepPhase::Planning, &active, completed))
                .await?;

            let mut deltas = Vec::with_capacity(active.len());
            for &index in &active {
                let (delta, node_usage) = self.run_node(index, &state, step, origin, sink).await?;
                usage.add(&node_usage);
                deltas.push(delta);
                completed += 1;
                finished |= index == finish;
            }

            let mut updated = BTreeSet::new();
            for delta in deltas {
                updated.extend(state.apply(delta));
            }

            let next = self.next_active(&active);
            let triggered: Vec<String> = next
                .iter()
                .map(|&i| self.graph.node(i).id.clone())
                .collect();

            for key in &updated {
                let meta = ChannelUpdateMetadata {
                    channel_name: key.clone(),
                    channel_type: channel_type(key).to_string(),
                    value_count: state.value_count(key),
                    triggered_nodes: triggered.clone(),
                    step_number: step,
                };
                sink.emit(
                    ExecutionEvent::new(origin, object::GRAPH_CHANNEL_UPDATE)
                        .with_metadata(METADATA_KEY_CHANNEL, &meta),
                )
                .await?;
            }
            if !updated.is_empty() {
                let meta = StateUpdateMetadata {
                    updated_keys: updated.into_iter().collect(),
                    removed_keys: Vec::new(),
                    state_size: state.len(),
                    step_number: step,
                };
                sink.emit(
                    ExecutionEvent::new(origin, object::GRAPH_STATE_UPDATE)
                        .with_metadata(METADATA_KEY_STATE, &meta),
                )
                .await?;
            }

            active = next;
            step += 1;
        }

        if !finished {
            return Err(ExecutionError::FinishNotReached(
                self.graph.node(finish).id.clone(),
            ));
        }

        let mut done = self.pregel_event(origin, step, StepPhase::Complete, &[], completed);
        done.object = object::GRAPH_EXECUTION.to_string();
        done.done = true;
        sink.emit(done).await?;

        Ok(GraphOutcome {
            state,
            usage,
            supersteps: step,
        })
    }

    /// Successors of the nodes that just ran, deduplicated in first-seen order.
    fn next_active(&self, ran: &[usize]) -> Vec<usize> {
        let mut seen = vec![false; self.graph.len()];
        let mut next = Vec::new();
        for &index in ran {
            for &succ in self.graph.successors(index) {
                if !seen[succ] {
                    seen[succ] = true;
                    next.push(succ);
                }
            }
        }
        next
    }

    fn pregel_event(
        &self,
        origin: &EventOrigin,
        step: usize,
        phase: StepPhase,
        active: &[usize],
        completed: usize,
    ) -> ExecutionEvent {
        let meta = PregelStepMetadata {
            step_number: step,
            phase,
            active_nodes: active
                .iter()
                .map(|&i| self.graph.node(i).id.clone())
                .collect(),
            total_nodes: self.graph.len(),
            completed_nodes: completed,
        };
        ExecutionEvent::new(origin, object::GRAPH_PREGEL_STEP).with_metadata(METADATA_KEY_PREGEL, &meta)
    }

    async fn run_node(
        &self,
        index: usize,
        state: &GraphState,
        step: usize,
        origin: &EventOrigin,
        sink: &EventSink,
    ) -> Result<(StateDelta, Usage), ExecutionError> {
        let node = self.graph.node(index);
        let start_time = Utc::now();
        let started = Instant::now();
        let mut meta = NodeExecutionMetadata {
            node_id: node.id.clone(),
            node_type: node.kind.type_name().to_string(),
            phase: ExecutionPhase::Start,
            step_number: step,
            start_time,
            end_time: None,
            duration_ms: None,
            error: None,
        };
        sink.emit(
            ExecutionEvent::new(origin, object::GRAPH_NODE_START).with_metadata(METADATA_KEY_NODE, &meta),
        )
        .await?;

        let result = match &node.kind {
            NodeKind::Entry => Ok((StateDelta::new(), Usage::default())),
            NodeKind::Llm { instruction } => {
                self.run_llm_node(&node.id, instruction, state, step, origin, sink)
                    .await
            }
        };

        meta.end_time = Some(Utc::now());
        meta.duration_ms = Some(started.elapsed().as_millis() as u64);
        match result {
            Ok(out) => {
                meta.phase = ExecutionPhase::Complete;
                sink.emit(
                    ExecutionEvent::new(origin, object::GRAPH_NODE_COMPLETE)
                        .with_metadata(METADATA_KEY_NODE, &meta),
                )
                .await?;
                Ok(out)
            }
            Err(ExecutionError::Cancelled) => Err(ExecutionError::Cancelled),
            Err(err) => {
                meta.phase = ExecutionPhase::Error;
                meta.error = Some(err.to_string());
                sink.emit(
                    ExecutionEvent::new(origin, object::GRAPH_NODE_ERROR)
                        .with_metadata(METADATA_KEY_NODE, &meta),
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn run_llm_node(
        &self,
        node_id: &str,
        instruction: &str,
        state: &GraphState,
        step: usize,
        origin: &EventOrigin,
        sink: &EventSink,
    ) -> Result<(StateDelta, Usage), ExecutionError> {
        let mut messages = Vec::new();
        if !instruction.is_empty() {
            messages.push(Message::system(instruction));
        }
        messages.extend(state.messages()?);

        let request = ModelRequest {
            messages,
            tools: Vec::new(),
            generation: self.generation.clone(),
        };

        let started = Instant::now();
        let model_name = self.model.name().to_string();
        let decorate = |event: ExecutionEvent| {
            let partial = event.is_partial();
            let meta = ModelExecutionMetadata {
                node_id: node_id.to_string(),
                model_name: model_name.clone(),
                phase: if partial {
                    ExecutionPhase::Streaming
                } else {
                    ExecutionPhase::Complete
                },
                step_number: step,
                output: if partial {
                    None
                } else {
                    event
                        .response
                        .as_ref()
                        .and_then(|r| r.first_choice())
                        .map(|c| c.message.content.clone())
                },
                duration_ms: (!partial).then(|| started.elapsed().as_millis() as u64),
            };
            event.with_metadata(METADATA_KEY_MODEL, &meta)
        };

        let response =
            stream_model_call(self.model.as_ref(), request, sink, origin, decorate).await?;
        let content = response
            .first_choice()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        let usage = response.usage.unwrap_or_default();

        let delta = StateDelta::new()
            .set(KEY_MESSAGES, json!([Message::assistant(content.clone())]))
            .set(KEY_LAST_RESPONSE, json!(content))
            .set(KEY_NODE_RESPONSES, json!({ node_id: content }));
        Ok((delta, usage))
    }
}
