//! Agent backed by a compiled graph.

use tracing::{info, instrument};

use super::{AgentOutput, EventSink, Invocation, RunCounter};
use crate::domain::ExecutionError;
use crate::graph::GraphExecutor;

#[derive(Debug)]
pub struct GraphAgent {
    name: String,
    description: String,
    executor: GraphExecutor,
    pub(super) runs: RunCounter,
}

impl GraphAgent {
    pub fn new(name: impl Into<String>, description: impl Into<String>, executor: GraphExecutor) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            executor,
            runs: RunCounter::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    /// Output is the last model response written to graph state.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: &EventSink,
    ) -> Result<AgentOutput, ExecutionError> {
        let outcome = self.executor.run(invocation, sink).await?;
        info!(supersteps = outcome.supersteps, "graph finished");
        Ok(AgentOutput {
            content: outcome.state.last_response().unwrap_or_default().to_string(),
            usage: outcome.usage,
        })
    }
}
