//! Sequential pipeline of LLM sub-agents.

use tracing::{info, instrument};

use super::{AgentOutput, EventSink, Invocation, LlmAgent, RunCounter};
use crate::domain::{ExecutionError, Usage};

/// Runs sub-agents in order; each step's output is the next step's input.
#[derive(Debug)]
pub struct ChainAgent {
    name: String,
    description: String,
    steps: Vec<LlmAgent>,
    pub(super) runs: RunCounter,
}

impl ChainAgent {
    pub fn new(name: impl Into<String>, description: impl Into<String>, steps: Vec<LlmAgent>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
            runs: RunCounter::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn steps(&self) -> &[LlmAgent] {
        &self.steps
    }

    /// Any failing step aborts the chain.
    #[instrument(skip_all, fields(agent = %self.name, steps = self.steps.len()))]
    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: &EventSink,
    ) -> Result<AgentOutput, ExecutionError> {
        let mut input = invocation.message.clone();
        let mut usage = Usage::default();

        for (position, step) in self.steps.iter().enumerate() {
            info!(position, step = step.name(), "chain step");
            let child = invocation.child(step.name(), input);
            let output = step.run(&child, sink).await?;
            usage.add(&output.usage);
            input = output.content;
        }

        Ok(AgentOutput {
            content: input,
            usage,
        })
    }
}
