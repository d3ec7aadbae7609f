//! Spec to agent construction.

use std::sync::Arc;

use super::{Agent, ChainAgent, GraphAgent, LlmAgent};
use crate::domain::{AgentSpec, AgentVariant, BuildError};
use crate::graph::{GraphExecutor, StateGraph};
use crate::model::{DefaultModelResolver, ModelResolver};
use crate::tools::ToolCatalog;

/// Builds fresh [`Agent`]s. Nothing is cached between builds.
#[derive(Clone)]
pub struct AgentBuilder {
    resolver: Arc<dyn ModelResolver>,
    catalog: ToolCatalog,
}

impl AgentBuilder {
    pub fn new(resolver: Arc<dyn ModelResolver>, catalog: ToolCatalog) -> Self {
        Self { resolver, catalog }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn build(&self, spec: &AgentSpec) -> Result<Agent, BuildError> {
        let resolved = self.resolver.resolve(&spec.model, spec.stream)?;
        let tools = self.catalog.build(&spec.tools)?;

        let agent = match &spec.variant {
            AgentVariant::Single => Agent::Single(LlmAgent::new(
                &spec.id,
                &spec.description,
                &spec.instruction,
                resolved.model,
                resolved.generation,
                tools,
            )),
            AgentVariant::Chain(chain) => {
                if chain.steps.is_empty() {
                    return Err(BuildError::InvalidSpec(format!(
                        "chain '{}' has no sub-agents",
                        spec.id
                    )));
                }
                let steps = chain
                    .steps
                    .iter()
                    .map(|step| {
                        LlmAgent::new(
                            &step.id,
                            &step.description,
                            &step.instruction,
                            Arc::clone(&resolved.model),
                            resolved.generation.clone(),
                            tools.clone(),
                        )
                    })
                    .collect();
                Agent::Chain(ChainAgent::new(&spec.id, &spec.description, steps))
            }
            AgentVariant::Graph(graph) => {
                let compiled = StateGraph::from_spec(graph)?.compile()?;
                let executor = GraphExecutor::new(compiled, resolved.model, resolved.generation);
                Agent::Graph(GraphAgent::new(&spec.id, &spec.description, executor))
            }
        };

        Ok(agent)
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new(Arc::new(DefaultModelResolver::new()), ToolCatalog::builtin())
    }
}

impl std::fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}
