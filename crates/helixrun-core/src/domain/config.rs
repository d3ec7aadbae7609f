//! Declarative agent configuration.
//!
//! [`AgentConfig`] mirrors the JSON file format one-to-one. It is converted
//! into an [`AgentSpec`] whose variant payload is guaranteed to match the
//! declared type, so downstream builders never see a `graph` agent without
//! a graph or a chain with zero steps.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Model selection and credentials for an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Literal key when it starts with `sk-`, otherwise an env var name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// A tool attached to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub tool_type: String,
}

impl ToolSpec {
    /// Name exposed to the model; falls back to the tool type.
    pub fn effective_name(&self) -> &str {
        if self.name.is_empty() {
            &self.tool_type
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubAgentSpec {
    pub id: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiConfig {
    pub mode: String,
    #[serde(default)]
    pub agents: Vec<SubAgentSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
}

/// Graph topology as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub finish: String,
}

/// Raw agent config file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instruction: String,
    #[serde(default)]
    pub stream: bool,
    pub model: ModelConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi: Option<MultiConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphSpec>,
}

/// Agent variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Single,
    Chain,
    Graph,
}

impl AgentKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "multi_chain" | "chain" => Some(Self::Chain),
            "graph" => Some(Self::Graph),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Chain => "multi_chain",
            Self::Graph => "graph",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered sub-agent steps of a chain agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    pub steps: Vec<SubAgentSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentVariant {
    Single,
    Chain(ChainSpec),
    Graph(GraphSpec),
}

/// Validated agent specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub id: String,
    pub description: String,
    pub instruction: String,
    pub stream: bool,
    pub model: ModelConfig,
    pub tools: Vec<ToolSpec>,
    pub variant: AgentVariant,
}

impl AgentSpec {
    pub fn kind(&self) -> AgentKind {
        match self.variant {
            AgentVariant::Single => AgentKind::Single,
            AgentVariant::Chain(_) => AgentKind::Chain,
            AgentVariant::Graph(_) => AgentKind::Graph,
        }
    }
}

impl TryFrom<AgentConfig> for AgentSpec {
    type Error = ConfigError;

    fn try_from(cfg: AgentConfig) -> Result<Self, Self::Error> {
        if cfg.id.trim().is_empty() {
            return Err(ConfigError::MissingId);
        }
        let invalid = |reason: &str| ConfigError::InvalidSpec {
            id: cfg.id.clone(),
            reason: reason.to_string(),
        };

        let kind = AgentKind::parse(&cfg.agent_type)
            .ok_or_else(|| invalid(&format!("unsupported agent type: {}", cfg.agent_type)))?;

        let variant = match kind {
            AgentKind::Single => {
                if cfg.multi.is_some() || cfg.graph.is_some() {
                    return Err(invalid("single agent must not define multi or graph"));
                }
                AgentVariant::Single
            }
            AgentKind::Chain => {
                if cfg.graph.is_some() {
                    return Err(invalid("chain agent must not define graph"));
                }
                let multi = cfg
                    .multi
                    .as_ref()
                    .ok_or_else(|| invalid("multi-agent config must have mode=chain"))?;
                if !multi.mode.eq_ignore_ascii_case("chain") {
                    return Err(invalid("multi-agent config must have mode=chain"));
                }
                if multi.agents.is_empty() {
                    return Err(invalid("multi-agent chain must define at least one sub-agent"));
                }
                AgentVariant::Chain(ChainSpec {
                    steps: multi.agents.clone(),
                })
            }
            AgentKind::Graph => {
                if cfg.multi.is_some() {
                    return Err(invalid("graph agent must not define multi"));
                }
                let graph = cfg
                    .graph
                    .clone()
                    .ok_or_else(|| invalid("graph config is required for type=graph"))?;
                AgentVariant::Graph(graph)
            }
        };

        Ok(Self {
            id: cfg.id,
            description: cfg.description,
            instruction: cfg.instruction,
            stream: cfg.stream,
            model: cfg.model,
            tools: cfg.tools,
            variant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<AgentSpec, ConfigError> {
        let cfg: AgentConfig = serde_json::from_value(value).unwrap();
        AgentSpec::try_from(cfg)
    }

    #[test]
    fn test_single_agent_parses() {
        let spec = parse(json!({
            "id": "calc-bot",
            "type": "single",
            "stream": true,
            "model": {"provider": "openai", "model": "gpt-4o-mini"},
            "tools": [{"type": "calculator"}]
        }))
        .unwrap();

        assert_eq!(spec.kind(), AgentKind::Single);
        assert!(spec.stream);
        assert_eq!(spec.tools[0].effective_name(), "calculator");
    }

    #[test]
    fn test_chain_requires_chain_mode() {
        let err = parse(json!({
            "id": "c",
            "type": "multi_chain",
            "model": {"provider": "openai", "model": "m"},
            "multi": {"mode": "parallel", "agents": [{"id": "a", "instruction": "x"}]}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("mode=chain"));
    }

    #[test]
    fn test_chain_mode_is_case_insensitive() {
        let spec = parse(json!({
            "id": "c",
            "type": "multi_chain",
            "model": {"provider": "openai", "model": "m"},
            "multi": {"mode": "Chain", "agents": [{"id": "a", "instruction": "x"}]}
        }))
        .unwrap();
        assert!(matches!(spec.variant, AgentVariant::Chain(ref c) if c.steps.len() == 1));
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = parse(json!({
            "id": "c",
            "type": "multi_chain",
            "model": {"provider": "openai", "model": "m"},
            "multi": {"mode": "chain", "agents": []}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("at least one sub-agent"));
    }

    #[test]
    fn test_graph_requires_payload() {
        let err = parse(json!({
            "id": "g",
            "type": "graph",
            "model": {"provider": "openai", "model": "m"}
        }))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSpec { .. }));
    }

    #[test]
    fn test_mismatched_payload_rejected() {
        let err = parse(json!({
            "id": "s",
            "type": "single",
            "model": {"provider": "openai", "model": "m"},
            "graph": {"nodes": [], "edges": [], "entry": "a", "finish": "a"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("must not define"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = parse(json!({
            "id": "x",
            "type": "swarm",
            "model": {"provider": "openai", "model": "m"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unsupported agent type: swarm"));
    }
}
