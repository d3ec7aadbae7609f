//! Error taxonomy for HelixRun.
//!
//! Each stage of a run has its own enum so callers can tell a bad config
//! file apart from a bad graph, a missing credential, or a failing tool.

use std::path::PathBuf;

use helixrun_state::StoreError;

/// Errors raised while loading agent configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("agent config is missing an id")]
    MissingId,

    #[error("duplicate agent ID: {0}")]
    DuplicateId(String),

    #[error("no agent configs found in {0}")]
    Empty(PathBuf),

    #[error("invalid agent config '{id}': {reason}")]
    InvalidSpec { id: String, reason: String },
}

/// Errors raised while turning a graph description into a runnable graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("graph has no nodes")]
    EmptyGraph,

    #[error("duplicate graph node: {0}")]
    DuplicateNode(String),

    #[error("entry point '{0}' is not a node")]
    UnknownEntry(String),

    #[error("finish point '{0}' is not a node")]
    UnknownFinish(String),

    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    UnknownEdgeEndpoint {
        from: String,
        to: String,
        missing: String,
    },

    #[error("unsupported node type '{node_type}' for node '{node}'")]
    UnsupportedNodeType { node: String, node_type: String },
}

/// Errors raised by the model capability.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("model transport error: {0}")]
    Transport(String),

    #[error("failed to decode model response: {0}")]
    Decode(String),

    #[error("model stream error: {0}")]
    Stream(String),

    #[error("model returned an error: {0}")]
    Response(String),
}

/// Errors raised by a tool call.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors raised while constructing an agent from its spec.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("unknown agent ID: {0}")]
    NotFound(String),

    #[error("unsupported model provider: {0}")]
    UnsupportedProvider(String),

    #[error("missing OpenAI API key, env {0} is empty")]
    MissingCredential(String),

    #[error("unsupported tool type: {0}")]
    UnknownTool(String),

    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("tool type already registered: {0}")]
    DuplicateToolType(String),

    #[error("invalid agent spec: {0}")]
    InvalidSpec(String),

    #[error("graph compile failed: {0}")]
    Compile(#[from] CompileError),
}

/// Errors raised while an agent is running.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("tool '{name}' failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },

    #[error("model requested unknown tool: {0}")]
    UnknownToolCall(String),

    #[error("model call limit of {0} reached")]
    ModelCallLimit(usize),

    #[error("graph did not finish within {0} supersteps")]
    SuperstepLimit(usize),

    #[error("graph stopped before reaching finish node '{0}'")]
    FinishNotReached(String),

    #[error("invalid graph state: {0}")]
    State(String),

    #[error("session error: {0}")]
    Session(#[from] StoreError),

    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Short machine-readable tag used as the error `type` on events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Model(_) => "model_error",
            Self::Tool { .. } | Self::UnknownToolCall(_) => "tool_error",
            Self::ModelCallLimit(_) | Self::SuperstepLimit(_) => "limit_exceeded",
            Self::FinishNotReached(_) | Self::State(_) => "graph_error",
            Self::Session(_) => "session_error",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Top-level HelixRun error.
#[derive(Debug, thiserror::Error)]
pub enum HelixError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("session error: {0}")]
    Session(#[from] StoreError),
}

/// Result type for HelixRun operations.
pub type Result<T> = std::result::Result<T, HelixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_display() {
        let err = BuildError::NotFound("ghost".to_string());
        assert_eq!(err.to_string(), "unknown agent ID: ghost");

        let err = BuildError::MissingCredential("OPENAI_API_KEY".to_string());
        assert!(err.to_string().contains("env OPENAI_API_KEY is empty"));

        let err = BuildError::from(CompileError::EmptyGraph);
        assert!(err.to_string().contains("graph has no nodes"));
    }

    #[test]
    fn test_tool_error_display_includes_name() {
        let err = ExecutionError::Tool {
            name: "calculator".to_string(),
            source: ToolError::Failed("unsupported operation: divide".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("calculator"));
        assert!(text.contains("unsupported operation: divide"));
        assert_eq!(err.kind(), "tool_error");
    }

    #[test]
    fn test_helix_error_wraps_stages() {
        let err: HelixError = BuildError::UnknownTool("search".to_string()).into();
        assert!(err.to_string().starts_with("build error"));

        let err: HelixError = ExecutionError::Cancelled.into();
        assert!(err.to_string().contains("run cancelled"));
    }
}
