//! Domain models for HelixRun.
//!
//! - `AgentSpec`: validated declarative agent description
//! - `Message`: conversation message exchanged with the model
//! - `ExecutionEvent`: one internal occurrence during a run
//! - metadata payloads attached to graph events

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod metadata;

pub use config::{
    AgentConfig, AgentKind, AgentSpec, AgentVariant, ChainSpec, EdgeSpec, GraphSpec,
    ModelConfig, MultiConfig, NodeSpec, SubAgentSpec, ToolSpec,
};
pub use error::{
    BuildError, CompileError, ConfigError, ExecutionError, HelixError, ModelError, Result,
    ToolError,
};
pub use event::{
    object, Choice, EventOrigin, ExecutionEvent, ModelResponse, ResponseError, Usage,
};
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use metadata::{
    ChannelUpdateMetadata, ExecutionPhase, ModelExecutionMetadata, NodeExecutionMetadata,
    PregelStepMetadata, StateUpdateMetadata, StepPhase,
};
