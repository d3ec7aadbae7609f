//! HelixRun Core Library
//!
//! Declarative agents, a superstep graph executor and the event pipeline
//! that turns agent runs into an ordered stream of canonical events.
//!
//! ## Layers
//!
//! - `domain`: specs, messages, execution events and errors
//! - `model` / `tools`: capabilities agents call into
//! - `graph`: graph compilation and execution
//! - `agent`: agent variants, builder and registry
//! - `runner`: the execution engine producing event streams
//! - `projection`: execution event to wire event mapping

pub mod agent;
pub mod domain;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod projection;
pub mod runner;
pub mod telemetry;
pub mod tools;

pub use domain::{
    AgentConfig, AgentKind, AgentSpec, AgentVariant, BuildError, CompileError, ConfigError,
    EventOrigin, ExecutionError, ExecutionEvent, HelixError, Message, ModelConfig, ModelError,
    ModelResponse, Result, Role, ToolCall, ToolError, ToolSpec, Usage,
};

pub use agent::{
    Agent, AgentBuilder, AgentOutput, AgentRegistry, ChainAgent, EventSink, GraphAgent,
    Invocation, LlmAgent,
};

pub use graph::{CompiledGraph, GraphExecutor, GraphState, StateGraph};

pub use model::fakes::{ScriptedModel, ScriptedReply, StaticResolver};
pub use model::{
    DefaultModelResolver, GenerationConfig, Model, ModelRequest, ModelResolver, ModelStream,
    ResolvedModel,
};

pub use projection::{project, project_stream, CanonicalEvent, EventProjector, WireEnvelope};

pub use runner::{EventStream, ExecutionEngine, RunRequest, ANONYMOUS_USER};

pub use tools::{Calculator, Tool, ToolCatalog, ToolDeclaration, ToolSet};

pub use helixrun_state::{InMemorySessionStore, SessionKey, SessionStore};

pub use telemetry::{init_tracing, LOG_ENV};
