//! Graph agents: compilation and superstep execution.

pub mod compiler;
pub mod executor;
pub mod state;

pub use compiler::{CompiledGraph, CompiledNode, NodeKind, StateGraph};
pub use executor::{GraphExecutor, GraphOutcome, MAX_SUPERSTEPS};
pub use state::{GraphState, StateDelta};
