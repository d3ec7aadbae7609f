//! Model capability.
//!
//! A [`Model`] turns a list of messages into a stream of partial and final
//! [`ModelResponse`]s. The runtime treats it as opaque; concrete clients are
//! produced by a [`ModelResolver`] from an agent's [`ModelConfig`].
//!
//! [`ModelConfig`]: crate::domain::ModelConfig

pub mod fakes;
pub mod openai;
pub mod resolver;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::domain::{Message, ModelError, ModelResponse};
use crate::tools::ToolDeclaration;

pub use resolver::{DefaultModelResolver, ModelResolver, ResolvedModel};

/// Sampling and transport settings for a model call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConfig {
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// One model call.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDeclaration>,
    pub generation: GenerationConfig,
}

/// Ordered partial responses followed by exactly one final response.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelResponse, ModelError>> + Send>>;

#[async_trait]
pub trait Model: Send + Sync {
    /// Model name reported on responses and metadata.
    fn name(&self) -> &str;

    async fn generate(&self, request: ModelRequest) -> Result<ModelStream, ModelError>;
}

impl std::fmt::Debug for dyn Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Model({})", self.name())
    }
}
