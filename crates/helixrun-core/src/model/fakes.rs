//! In-process model doubles.
//!
//! `ScriptedModel` answers from a closure or a fixed sequence so agents,
//! the engine and the HTTP layer can be exercised without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::resolver::{ModelResolver, ResolvedModel};
use super::{GenerationConfig, Model, ModelRequest, ModelStream};
use crate::domain::{BuildError, Message, ModelConfig, ModelError, ModelResponse, ToolCall, Usage};

/// What a [`ScriptedModel`] does for one call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Final text, streamed word by word when the request streams.
    Text(String),
    /// A final response requesting these tool calls.
    ToolCalls(Vec<ToolCall>),
    /// A stream that fails before producing a final response.
    Fail(String),
    /// Partials forever, one per `delay`.
    Endless(Duration),
}

type Responder = dyn Fn(&ModelRequest, usize) -> ScriptedReply + Send + Sync;

pub struct ScriptedModel {
    name: String,
    responder: Box<Responder>,
    delay: Option<Duration>,
    usage: Usage,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    /// `responder` receives each request and its zero-based call number.
    pub fn new<F>(name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&ModelRequest, usize) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            responder: Box::new(responder),
            delay: None,
            usage: Usage::new(10, 5),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order; the last reply repeats once the script runs out.
    pub fn sequence(name: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        Self::new(name, move |_, call| {
            replies
                .get(call)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_else(|| ScriptedReply::Text(String::new()))
        })
    }

    pub fn replying(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(name, move |_, _| ScriptedReply::Text(text.clone()))
    }

    pub fn endless(name: impl Into<String>, delay: Duration) -> Self {
        Self::new(name, move |_, _| ScriptedReply::Endless(delay))
    }

    /// Sleep before every yielded response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn complete(&self, message: Message) -> ModelResponse {
        ModelResponse::complete(
            format!("{}-resp", self.name),
            self.name.clone(),
            message,
            Some(self.usage),
        )
    }

    fn text_items(&self, text: String, stream: bool) -> Vec<Result<ModelResponse, ModelError>> {
        let mut items = Vec::new();
        if stream {
            for word in text.split_inclusive(' ') {
                items.push(Ok(ModelResponse::partial(
                    format!("{}-resp", self.name),
                    self.name.clone(),
                    Message::assistant(word),
                )));
            }
        }
        items.push(Ok(self.complete(Message::assistant(text))));
        items
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.responder)(&request, call);
        let stream = request.generation.stream;
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        let items = match reply {
            ScriptedReply::Text(text) => self.text_items(text, stream),
            ScriptedReply::ToolCalls(calls) => {
                let mut message = Message::assistant("");
                message.tool_calls = calls;
                vec![Ok(self.complete(message))]
            }
            ScriptedReply::Fail(reason) => vec![Err(ModelError::Response(reason))],
            ScriptedReply::Endless(delay) => {
                let id = format!("{}-resp", self.name);
                let name = self.name.clone();
                let ticks = futures::stream::unfold((), move |()| {
                    let id = id.clone();
                    let name = name.clone();
                    async move {
                        tokio::time::sleep(delay).await;
                        let partial = ModelResponse::partial(id, name, Message::assistant("tick "));
                        Some((Ok::<_, ModelError>(partial), ()))
                    }
                });
                return Ok(Box::pin(ticks));
            }
        };

        match self.delay {
            Some(delay) => Ok(Box::pin(futures::stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            }))),
            None => Ok(Box::pin(futures::stream::iter(items))),
        }
    }
}

/// Resolver that hands every agent the same model.
#[derive(Clone)]
pub struct StaticResolver {
    model: Arc<dyn Model>,
}

impl StaticResolver {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

impl ModelResolver for StaticResolver {
    fn resolve(&self, _config: &ModelConfig, stream: bool) -> Result<ResolvedModel, BuildError> {
        Ok(ResolvedModel {
            model: Arc::clone(&self.model),
            generation: GenerationConfig {
                stream,
                ..GenerationConfig::default()
            },
        })
    }
}
