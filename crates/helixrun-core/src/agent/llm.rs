//! Single LLM agent: model calls interleaved with tool calls.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{AgentOutput, EventSink, Invocation, RunCounter};
use crate::domain::{
    object, Choice, EventOrigin, ExecutionError, ExecutionEvent, Message, ModelError,
    ModelResponse, ToolCall, ToolError, Usage,
};
use crate::metrics::METRICS;
use crate::model::{GenerationConfig, Model, ModelRequest};
use crate::tools::ToolSet;

/// Upper bound on model calls within one invocation.
pub const MAX_MODEL_CALLS: usize = 32;

#[derive(Debug)]
pub struct LlmAgent {
    name: String,
    description: String,
    instruction: String,
    model: Arc<dyn Model>,
    generation: GenerationConfig,
    tools: ToolSet,
    pub(super) runs: RunCounter,
}

impl LlmAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instruction: impl Into<String>,
        model: Arc<dyn Model>,
        generation: GenerationConfig,
        tools: ToolSet,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instruction: instruction.into(),
            model,
            generation,
            tools,
            runs: RunCounter::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    #[instrument(skip_all, fields(agent = %self.name, invocation = %invocation.origin.invocation_id))]
    pub async fn run(
        &self,
        invocation: &Invocation,
        sink: &EventSink,
    ) -> Result<AgentOutput, ExecutionError> {
        let origin = &invocation.origin;
        let mut messages = Vec::with_capacity(invocation.history.len() + 2);
        if !self.instruction.is_empty() {
            messages.push(Message::system(&self.instruction));
        }
        messages.extend(invocation.history.iter().cloned());
        messages.push(Message::user(&invocation.message));

        let declarations = self.tools.declarations();
        let mut usage = Usage::default();

        for call in 0..MAX_MODEL_CALLS {
            debug!(call, messages = messages.len(), "model call");
            let request = ModelRequest {
                messages: messages.clone(),
                tools: declarations.clone(),
                generation: self.generation.clone(),
            };
            let response =
                stream_model_call(self.model.as_ref(), request, sink, origin, |e| e).await?;
            if let Some(u) = &response.usage {
                usage.add(u);
            }

            let message = response
                .first_choice()
                .map(|c| c.message.clone())
                .unwrap_or_default();
            messages.push(message.clone());

            if !message.has_tool_calls() {
                return Ok(AgentOutput {
                    content: message.content,
                    usage,
                });
            }

            for tool_call in &message.tool_calls {
                let result = self.call_tool(tool_call, sink).await?;
                let tool_message = Message::tool(
                    &tool_call.id,
                    &tool_call.function.name,
                    result.to_string(),
                );
                sink.emit(tool_response_event(origin, &response.model, tool_message.clone()))
                    .await?;
                messages.push(tool_message);
            }
        }

        Err(ExecutionError::ModelCallLimit(MAX_MODEL_CALLS))
    }

    async fn call_tool(&self, call: &ToolCall, sink: &EventSink) -> Result<Value, ExecutionError> {
        let name = call.function.name.as_str();
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ExecutionError::UnknownToolCall(name.to_string()))?;

        let arguments = parse_arguments(&call.function.arguments).map_err(|source| {
            ExecutionError::Tool {
                name: name.to_string(),
                source,
            }
        })?;

        debug!(tool = name, call_id = %call.id, "invoking tool");
        METRICS.inc_tool_calls();
        sink.guard(tool.call(arguments))
            .await?
            .map_err(|source| ExecutionError::Tool {
                name: name.to_string(),
                source,
            })
    }
}

/// Tool arguments arrive as a JSON string; an empty string means `{}`.
fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn tool_response_event(origin: &EventOrigin, model: &str, message: Message) -> ExecutionEvent {
    let response = ModelResponse {
        id: message.tool_call_id.clone().unwrap_or_default(),
        object: object::TOOL_RESPONSE.to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message,
            ..Choice::default()
        }],
        usage: None,
        is_partial: false,
        done: true,
        error: None,
    };
    ExecutionEvent::from_response(origin, response)
}

/// Drive one model call, emitting every partial and the final response.
///
/// `decorate` lets callers attach metadata to each event before it is sent.
/// Returns the final response.
pub(crate) async fn stream_model_call<D>(
    model: &dyn Model,
    request: ModelRequest,
    sink: &EventSink,
    origin: &EventOrigin,
    decorate: D,
) -> Result<ModelResponse, ExecutionError>
where
    D: Fn(ExecutionEvent) -> ExecutionEvent,
{
    let mut stream = sink.guard(model.generate(request)).await??;

    loop {
        let next = sink.guard(stream.next()).await?;
        let Some(item) = next else {
            return Err(ModelError::Stream(
                "model stream ended without a final response".to_string(),
            )
            .into());
        };
        let response = item?;
        if let Some(err) = &response.error {
            return Err(ModelError::Response(err.message.clone()).into());
        }

        let is_final = !response.is_partial;
        let event = decorate(ExecutionEvent::from_response(origin, response.clone()));
        sink.emit(event).await?;
        if is_final {
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments_empty_is_object() {
        assert_eq!(parse_arguments("").unwrap(), serde_json::json!({}));
        assert!(matches!(
            parse_arguments("{not json"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_tool_response_event_shape() {
        let origin = EventOrigin {
            author: "calc-bot".into(),
            ..EventOrigin::default()
        };
        let ev = tool_response_event(&origin, "gpt", Message::tool("c1", "calculator", "{}"));
        assert_eq!(ev.object, object::TOOL_RESPONSE);
        assert!(!ev.is_partial());
        let msg = &ev.response.as_ref().unwrap().choices[0].message;
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
    }
}
