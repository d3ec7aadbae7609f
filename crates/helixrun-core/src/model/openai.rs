//! OpenAI-compatible Chat Completions client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Model, ModelRequest, ModelStream};
use crate::domain::{
    FunctionCall, Message, ModelError, ModelResponse, Role, ToolCall, Usage,
};
use crate::tools::ToolDeclaration;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self::with_http(config, reqwest::Client::new())
    }

    pub fn with_http(config: OpenAiConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        )
    }
}

#[async_trait]
impl Model for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelStream, ModelError> {
        let stream = request.generation.stream;
        let body = ChatRequest::new(&self.config.model, &request);

        debug!(model = %self.config.model, stream, messages = request.messages.len(), "calling chat completions");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat completions request failed");
            return Err(ModelError::Http {
                status: status.as_u16(),
                body,
            });
        }

        if !stream {
            let completion: ChatCompletion = response
                .json()
                .await
                .map_err(|e| ModelError::Decode(e.to_string()))?;
            let final_response = completion.into_response(&self.config.model);
            return Ok(Box::pin(futures::stream::once(async move {
                Ok::<_, ModelError>(final_response)
            })));
        }

        let events = Box::pin(response.bytes_stream().eventsource());
        let accumulator = ChunkAccumulator::new(&self.config.model);

        let stream = futures::stream::unfold(Some((events, accumulator)), |state| async move {
            let (mut events, mut acc) = state?;
            loop {
                match events.next().await {
                    Some(Ok(event)) => {
                        if event.data.trim() == DONE_SENTINEL {
                            return Some((Ok(acc.finish()), None));
                        }
                        match acc.push(&event.data) {
                            Ok(Some(partial)) => return Some((Ok(partial), Some((events, acc)))),
                            Ok(None) => continue,
                            Err(e) => return Some((Err(e), None)),
                        }
                    }
                    Some(Err(e)) => return Some((Err(ModelError::Stream(e.to_string())), None)),
                    None => return Some((Ok(acc.finish()), None)),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Rebuilds the final message from streamed chunks. Tool call fragments are
/// merged by their `index`.
struct ChunkAccumulator {
    id: String,
    model: String,
    content: String,
    tool_calls: BTreeMap<usize, ToolCall>,
    usage: Option<Usage>,
}

impl ChunkAccumulator {
    fn new(model: &str) -> Self {
        Self {
            id: String::new(),
            model: model.to_string(),
            content: String::new(),
            tool_calls: BTreeMap::new(),
            usage: None,
        }
    }

    fn push(&mut self, data: &str) -> Result<Option<ModelResponse>, ModelError> {
        let chunk: ChatChunk =
            serde_json::from_str(data).map_err(|e| ModelError::Decode(e.to_string()))?;

        if let Some(err) = chunk.error {
            return Err(ModelError::Response(err.message));
        }
        if self.id.is_empty() {
            self.id = chunk.id.clone();
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(None);
        };

        let mut delta = Message::assistant("");
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            self.content.push_str(&text);
            delta.content = text;
        }
        for fragment in choice.delta.tool_calls {
            let entry = self
                .tool_calls
                .entry(fragment.index)
                .or_insert_with(|| ToolCall {
                    index: Some(fragment.index),
                    ..ToolCall::default()
                });
            if let Some(id) = fragment.id.as_ref().filter(|id| !id.is_empty()) {
                entry.id = id.clone();
            }
            if let Some(kind) = fragment.kind.as_ref() {
                entry.kind = kind.clone();
            }
            if let Some(function) = fragment.function.as_ref() {
                if let Some(name) = function.name.as_ref() {
                    entry.function.name.push_str(name);
                }
                if let Some(args) = function.arguments.as_ref() {
                    entry.function.arguments.push_str(args);
                }
            }
            delta.tool_calls.push(ToolCall {
                kind: fragment.kind.unwrap_or_else(|| "function".to_string()),
                id: fragment.id.unwrap_or_default(),
                index: Some(fragment.index),
                function: FunctionCall {
                    name: fragment
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default(),
                    arguments: fragment
                        .function
                        .and_then(|f| f.arguments)
                        .unwrap_or_default(),
                },
            });
        }

        if delta.is_empty() {
            return Ok(None);
        }
        Ok(Some(ModelResponse::partial(&self.id, &self.model, delta)))
    }

    fn finish(self) -> ModelResponse {
        let mut message = Message::assistant(self.content);
        message.tool_calls = self
            .tool_calls
            .into_values()
            .map(|mut call| {
                if call.kind.is_empty() {
                    call.kind = "function".to_string();
                }
                call
            })
            .collect();
        ModelResponse::complete(self.id, self.model, message, self.usage)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl ChatRequest {
    fn new(model: &str, request: &ModelRequest) -> Self {
        let stream = request.generation.stream;
        Self {
            model: model.to_string(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            stream,
            tools: request.tools.iter().map(WireTool::from).collect(),
            max_tokens: request.generation.max_tokens,
            temperature: request.generation.temperature,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: (!msg.content.is_empty() || msg.tool_calls.is_empty())
                .then(|| msg.content.clone()),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function",
                    function: call.function.clone(),
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionCall,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDeclaration> for WireTool {
    fn from(decl: &ToolDeclaration) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: decl.name.clone(),
                description: decl.description.clone(),
                parameters: decl.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        let mut usage = Usage::new(u.prompt_tokens, u.completion_tokens);
        if u.total_tokens > usage.total_tokens {
            usage.total_tokens = u.total_tokens;
        }
        usage
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallFragment>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

impl ChatCompletion {
    fn into_response(self, fallback_model: &str) -> ModelResponse {
        let model = if self.model.is_empty() {
            fallback_model.to_string()
        } else {
            self.model
        };
        let mut message = Message::assistant("");
        if let Some(choice) = self.choices.into_iter().next() {
            message.content = choice.message.content.unwrap_or_default();
            message.tool_calls = choice.message.tool_calls;
        }
        ModelResponse::complete(self.id, model, message, self.usage.map(Usage::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GenerationConfig;

    #[test]
    fn test_accumulator_merges_tool_call_fragments() {
        let mut acc = ChunkAccumulator::new("gpt");
        acc.push(r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"calculator","arguments":"{\"op"}}]}}]}"#)
            .unwrap();
        acc.push(r#"{"id":"c1","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"eration\":\"add\"}"}}]}}]}"#)
            .unwrap();
        acc.push(r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3,"total_tokens":10}}"#)
            .unwrap();

        let done = acc.finish();
        let message = &done.first_choice().unwrap().message;
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "call_1");
        assert_eq!(message.tool_calls[0].function.arguments, r#"{"operation":"add"}"#);
        assert_eq!(done.usage, Some(Usage::new(7, 3)));
        assert_eq!(
            done.first_choice().unwrap().finish_reason.as_deref(),
            Some("tool_calls")
        );
    }

    #[test]
    fn test_accumulator_saturates_oversized_usage() {
        let mut acc = ChunkAccumulator::new("gpt");
        acc.push(r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":4294967295,"completion_tokens":1}}"#)
            .unwrap();

        let usage = acc.finish().usage.unwrap();
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 1);
        assert_eq!(usage.total_tokens, u32::MAX);
    }

    #[test]
    fn test_accumulator_emits_content_partials() {
        let mut acc = ChunkAccumulator::new("gpt");
        let partial = acc
            .push(r#"{"id":"c1","choices":[{"delta":{"content":"Hel"}}]}"#)
            .unwrap()
            .unwrap();
        assert!(partial.is_partial);
        assert_eq!(partial.first_choice().unwrap().delta.content, "Hel");

        acc.push(r#"{"id":"c1","choices":[{"delta":{"content":"lo"}}]}"#)
            .unwrap();
        assert_eq!(acc.finish().first_choice().unwrap().message.content, "Hello");
    }

    #[test]
    fn test_accumulator_surfaces_inline_error() {
        let mut acc = ChunkAccumulator::new("gpt");
        let err = acc.push(r#"{"error":{"message":"rate limited"}}"#).unwrap_err();
        assert!(matches!(err, ModelError::Response(m) if m == "rate limited"));
    }

    #[test]
    fn test_request_sets_usage_option_when_streaming() {
        let request = ModelRequest {
            messages: vec![Message::user("hi")],
            tools: vec![],
            generation: GenerationConfig {
                stream: true,
                ..GenerationConfig::default()
            },
        };
        let body = serde_json::to_value(ChatRequest::new("gpt", &request)).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("tools").is_none());
    }
}
