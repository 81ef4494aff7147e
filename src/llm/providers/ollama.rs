//! Ollama's local `/api/chat` endpoint.
//!
//! Unlike every other provider in this crate, Ollama needs no API key by default and streams
//! newline-delimited JSON rather than SSE — each line is a complete, self-describing chunk of the
//! same response shape the non-streaming call returns, terminated by a line with `"done": true`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{
    Capability, ChatCapability, ChatStreamPartsCapability, Embedding, EmbeddingCapability, ProviderCapabilities,
};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::{provider_option, ChatContentPart, ModelMessage, Role, ToolResultPayload};
use crate::llm::stream::{ChatResponse, FinishReason, PartStream, StreamPart, Usage};
use crate::llm::tool::{Tool, ToolCall};
use crate::llm::tool_name_mapping::ToolNameMapper;
use crate::llm::transport::HttpTransport;

use super::common::{build_tool_mapper, jsonl_to_part_stream, provider_metadata, resolve_tool_name};

const CAPABILITIES: &[Capability] = &[
    Capability::Chat,
    Capability::ChatStream,
    Capability::ModelListing,
    Capability::Embedding,
];
const PROVIDER_ID: &str = "ollama";
const ALIAS: &str = "ollama.chat";

/// Client for a local (or remote) Ollama server.
pub struct OllamaProvider {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl OllamaProvider {
    /// Construct a provider talking to `base_url` (e.g. `"http://localhost:11434"`) through
    /// `transport`.
    pub fn new(transport: impl HttpTransport + 'static, base_url: String) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
        }
    }

    fn chat_endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    fn tags_endpoint(&self) -> String {
        format!("{}/api/tags", self.base_url.trim_end_matches('/'))
    }

    fn embeddings_endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, messages: &[ModelMessage], config: &LLMConfig, stream: bool, mapper: &ToolNameMapper) -> Value {
        let mut body = json!({
            "model": config.model,
            "messages": to_wire_messages(messages, mapper),
            "stream": stream,
        });

        let mut options = serde_json::Map::new();
        if let Some(temperature) = config.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = config.top_p {
            options.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(top_k) = config.top_k {
            options.insert("top_k".to_string(), json!(top_k));
        }
        if !config.stop_sequences.is_empty() {
            options.insert("stop".to_string(), json!(config.stop_sequences));
        }
        for key in ["num_ctx", "num_gpu", "num_thread", "num_batch", "numa"] {
            if let Some(value) = provider_option(&config.provider_options, "ollama", key) {
                options.insert(key.to_string(), value.clone());
            }
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        if let Some(keep_alive) = provider_option(&config.provider_options, "ollama", "keep_alive") {
            body["keep_alive"] = keep_alive.clone();
        }
        if let Some(raw) = provider_option(&config.provider_options, "ollama", "raw") {
            body["raw"] = raw.clone();
        }

        if !config.tools.is_empty() {
            body["tools"] = json!(config
                .tools
                .iter()
                .map(|tool| tool_to_wire(tool, mapper))
                .collect::<Vec<_>>());
        }

        body
    }
}

fn tool_to_wire(tool: &Tool, mapper: &ToolNameMapper) -> Value {
    let wire_name = mapper.wire_name(&tool.name).unwrap_or(&tool.name);
    json!({
        "type": "function",
        "function": {
            "name": wire_name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn to_wire_messages(messages: &[ModelMessage], mapper: &ToolNameMapper) -> Vec<Value> {
    let mut wire = Vec::new();
    for m in messages {
        let role_str = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let mut text = String::new();
        let mut images = Vec::new();
        let mut tool_calls = Vec::new();

        for part in &m.parts {
            match part {
                ChatContentPart::Text { text: t } => text.push_str(t),
                ChatContentPart::Image { data, .. } => {
                    images.push(base64_only(data));
                }
                ChatContentPart::ToolCall {
                    tool_name,
                    arguments_json,
                    ..
                } => {
                    let arguments: Value = serde_json::from_str(arguments_json).unwrap_or(Value::Null);
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    tool_calls.push(json!({"function": {"name": wire_name, "arguments": arguments}}));
                }
                ChatContentPart::ToolResult {
                    tool_name, payload, ..
                } => {
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    wire.push(json!({
                        "role": "tool",
                        "content": tool_result_text(payload),
                        "name": wire_name,
                    }));
                }
                _ => {}
            }
        }

        if text.is_empty() && images.is_empty() && tool_calls.is_empty() {
            continue;
        }

        let mut entry = json!({"role": role_str, "content": text});
        if !images.is_empty() {
            entry["images"] = json!(images);
        }
        if !tool_calls.is_empty() {
            entry["tool_calls"] = json!(tool_calls);
        }
        wire.push(entry);
    }
    wire
}

fn base64_only(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(data)
}

fn tool_result_text(payload: &ToolResultPayload) -> String {
    match payload {
        ToolResultPayload::Text { text } => text.clone(),
        ToolResultPayload::Structured { value } => value.to_string(),
        ToolResultPayload::Bytes { mime, .. } => format!("<binary {mime} tool result>"),
    }
}

fn parse_chunk(body: &Value, mapper: &ToolNameMapper) -> ChatResponse {
    let text = body
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let tool_calls = body
        .get("message")
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let function = c.get("function")?;
                    let wire_name = function.get("name")?.as_str()?;
                    Some(ToolCall {
                        id: format!("ollama_call_{}", uuid::Uuid::new_v4()),
                        name: resolve_tool_name(mapper, wire_name),
                        arguments_json: function.get("arguments")?.to_string(),
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let done = body.get("done").and_then(Value::as_bool).unwrap_or(false);
    let finish_reason = done.then(|| {
        if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        }
    });

    let usage = if done {
        body.get("prompt_eval_count").and_then(|p| {
            Some(Usage::new(
                p.as_u64()? as u32,
                body.get("eval_count")?.as_u64()? as u32,
            ))
        })
    } else {
        None
    };

    ChatResponse {
        text,
        reasoning: None,
        tool_calls,
        usage,
        finish_reason,
        provider_metadata: provider_metadata(PROVIDER_ID, ALIAS, body.clone()),
    }
}

#[async_trait]
impl ChatCapability for OllamaProvider {
    async fn chat(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, false, &mapper);
        let headers = super::common::bearer_headers(config.api_key.as_deref());
        let response = self
            .transport
            .post_json(&self.chat_endpoint(), headers, body, cancel)
            .await?;
        Ok(parse_chunk(&response.body, &mapper))
    }
}

#[async_trait]
impl ChatStreamPartsCapability for OllamaProvider {
    async fn chat_stream(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<PartStream, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, true, &mapper);
        let headers = super::common::bearer_headers(config.api_key.as_deref());
        let byte_stream = self
            .transport
            .post_stream(&self.chat_endpoint(), headers, body, cancel)
            .await?;

        Ok(jsonl_to_part_stream(byte_stream, move |value| {
            let chunk = parse_chunk(&value, &mapper);
            let mut parts = Vec::new();
            if let Some(text) = chunk.text {
                parts.push(Ok(StreamPart::TextDelta(text)));
            }
            for call in chunk.tool_calls {
                parts.push(Ok(StreamPart::ToolCallDone(call)));
            }
            if let Some(usage) = chunk.usage {
                parts.push(Ok(StreamPart::Usage(usage)));
            }
            if let Some(reason) = chunk.finish_reason {
                parts.push(Ok(StreamPart::FinishReason(reason)));
            }
            parts
        }))
    }
}

#[async_trait]
impl crate::llm::capability::ModelListingCapability for OllamaProvider {
    async fn list_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::llm::capability::ModelInfo>, LlmError> {
        let headers = super::common::bearer_headers(None);
        let response = self
            .transport
            .get_json(&self.tags_endpoint(), headers, cancel)
            .await?;
        let models = response
            .body
            .get("models")
            .and_then(Value::as_array)
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| {
                        Some(crate::llm::capability::ModelInfo {
                            id: m.get("name")?.as_str()?.to_string(),
                            display_name: None,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}

#[async_trait]
impl EmbeddingCapability for OllamaProvider {
    async fn embed(
        &self,
        inputs: &[String],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, LlmError> {
        let headers = super::common::bearer_headers(config.api_key.as_deref());
        let mut embeddings = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let body = json!({"model": config.model, "prompt": input});
            let response = self
                .transport
                .post_json(&self.embeddings_endpoint(), headers.clone(), body, cancel)
                .await?;
            let vector = response
                .body
                .get("embedding")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
                .unwrap_or_default();
            embeddings.push(Embedding {
                index: index as u32,
                vector,
            });
        }
        Ok(embeddings)
    }
}

impl ProviderCapabilities for OllamaProvider {
    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }
}
