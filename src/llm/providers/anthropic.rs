//! Anthropic Messages API (`/v1/messages`).
//!
//! Distinct enough from the OpenAI family to warrant its own request/response mapping rather than
//! delegating: the system prompt is a top-level field rather than a role in the message list, tool
//! results are `tool_result` content blocks rather than separate `tool`-role messages, and
//! streaming uses named SSE events (`content_block_delta` etc.) instead of one undifferentiated
//! `data:` chunk shape. Grounded in the teacher's `ClaudeClient` wrapper (which only reused the
//! OpenAI-compatible surface Anthropic also exposes) generalized to the native Messages wire
//! protocol this crate's scope actually targets.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{Capability, ChatCapability, ChatStreamPartsCapability, ProviderCapabilities};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::{self, ChatContentPart, ModelMessage, Role, ToolResultPayload};
use crate::llm::stream::{ChatResponse, FinishReason, PartStream, StreamPart, ToolCallAccumulator, Usage};
use crate::llm::tool::{Tool, ToolCall, ToolChoice};
use crate::llm::tool_name_mapping::ToolNameMapper;
use crate::llm::transport::HttpTransport;

use super::common::{anthropic_headers, build_tool_mapper, provider_metadata, resolve_tool_name, sse_to_part_stream};

const CAPABILITIES: &[Capability] = &[Capability::Chat, Capability::ChatStream];
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const PROVIDER_ID: &str = "anthropic";
const ALIAS: &str = "anthropic.messages";

/// Client for Anthropic's native Messages API.
pub struct AnthropicProvider {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl AnthropicProvider {
    /// Construct a provider talking to `base_url` (e.g. `"https://api.anthropic.com/v1"`)
    /// through `transport`.
    pub fn new(transport: impl HttpTransport + 'static, base_url: String) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    fn build_body(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        stream: bool,
        mapper: &ToolNameMapper,
    ) -> Result<Value, LlmError> {
        let (message_system, turns) = split_system_prompt(messages);
        if let Some(first) = turns.first() {
            if first.role != Role::User {
                return Err(LlmError::invalid_request(
                    "the first non-system message sent to Anthropic must have role 'user'",
                ));
            }
        }

        let system = match (&config.system_prompt, message_system) {
            (Some(config_system), Some(message_system)) => Some(format!("{config_system}\n\n{message_system}")),
            (Some(config_system), None) => Some(config_system.clone()),
            (None, message_system) => message_system,
        };

        let mut body = json!({
            "model": config.model,
            "max_tokens": config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": to_wire_messages(&turns, mapper)?,
            "stream": stream,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(top_k) = config.top_k {
            body["top_k"] = json!(top_k);
        }
        if !config.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(config.stop_sequences);
        }
        if !config.tools.is_empty() {
            body["tools"] = json!(config
                .tools
                .iter()
                .map(|tool| tool_to_wire(tool, mapper))
                .collect::<Vec<_>>());
        }
        if let Some(choice) = &config.tool_choice {
            body["tool_choice"] = tool_choice_to_wire(choice, mapper);
        }
        Ok(body)
    }
}

/// Anthropic requires the system prompt as a top-level field; the first turn after it must be a
/// user turn. This pulls every leading `Role::System` message out of the list (concatenating
/// their text) and returns the remaining turns unchanged.
fn split_system_prompt(messages: &[ModelMessage]) -> (Option<String>, Vec<ModelMessage>) {
    let mut system_text = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        if message.role == Role::System {
            system_text.push(message.concat_text());
        } else {
            rest.push(message.clone());
        }
    }
    (
        (!system_text.is_empty()).then(|| system_text.join("\n\n")),
        rest,
    )
}

fn tool_to_wire(tool: &Tool, mapper: &ToolNameMapper) -> Value {
    let wire_name = mapper.wire_name(&tool.name).unwrap_or(&tool.name);
    json!({
        "name": wire_name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn tool_choice_to_wire(choice: &ToolChoice, mapper: &ToolNameMapper) -> Value {
    match choice {
        ToolChoice::Auto { disable_parallel } => {
            json!({"type": "auto", "disable_parallel_tool_use": disable_parallel})
        }
        ToolChoice::None => json!({"type": "none"}),
        ToolChoice::Required { disable_parallel } => {
            json!({"type": "any", "disable_parallel_tool_use": disable_parallel})
        }
        ToolChoice::Specific { name, disable_parallel } => {
            let wire_name = mapper.wire_name(name).unwrap_or(name);
            json!({"type": "tool", "name": wire_name, "disable_parallel_tool_use": disable_parallel})
        }
    }
}

fn to_wire_messages(messages: &[ModelMessage], mapper: &ToolNameMapper) -> Result<Vec<Value>, LlmError> {
    let mut wire = Vec::new();
    for m in messages {
        let role_str = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => continue, // pulled out by split_system_prompt already
        };

        let mut blocks = Vec::new();
        for part in &m.parts {
            match part {
                ChatContentPart::Text { text } => blocks.push(json!({"type": "text", "text": text})),
                ChatContentPart::Reasoning { text, signature } => blocks.push(json!({
                    "type": "thinking",
                    "thinking": text,
                    "signature": signature,
                })),
                ChatContentPart::Image { mime, data, .. } => blocks.push(json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": mime, "data": base64_data(data)},
                })),
                ChatContentPart::ImageUrl { url, .. } => blocks.push(json!({
                    "type": "image",
                    "source": {"type": "url", "url": url},
                })),
                ChatContentPart::File { mime, data, .. } if mime == "application/pdf" => {
                    blocks.push(json!({
                        "type": "document",
                        "source": {"type": "base64", "media_type": mime, "data": base64_data(data)},
                    }));
                }
                ChatContentPart::ToolCall {
                    id,
                    tool_name,
                    arguments_json,
                    ..
                } => {
                    let input: Value = serde_json::from_str(arguments_json).unwrap_or(Value::Null);
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    blocks.push(json!({"type": "tool_use", "id": id, "name": wire_name, "input": input}));
                }
                ChatContentPart::ToolResult {
                    call_id,
                    payload,
                    is_error,
                    ..
                } => blocks.push(json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": tool_result_text(payload),
                    "is_error": is_error,
                })),
                ChatContentPart::File { .. } | ChatContentPart::UrlFile { .. } => {
                    return Err(LlmError::invalid_request(
                        "Anthropic only accepts PDF file parts; other file MIME types are rejected",
                    ));
                }
            }
        }

        if let Some(cache) = message::provider_option(&m.provider_options, "anthropic", "cacheControl") {
            if let Some(last) = blocks.last_mut() {
                last["cache_control"] = cache.clone();
            }
        }

        if !blocks.is_empty() {
            wire.push(json!({"role": role_str, "content": blocks}));
        }
    }
    Ok(wire)
}

fn base64_data(data: &[u8]) -> String {
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

fn parse_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "pause_turn" => FinishReason::PauseTurn,
        other => FinishReason::Other(other.to_string()),
    }
}

fn parse_response(body: &Value, mapper: &ToolNameMapper) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut reasoning_parts = Vec::new();
    let mut tool_calls = Vec::new();

    if let Some(content) = body.get("content").and_then(Value::as_array) {
        for block in content {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        text_parts.push(text.to_string());
                    }
                }
                Some("thinking") => {
                    if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                        reasoning_parts.push(text.to_string());
                    }
                }
                Some("tool_use") => {
                    if let (Some(id), Some(wire_name)) = (
                        block.get("id").and_then(Value::as_str),
                        block.get("name").and_then(Value::as_str),
                    ) {
                        let input = block.get("input").cloned().unwrap_or(Value::Null);
                        tool_calls.push(ToolCall {
                            id: id.to_string(),
                            name: resolve_tool_name(mapper, wire_name),
                            arguments_json: input.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    let usage = body.get("usage").and_then(|u| {
        Some(Usage::new(
            u.get("input_tokens")?.as_u64()? as u32,
            u.get("output_tokens")?.as_u64()? as u32,
        ))
    });

    let finish_reason = body
        .get("stop_reason")
        .and_then(Value::as_str)
        .map(parse_stop_reason);

    ChatResponse {
        text: (!text_parts.is_empty()).then(|| text_parts.join("")),
        reasoning: (!reasoning_parts.is_empty()).then(|| reasoning_parts.join("")),
        tool_calls,
        usage,
        finish_reason,
        provider_metadata: provider_metadata(PROVIDER_ID, ALIAS, body.clone()),
    }
}

#[async_trait]
impl ChatCapability for AnthropicProvider {
    async fn chat(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, false, &mapper)?;
        let headers = anthropic_headers(config.api_key.as_deref(), ANTHROPIC_VERSION);
        let response = self
            .transport
            .post_json(&self.endpoint(), headers, body, cancel)
            .await?;
        Ok(parse_response(&response.body, &mapper))
    }
}

#[async_trait]
impl ChatStreamPartsCapability for AnthropicProvider {
    async fn chat_stream(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<PartStream, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, true, &mapper)?;
        let headers = anthropic_headers(config.api_key.as_deref(), ANTHROPIC_VERSION);
        let byte_stream = self
            .transport
            .post_stream(&self.endpoint(), headers, body, cancel)
            .await?;

        let mut accumulator = ToolCallAccumulator::new();
        let mut signature_by_index: std::collections::HashMap<u32, String> = Default::default();

        Ok(sse_to_part_stream(byte_stream, move |event| {
            let Some(event_type) = event.event.as_deref() else {
                return Vec::new();
            };
            let parsed: Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("llm_core::anthropic malformed stream event {event_type}: {e}");
                    return vec![Err(LlmError::Generic {
                        message: format!("malformed Anthropic stream event: {e}"),
                    })];
                }
            };

            if log::log_enabled!(log::Level::Trace) {
                log::trace!("llm_core::anthropic stream event {event_type}: {}", event.data);
            }

            match event_type {
                "content_block_start" => {
                    let index = parsed.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                    let block = parsed.get("content_block");
                    if block.and_then(|b| b.get("type")).and_then(Value::as_str) == Some("tool_use") {
                        if let (Some(id), Some(wire_name)) = (
                            block.and_then(|b| b.get("id")).and_then(Value::as_str),
                            block.and_then(|b| b.get("name")).and_then(Value::as_str),
                        ) {
                            accumulator.start(index, id, resolve_tool_name(&mapper, wire_name));
                        }
                    }
                    Vec::new()
                }
                "content_block_delta" => {
                    let index = parsed.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;
                    let Some(delta) = parsed.get("delta") else {
                        return Vec::new();
                    };
                    match delta.get("type").and_then(Value::as_str) {
                        Some("text_delta") => {
                            let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
                            vec![Ok(StreamPart::TextDelta(text.to_string()))]
                        }
                        Some("thinking_delta") => {
                            let text = delta.get("thinking").and_then(Value::as_str).unwrap_or_default();
                            vec![Ok(StreamPart::ReasoningDelta {
                                text: text.to_string(),
                                signature: signature_by_index.get(&index).cloned(),
                            })]
                        }
                        Some("signature_delta") => {
                            if let Some(sig) = delta.get("signature").and_then(Value::as_str) {
                                signature_by_index.insert(index, sig.to_string());
                            }
                            Vec::new()
                        }
                        Some("input_json_delta") => {
                            let partial = delta.get("partial_json").and_then(Value::as_str).unwrap_or_default();
                            accumulator.append_arguments(index, partial);
                            Vec::new()
                        }
                        other => {
                            log::warn!("llm_core::anthropic unknown content_block_delta type {other:?}");
                            Vec::new()
                        }
                    }
                }
                "message_delta" => {
                    let mut parts = Vec::new();
                    if let Some(usage) = parsed.get("usage").and_then(|u| {
                        Some(Usage::new(0, u.get("output_tokens")?.as_u64()? as u32))
                    }) {
                        parts.push(Ok(StreamPart::Usage(usage)));
                    }
                    if let Some(reason) = parsed
                        .get("delta")
                        .and_then(|d| d.get("stop_reason"))
                        .and_then(Value::as_str)
                    {
                        let finish_reason = parse_stop_reason(reason);
                        if finish_reason == FinishReason::ToolCalls {
                            let finished = std::mem::take(&mut accumulator);
                            for call in finished.finalize() {
                                parts.push(Ok(StreamPart::ToolCallDone(call)));
                            }
                        }
                        parts.push(Ok(StreamPart::FinishReason(finish_reason)));
                    }
                    parts
                }
                "error" => {
                    let message = parsed
                        .get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown Anthropic error")
                        .to_string();
                    vec![Ok(StreamPart::Error(LlmError::provider(message)))]
                }
                other => {
                    log::warn!("llm_core::anthropic unknown stream event type {other}");
                    Vec::new()
                }
            }
        }))
    }
}

impl ProviderCapabilities for AnthropicProvider {
    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_system_prompt_pulls_leading_system_messages_out() {
        let messages = vec![
            ModelMessage::text(Role::System, "be nice"),
            ModelMessage::text(Role::User, "hi"),
        ];
        let (system, rest) = split_system_prompt(&messages);
        assert_eq!(system.as_deref(), Some("be nice"));
        assert_eq!(rest.len(), 1);
    }

    fn no_tools_mapper() -> ToolNameMapper {
        build_tool_mapper(&[])
    }

    #[test]
    fn wire_messages_reject_non_pdf_files() {
        let messages = vec![ModelMessage::new(
            Role::User,
            vec![ChatContentPart::File {
                mime: "text/plain".to_string(),
                data: vec![1, 2, 3],
                caption: None,
            }],
        )];
        assert!(to_wire_messages(&messages, &no_tools_mapper()).is_err());
    }

    #[test]
    fn parse_response_collects_text_and_tool_use() {
        let body = json!({
            "content": [
                {"type": "text", "text": "hi"},
                {"type": "tool_use", "id": "toolu_1", "name": "search", "input": {"q": "rust"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let parsed = parse_response(&body, &no_tools_mapper());
        assert_eq!(parsed.text.as_deref(), Some("hi"));
        assert_eq!(parsed.tool_calls[0].name, "search");
        assert_eq!(parsed.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn parse_response_double_keys_provider_metadata() {
        let body = json!({"content": [], "stop_reason": "end_turn"});
        let parsed = parse_response(&body, &no_tools_mapper());
        assert_eq!(parsed.provider_metadata["anthropic"], parsed.provider_metadata["anthropic.messages"]);
    }

    #[test]
    fn build_body_rejects_an_assistant_first_prompt() {
        let provider = AnthropicProvider::new(crate::llm::transport::ReqwestTransport::shared(), "https://api.anthropic.com/v1".to_string());
        let messages = vec![ModelMessage::text(Role::Assistant, "hi, how can I help?")];
        let config = LLMConfig::builder().model("claude-sonnet-4-5").build();
        let result = provider.build_body(&messages, &config, false, &no_tools_mapper());
        assert!(result.is_err());
    }

    #[test]
    fn build_body_accepts_a_user_first_prompt() {
        let provider = AnthropicProvider::new(crate::llm::transport::ReqwestTransport::shared(), "https://api.anthropic.com/v1".to_string());
        let messages = vec![ModelMessage::text(Role::User, "hi")];
        let config = LLMConfig::builder().model("claude-sonnet-4-5").build();
        assert!(provider.build_body(&messages, &config, false, &no_tools_mapper()).is_ok());
    }

    #[test]
    fn pause_turn_stop_reason_maps_to_non_terminal_finish_reason() {
        assert_eq!(parse_stop_reason("pause_turn"), FinishReason::PauseTurn);
        assert!(!parse_stop_reason("pause_turn").is_terminal());
    }
}
