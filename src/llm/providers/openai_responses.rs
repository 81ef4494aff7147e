//! The OpenAI Responses API (`/responses`).
//!
//! Distinct wire shape from Chat Completions: the request carries an `input` item list instead of
//! a `messages` list, and a `reasoning` item type carries the model's thinking content plus an
//! `encrypted_content` signature that must be echoed back untouched on the next turn (this is
//! where [`crate::message::ChatContentPart::Reasoning::signature`] comes from). Grounded in the
//! teacher's `OpenAIClient` routing `openai_tools`-bearing requests to this API instead of Chat
//! Completions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{Capability, ChatCapability, ChatStreamPartsCapability, ProviderCapabilities};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::{ChatContentPart, ModelMessage, Role, ToolResultPayload};
use crate::llm::stream::{ChatResponse, FinishReason, PartStream, StreamPart, ToolCallAccumulator, Usage};
use crate::llm::tool::{ProviderTool, Tool, ToolCall, ToolChoice};
use crate::llm::tool_name_mapping::ToolNameMapper;
use crate::llm::transport::HttpTransport;

use super::common::{bearer_headers, build_tool_mapper, provider_metadata, resolve_tool_name, sse_to_part_stream};

const CAPABILITIES: &[Capability] = &[Capability::Chat, Capability::ChatStream];
const PROVIDER_ID: &str = "openai";
const ALIAS: &str = "openai.responses";

/// Client for OpenAI's Responses API.
pub struct OpenAIResponsesProvider {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl OpenAIResponsesProvider {
    /// Construct a provider talking to `base_url` through `transport`.
    pub fn new(transport: impl HttpTransport + 'static, base_url: String) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }

    fn build_body(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        stream: bool,
        mapper: &ToolNameMapper,
    ) -> Result<Value, LlmError> {
        let mut body = json!({
            "model": config.model,
            "input": to_input_items(messages, mapper),
            "stream": stream,
        });
        if let Some(system_prompt) = &config.system_prompt {
            body["instructions"] = json!(system_prompt);
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(max_tokens) = config.max_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }
        if let Some(user) = &config.user {
            body["user"] = json!(user);
        }
        if let Some(service_tier) = &config.service_tier {
            body["service_tier"] = json!(service_tier);
        }

        let mut tools_wire: Vec<Value> = config.tools.iter().map(|tool| tool_to_wire(tool, mapper)).collect();
        tools_wire.extend(config.provider_tools.iter().map(provider_tool_to_wire));
        if !tools_wire.is_empty() {
            body["tools"] = json!(tools_wire);
        }
        if let Some(choice) = &config.tool_choice {
            body["tool_choice"] = tool_choice_to_wire(choice, mapper);
            body["parallel_tool_calls"] = json!(!choice.disable_parallel());
        }
        Ok(body)
    }
}

fn tool_to_wire(tool: &Tool, mapper: &ToolNameMapper) -> Value {
    let wire_name = mapper.wire_name(&tool.name).unwrap_or(&tool.name);
    json!({
        "type": "function",
        "name": wire_name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

/// Maps a [`ProviderTool`] to the Responses API's native tool wire shape, e.g.
/// `web_search`/`file_search`/`code_interpreter`/`image_generation`/`computer_use`. `options` is
/// merged in as sibling fields of the `{"type": ...}` object (e.g. `file_search`'s
/// `vector_store_ids`), matching how the Responses API itself flattens tool config.
fn provider_tool_to_wire(tool: &ProviderTool) -> Value {
    let wire_type = match tool.name.as_str() {
        "computer_use" => "computer_use_preview",
        other => other,
    };
    let mut wire = json!({"type": wire_type});
    if let Some(extra) = tool.options.as_object() {
        if let Some(map) = wire.as_object_mut() {
            for (key, value) in extra {
                map.insert(key.clone(), value.clone());
            }
        }
    }
    wire
}

fn tool_choice_to_wire(choice: &ToolChoice, mapper: &ToolNameMapper) -> Value {
    match choice {
        ToolChoice::Auto { .. } => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required { .. } => json!("required"),
        ToolChoice::Specific { name, .. } => {
            let wire_name = mapper.wire_name(name).unwrap_or(name);
            json!({"type": "function", "name": wire_name})
        }
    }
}

fn to_input_items(messages: &[ModelMessage], mapper: &ToolNameMapper) -> Vec<Value> {
    let mut items = Vec::new();
    for message in messages {
        let role_str = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let mut content: Vec<Value> = Vec::new();
        for part in &message.parts {
            match part {
                ChatContentPart::Text { text } => {
                    content.push(json!({"type": "input_text", "text": text}));
                }
                ChatContentPart::ImageUrl { url, detail } => {
                    content.push(json!({
                        "type": "input_image",
                        "image_url": url,
                        "detail": detail.clone().unwrap_or_else(|| "auto".to_string()),
                    }));
                }
                ChatContentPart::Image { mime, data, .. } => {
                    content.push(json!({
                        "type": "input_image",
                        "image_url": super::common::data_url(mime, data),
                    }));
                }
                ChatContentPart::File { mime, data, .. } if mime == "application/pdf" => {
                    content.push(json!({
                        "type": "input_file",
                        "file_data": super::common::data_url(mime, data),
                    }));
                }
                ChatContentPart::Reasoning { text, signature } => {
                    items.push(json!({
                        "type": "reasoning",
                        "content": [{"type": "reasoning_text", "text": text}],
                        "encrypted_content": signature,
                    }));
                }
                ChatContentPart::ToolCall {
                    id,
                    tool_name,
                    arguments_json,
                    ..
                } => {
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    items.push(json!({
                        "type": "function_call",
                        "call_id": id,
                        "name": wire_name,
                        "arguments": arguments_json,
                    }));
                }
                ChatContentPart::ToolResult {
                    call_id, payload, ..
                } => {
                    items.push(json!({
                        "type": "function_call_output",
                        "call_id": call_id,
                        "output": tool_result_text(payload),
                    }));
                }
                ChatContentPart::File { .. } | ChatContentPart::UrlFile { .. } => {}
            }
        }

        if !content.is_empty() {
            items.push(json!({"role": role_str, "content": content}));
        }
    }
    items
}

fn tool_result_text(payload: &ToolResultPayload) -> String {
    match payload {
        ToolResultPayload::Text { text } => text.clone(),
        ToolResultPayload::Structured { value } => value.to_string(),
        ToolResultPayload::Bytes { mime, .. } => format!("<binary {mime} tool result>"),
    }
}

fn parse_output(response: &Value, mapper: &ToolNameMapper) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut reasoning_parts = Vec::new();
    let mut tool_calls = Vec::new();

    if let Some(output) = response.get("output").and_then(Value::as_array) {
        for item in output {
            match item.get("type").and_then(Value::as_str) {
                Some("message") => {
                    if let Some(content) = item.get("content").and_then(Value::as_array) {
                        for part in content {
                            if let Some(text) = part.get("text").and_then(Value::as_str) {
                                text_parts.push(text.to_string());
                            }
                        }
                    }
                }
                Some("reasoning") => {
                    if let Some(content) = item.get("content").and_then(Value::as_array) {
                        for part in content {
                            if let Some(text) = part.get("text").and_then(Value::as_str) {
                                reasoning_parts.push(text.to_string());
                            }
                        }
                    }
                }
                Some("function_call") => {
                    if let (Some(id), Some(name), Some(args)) = (
                        item.get("call_id").and_then(Value::as_str),
                        item.get("name").and_then(Value::as_str),
                        item.get("arguments").and_then(Value::as_str),
                    ) {
                        tool_calls.push(ToolCall {
                            id: id.to_string(),
                            name: resolve_tool_name(mapper, name),
                            arguments_json: args.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    let usage = response.get("usage").and_then(|u| {
        Some(Usage::new(
            u.get("input_tokens")?.as_u64()? as u32,
            u.get("output_tokens")?.as_u64()? as u32,
        ))
    });

    let finish_reason = if !tool_calls.is_empty() {
        Some(FinishReason::ToolCalls)
    } else {
        Some(FinishReason::Stop)
    };

    ChatResponse {
        text: (!text_parts.is_empty()).then(|| text_parts.join("")),
        reasoning: (!reasoning_parts.is_empty()).then(|| reasoning_parts.join("")),
        tool_calls,
        usage,
        finish_reason,
        provider_metadata: provider_metadata(PROVIDER_ID, ALIAS, response.clone()),
    }
}

#[async_trait]
impl ChatCapability for OpenAIResponsesProvider {
    async fn chat(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, false, &mapper)?;
        let headers = bearer_headers(config.api_key.as_deref());
        let response = self
            .transport
            .post_json(&self.endpoint(), headers, body, cancel)
            .await?;
        Ok(parse_output(&response.body, &mapper))
    }
}

#[async_trait]
impl ChatStreamPartsCapability for OpenAIResponsesProvider {
    async fn chat_stream(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<PartStream, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, true, &mapper)?;
        let headers = bearer_headers(config.api_key.as_deref());
        let byte_stream = self
            .transport
            .post_stream(&self.endpoint(), headers, body, cancel)
            .await?;

        let mut accumulator = ToolCallAccumulator::new();
        Ok(sse_to_part_stream(byte_stream, move |event| {
            let Some(event_type) = event.event.as_deref() else {
                return Vec::new();
            };
            let parsed: Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("llm_core::openai_responses malformed stream event {event_type}: {e}");
                    return vec![Err(LlmError::Generic {
                        message: format!("malformed responses event: {e}"),
                    })];
                }
            };

            if log::log_enabled!(log::Level::Trace) {
                log::trace!("llm_core::openai_responses stream event {event_type}: {}", event.data);
            }

            match event_type {
                "response.output_text.delta" => {
                    let delta = parsed.get("delta").and_then(Value::as_str).unwrap_or_default();
                    vec![Ok(StreamPart::TextDelta(delta.to_string()))]
                }
                "response.reasoning_text.delta" => {
                    let delta = parsed.get("delta").and_then(Value::as_str).unwrap_or_default();
                    vec![Ok(StreamPart::ReasoningDelta {
                        text: delta.to_string(),
                        signature: None,
                    })]
                }
                "response.output_item.added" => {
                    let item = parsed.get("item");
                    if item.and_then(|i| i.get("type")).and_then(Value::as_str) == Some("function_call") {
                        let index = parsed.get("output_index").and_then(Value::as_u64).unwrap_or(0) as u32;
                        if let (Some(id), Some(name)) = (
                            item.and_then(|i| i.get("call_id")).and_then(Value::as_str),
                            item.and_then(|i| i.get("name")).and_then(Value::as_str),
                        ) {
                            accumulator.start(index, id, resolve_tool_name(&mapper, name));
                        }
                    }
                    Vec::new()
                }
                "response.function_call_arguments.delta" => {
                    let index = parsed.get("output_index").and_then(Value::as_u64).unwrap_or(0) as u32;
                    let delta = parsed.get("delta").and_then(Value::as_str).unwrap_or_default();
                    accumulator.append_arguments(index, delta);
                    Vec::new()
                }
                "response.completed" => {
                    let mut parts = Vec::new();
                    let finished = std::mem::take(&mut accumulator);
                    for call in finished.finalize() {
                        parts.push(Ok(StreamPart::ToolCallDone(call)));
                    }
                    if let Some(response) = parsed.get("response") {
                        let parsed_response = parse_output(response, &mapper);
                        if let Some(usage) = parsed_response.usage {
                            parts.push(Ok(StreamPart::Usage(usage)));
                        }
                        if let Some(reason) = parsed_response.finish_reason {
                            parts.push(Ok(StreamPart::FinishReason(reason)));
                        }
                    }
                    parts
                }
                "error" => {
                    let message = parsed
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown responses API error")
                        .to_string();
                    vec![Ok(StreamPart::Error(LlmError::provider(message)))]
                }
                other => {
                    log::warn!("llm_core::openai_responses unknown stream event type {other}");
                    Vec::new()
                }
            }
        }))
    }
}

impl ProviderCapabilities for OpenAIResponsesProvider {
    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_tools_mapper() -> ToolNameMapper {
        build_tool_mapper(&[])
    }

    #[test]
    fn input_items_carry_reasoning_signature_as_encrypted_content() {
        let messages = vec![ModelMessage::new(
            Role::Assistant,
            vec![ChatContentPart::Reasoning {
                text: "thinking...".to_string(),
                signature: Some("sig123".to_string()),
            }],
        )];
        let items = to_input_items(&messages, &no_tools_mapper());
        assert_eq!(items[0]["encrypted_content"], json!("sig123"));
    }

    #[test]
    fn parse_output_collects_text_and_tool_calls() {
        let response = json!({
            "output": [
                {"type": "message", "content": [{"type": "output_text", "text": "hi"}]},
                {"type": "function_call", "call_id": "call_1", "name": "search", "arguments": "{}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let parsed = parse_output(&response, &no_tools_mapper());
        assert_eq!(parsed.text.as_deref(), Some("hi"));
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn parse_output_double_keys_provider_metadata() {
        let response = json!({"output": [], "usage": {"input_tokens": 1, "output_tokens": 1}});
        let parsed = parse_output(&response, &no_tools_mapper());
        assert_eq!(parsed.provider_metadata["openai"], parsed.provider_metadata["openai.responses"]);
    }

    #[test]
    fn provider_tool_to_wire_renames_computer_use_to_preview_type() {
        let tool = ProviderTool::new("computer_use");
        assert_eq!(provider_tool_to_wire(&tool)["type"], "computer_use_preview");
    }

    #[test]
    fn provider_tool_to_wire_merges_options_as_sibling_fields() {
        let tool = ProviderTool::new("file_search").with_options(json!({"vector_store_ids": ["vs_1"]}));
        let wire = provider_tool_to_wire(&tool);
        assert_eq!(wire["type"], "file_search");
        assert_eq!(wire["vector_store_ids"][0], "vs_1");
    }

    #[test]
    fn build_body_rewrites_tool_choice_for_struct_variant_shape() {
        let provider = OpenAIResponsesProvider::new(crate::llm::transport::ReqwestTransport::shared(), "https://api.openai.com/v1".to_string());
        let config = LLMConfig::builder()
            .model("gpt-4.1")
            .tool_choice(ToolChoice::specific("search").disallow_parallel())
            .build();
        let body = provider.build_body(&[], &config, false, &no_tools_mapper()).unwrap();
        assert_eq!(body["tool_choice"], json!({"type": "function", "name": "search"}));
        assert_eq!(body["parallel_tool_calls"], json!(false));
    }
}
