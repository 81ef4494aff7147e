//! OpenAI Chat Completions (`/chat/completions`).
//!
//! Wire bodies are built with `serde_json::json!` directly against the documented request shape,
//! the same "skip a typed SDK, POST the JSON" idiom the teacher's
//! `clients::common::send_with_native_tools` used — generalized here from a flat string-content
//! message list to the full [`ModelMessage`] IR, and with streaming added.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{
    Capability, ChatCapability, ChatStreamPartsCapability, FileManagementCapability, ProviderCapabilities,
    UploadedFile,
};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::image_generation::{
    ImageData, ImageGenerationCapability, ImageGenerationOptions, ImageGenerationResponse,
};
use crate::llm::message::{ChatContentPart, ModelMessage, Role, ToolResultPayload};
use crate::llm::stream::{ChatResponse, FinishReason, PartStream, StreamPart, ToolCallAccumulator, Usage};
use crate::llm::tool::{Tool, ToolCall, ToolChoice};
use crate::llm::tool_name_mapping::ToolNameMapper;
use crate::llm::transport::HttpTransport;

use super::common::{bearer_headers, build_tool_mapper, provider_metadata, resolve_tool_name, sse_to_part_stream};

const CAPABILITIES: &[Capability] = &[
    Capability::Chat,
    Capability::ChatStream,
    Capability::ImageGeneration,
    Capability::FileManagement,
];

/// Client for OpenAI's Chat Completions endpoint, and the delegate target for every
/// OpenAI-compatible vendor in [`super::compatible`] (DeepSeek, Groq, OpenRouter, Phind all speak
/// this exact wire protocol against a different `base_url`).
pub struct OpenAIChatProvider {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    provider_id: String,
    alias: String,
}

impl OpenAIChatProvider {
    /// Construct a provider talking to `base_url` (e.g. `"https://api.openai.com/v1"`) through
    /// `transport`.
    pub fn new(transport: impl HttpTransport + 'static, base_url: String) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
            provider_id: "openai".to_string(),
            alias: "openai.chat".to_string(),
        }
    }

    /// Construct a provider sharing an already-`Arc`'d transport, used by
    /// [`super::compatible`]'s thin wrappers to avoid rebuilding a connection pool per vendor.
    pub fn from_shared(transport: Arc<dyn HttpTransport>, base_url: String) -> Self {
        Self {
            transport,
            base_url,
            provider_id: "openai".to_string(),
            alias: "openai.chat".to_string(),
        }
    }

    /// Override the ids used to double-key `provider_metadata`, for vendors that speak this exact
    /// wire protocol under a different identity (DeepSeek, Groq, OpenRouter, Phind).
    pub fn with_provider_ids(mut self, provider_id: impl Into<String>, alias: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self.alias = alias.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn image_endpoint(&self) -> String {
        format!("{}/images/generations", self.base_url.trim_end_matches('/'))
    }

    fn files_endpoint(&self) -> String {
        format!("{}/files", self.base_url.trim_end_matches('/'))
    }

    fn file_endpoint(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.base_url.trim_end_matches('/'), file_id)
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
            "messages": to_wire_messages(messages, mapper)?,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({"include_usage": true});
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = config.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !config.stop_sequences.is_empty() {
            body["stop"] = json!(config.stop_sequences);
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
            body["parallel_tool_calls"] = json!(!choice.disable_parallel());
        }
        Ok(body)
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

fn tool_choice_to_wire(choice: &ToolChoice, mapper: &ToolNameMapper) -> Value {
    match choice {
        ToolChoice::Auto { .. } => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required { .. } => json!("required"),
        ToolChoice::Specific { name, .. } => {
            let wire_name = mapper.wire_name(name).unwrap_or(name);
            json!({"type": "function", "function": {"name": wire_name}})
        }
    }
}

fn to_wire_messages(messages: &[ModelMessage], mapper: &ToolNameMapper) -> Result<Vec<Value>, LlmError> {
    let mut wire = Vec::new();
    for message in messages {
        let role_str = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let mut content_parts: Vec<Value> = Vec::new();
        let mut text_only = true;
        let mut tool_calls_wire: Vec<Value> = Vec::new();

        for part in &message.parts {
            match part {
                ChatContentPart::Text { text } => {
                    content_parts.push(json!({"type": "text", "text": text}));
                }
                ChatContentPart::ImageUrl { url, detail } => {
                    text_only = false;
                    content_parts.push(json!({
                        "type": "image_url",
                        "image_url": {
                            "url": url,
                            "detail": detail.clone().unwrap_or_else(|| "auto".to_string()),
                        }
                    }));
                }
                ChatContentPart::Image { mime, data, .. } => {
                    text_only = false;
                    content_parts.push(json!({
                        "type": "image_url",
                        "image_url": {"url": super::common::data_url(mime, data)}
                    }));
                }
                ChatContentPart::ToolCall {
                    id,
                    tool_name,
                    arguments_json,
                    ..
                } => {
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    tool_calls_wire.push(json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": wire_name, "arguments": arguments_json},
                    }));
                }
                ChatContentPart::ToolResult {
                    call_id, payload, ..
                } => {
                    wire.push(json!({
                        "role": "tool",
                        "tool_call_id": call_id,
                        "content": tool_result_text(payload),
                    }));
                }
                // Reasoning input isn't accepted by this endpoint; files/url-files have no
                // Chat Completions wire representation and are dropped rather than rejected,
                // since a caller building provider-agnostic prompts shouldn't have to special
                // case every vendor's gaps.
                ChatContentPart::Reasoning { .. } | ChatContentPart::File { .. } | ChatContentPart::UrlFile { .. } => {}
            }
        }

        if content_parts.is_empty() && tool_calls_wire.is_empty() {
            continue;
        }

        let mut entry = json!({"role": role_str});
        if !content_parts.is_empty() {
            entry["content"] = if text_only && content_parts.len() == 1 {
                content_parts[0]["text"].clone()
            } else {
                json!(content_parts)
            };
        }
        if !tool_calls_wire.is_empty() {
            entry["tool_calls"] = json!(tool_calls_wire);
        }
        wire.push(entry);
    }
    Ok(wire)
}

fn tool_result_text(payload: &ToolResultPayload) -> String {
    match payload {
        ToolResultPayload::Text { text } => text.clone(),
        ToolResultPayload::Structured { value } => value.to_string(),
        ToolResultPayload::Bytes { mime, .. } => format!("<binary {mime} tool result>"),
    }
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

fn parse_usage(body: &Value) -> Option<Usage> {
    let usage = body.get("usage")?;
    Some(Usage::new(
        usage.get("prompt_tokens")?.as_u64()? as u32,
        usage.get("completion_tokens")?.as_u64()? as u32,
    ))
}

/// DeepSeek's reasoner model and several other OpenAI-compatible vendors surface the model's
/// chain-of-thought either as a dedicated `reasoning_content`/`reasoning` message field, or (older
/// DeepSeek behavior) inline in `content` delimited by a `<think>...</think>` block. Both shapes are
/// handled here since this parser is shared by DeepSeek/Groq/OpenRouter/Phind via
/// [`super::compatible`].
fn extract_reasoning(message: &Value) -> Option<String> {
    message
        .get("reasoning_content")
        .or_else(|| message.get("reasoning"))
        .or_else(|| message.get("thinking"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Split a `<think>...</think>`-wrapped content string into `(reasoning, visible_text)`. Returns
/// `(None, content)` unchanged when no think block is present.
fn split_inline_think_block(content: &str) -> (Option<String>, String) {
    if let Some(start) = content.find("<think>") {
        if let Some(end) = content.find("</think>") {
            let reasoning = content[start + "<think>".len()..end].trim().to_string();
            let mut visible = String::new();
            visible.push_str(&content[..start]);
            visible.push_str(&content[end + "</think>".len()..]);
            return (Some(reasoning), visible.trim().to_string());
        }
    }
    (None, content.to_string())
}

#[async_trait]
impl ChatCapability for OpenAIChatProvider {
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

        let choice = response
            .body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::provider("response had no choices"))?;
        let message = choice
            .get("message")
            .ok_or_else(|| LlmError::provider("choice had no message"))?;

        let raw_content = message.get("content").and_then(Value::as_str).unwrap_or("");
        let (inline_reasoning, visible_text) = split_inline_think_block(raw_content);
        let text = Some(visible_text).filter(|s| !s.is_empty());
        let reasoning = extract_reasoning(message).or(inline_reasoning);

        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let wire_name = c.get("function")?.get("name")?.as_str()?;
                        Some(ToolCall {
                            id: c.get("id")?.as_str()?.to_string(),
                            name: resolve_tool_name(&mapper, wire_name),
                            arguments_json: c
                                .get("function")?
                                .get("arguments")?
                                .as_str()?
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(parse_finish_reason);

        Ok(ChatResponse {
            text,
            reasoning,
            tool_calls,
            usage: parse_usage(&response.body),
            finish_reason,
            provider_metadata: provider_metadata(&self.provider_id, &self.alias, response.body.clone()),
        })
    }
}

#[async_trait]
impl ChatStreamPartsCapability for OpenAIChatProvider {
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
            let parsed: Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("llm_core::openai_chat malformed stream chunk: {e}");
                    return vec![Err(LlmError::Generic {
                        message: format!("malformed chat completion chunk: {e}"),
                    })];
                }
            };

            let mut parts = Vec::new();
            if let Some(usage) = parse_usage(&parsed) {
                parts.push(Ok(StreamPart::Usage(usage)));
            }

            let Some(choice) = parsed.get("choices").and_then(|c| c.get(0)) else {
                return parts;
            };

            if let Some(delta) = choice.get("delta") {
                if let Some(text) = delta.get("content").and_then(Value::as_str) {
                    if !text.is_empty() {
                        parts.push(Ok(StreamPart::TextDelta(text.to_string())));
                    }
                }
                if let Some(reasoning) = extract_reasoning(delta) {
                    parts.push(Ok(StreamPart::ReasoningDelta {
                        text: reasoning,
                        signature: None,
                    }));
                }
                if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                    for call in tool_calls {
                        let Some(index) = call.get("index").and_then(Value::as_u64) else {
                            continue;
                        };
                        let index = index as u32;
                        if let (Some(id), Some(wire_name)) = (
                            call.get("id").and_then(Value::as_str),
                            call.get("function").and_then(|f| f.get("name")).and_then(Value::as_str),
                        ) {
                            accumulator.start(index, id, resolve_tool_name(&mapper, wire_name));
                        }
                        if let Some(args) = call
                            .get("function")
                            .and_then(|f| f.get("arguments"))
                            .and_then(Value::as_str)
                        {
                            accumulator.append_arguments(index, args);
                        }
                    }
                }
            }

            if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                let finish_reason = parse_finish_reason(reason);
                if finish_reason == FinishReason::ToolCalls {
                    let finished = std::mem::take(&mut accumulator);
                    for call in finished.finalize() {
                        parts.push(Ok(StreamPart::ToolCallDone(call)));
                    }
                }
                parts.push(Ok(StreamPart::FinishReason(finish_reason)));
            }

            parts
        }))
    }
}

#[async_trait]
impl ImageGenerationCapability for OpenAIChatProvider {
    async fn generate_image(
        &self,
        prompt: &str,
        options: &ImageGenerationOptions,
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ImageGenerationResponse, LlmError> {
        let mut body = json!({
            "model": config.model,
            "prompt": prompt,
        });
        if let Some(aspect_ratio) = &options.aspect_ratio {
            body["size"] = json!(aspect_ratio_to_size(aspect_ratio));
        }
        if let Some(n) = options.num_images {
            body["n"] = json!(n);
        }
        if let Some(format) = &options.response_format {
            body["response_format"] = json!(format);
        }

        let headers = bearer_headers(config.api_key.as_deref());
        let response = self
            .transport
            .post_json(&self.image_endpoint(), headers, body, cancel)
            .await?;

        let images = response
            .body
            .get("data")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| ImageData {
                        url: e.get("url").and_then(Value::as_str).map(str::to_string),
                        b64_json: e.get("b64_json").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let revised_prompt = response
            .body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|e| e.get("revised_prompt"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ImageGenerationResponse {
            images,
            revised_prompt,
        })
    }
}

#[async_trait]
impl FileManagementCapability for OpenAIChatProvider {
    /// Uploads `data` as a base64-encoded JSON body rather than real `multipart/form-data`, since
    /// [`HttpTransport`] only carries JSON payloads. Works against the real Files endpoint (it
    /// accepts `file_data` as a fallback to the multipart `file` field) but is not the byte-exact
    /// request OpenAI's own SDKs send.
    async fn upload_file(
        &self,
        data: Vec<u8>,
        mime: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadedFile, LlmError> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;

        let body = json!({
            "purpose": "assistants",
            "file_data": format!("data:{mime};base64,{}", STANDARD.encode(&data)),
        });
        let headers = bearer_headers(None);
        let response = self
            .transport
            .post_json(&self.files_endpoint(), headers, body, cancel)
            .await?;
        let id = response
            .body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::provider("files endpoint response missing 'id'"))?
            .to_string();
        Ok(UploadedFile {
            id,
            name: response.body.get("filename").and_then(Value::as_str).map(str::to_string),
            size_bytes: response.body.get("bytes").and_then(Value::as_u64),
        })
    }

    async fn delete_file(&self, file_id: &str, cancel: &CancellationToken) -> Result<(), LlmError> {
        let headers = bearer_headers(None);
        self.transport
            .delete_json(&self.file_endpoint(file_id), headers, cancel)
            .await?;
        Ok(())
    }
}

/// Maps common aspect ratio hints to OpenAI's fixed `"WxH"` size strings, defaulting to square
/// for anything not recognized.
fn aspect_ratio_to_size(aspect_ratio: &str) -> &'static str {
    match aspect_ratio {
        "16:9" => "1792x1024",
        "9:16" => "1024x1792",
        _ => "1024x1024",
    }
}

impl ProviderCapabilities for OpenAIChatProvider {
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
    fn wire_messages_flatten_single_text_part_to_a_plain_string() {
        let messages = vec![ModelMessage::text(Role::User, "hi")];
        let wire = to_wire_messages(&messages, &no_tools_mapper()).unwrap();
        assert_eq!(wire[0]["content"], json!("hi"));
    }

    #[test]
    fn wire_messages_turn_tool_results_into_tool_role_messages() {
        let messages = vec![ModelMessage::new(
            Role::User,
            vec![ChatContentPart::tool_result_text("call_1", "search", "42")],
        )];
        let wire = to_wire_messages(&messages, &no_tools_mapper()).unwrap();
        assert_eq!(wire[0]["role"], json!("tool"));
        assert_eq!(wire[0]["tool_call_id"], json!("call_1"));
        assert_eq!(wire[0]["content"], json!("42"));
    }

    #[test]
    fn wire_messages_attach_tool_calls_to_assistant_message() {
        let messages = vec![ModelMessage::new(
            Role::Assistant,
            vec![ChatContentPart::tool_call("call_1", "search", "{}")],
        )];
        let wire = to_wire_messages(&messages, &no_tools_mapper()).unwrap();
        assert_eq!(wire[0]["tool_calls"][0]["id"], json!("call_1"));
    }

    #[test]
    fn split_inline_think_block_separates_reasoning_from_visible_text() {
        let (reasoning, visible) = split_inline_think_block("<think>plan the search</think>42");
        assert_eq!(reasoning.as_deref(), Some("plan the search"));
        assert_eq!(visible, "42");
    }

    #[test]
    fn split_inline_think_block_passes_through_content_without_a_think_block() {
        let (reasoning, visible) = split_inline_think_block("42");
        assert_eq!(reasoning, None);
        assert_eq!(visible, "42");
    }

    #[test]
    fn finish_reason_parses_known_values() {
        assert_eq!(parse_finish_reason("stop"), FinishReason::Stop);
        assert_eq!(parse_finish_reason("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(
            parse_finish_reason("weird"),
            FinishReason::Other("weird".to_string())
        );
    }
}
