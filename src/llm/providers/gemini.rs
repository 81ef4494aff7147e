//! Google Gemini's `generateContent` / `streamGenerateContent` API.
//!
//! Gemini calls roles `"user"`/`"model"` rather than `"user"`/`"assistant"`, carries the system
//! prompt under a dedicated `systemInstruction` field (like Anthropic, unlike OpenAI), and streams
//! via SSE where each event's `data:` is a complete, repeated `GenerateContentResponse` shape
//! rather than a minimal delta — so the stream parser below treats every event as carrying the
//! full incremental parts list, not just new text.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{
    Capability, ChatCapability, ChatStreamPartsCapability, Embedding, EmbeddingCapability, ProviderCapabilities,
};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::{ChatContentPart, ModelMessage, Role, ToolResultPayload};
use crate::llm::stream::{ChatResponse, FinishReason, PartStream, StreamPart, ToolCallAccumulator, Usage};
use crate::llm::tool::{Tool, ToolChoice};
use crate::llm::tool_name_mapping::ToolNameMapper;
use crate::llm::transport::HttpTransport;

use super::common::{build_tool_mapper, provider_metadata, resolve_tool_name, sse_to_part_stream};

const CAPABILITIES: &[Capability] = &[Capability::Chat, Capability::ChatStream, Capability::Embedding];
const PROVIDER_ID: &str = "gemini";
const ALIAS: &str = "gemini.generateContent";

/// Client for Google's Gemini API.
pub struct GeminiProvider {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl GeminiProvider {
    /// Construct a provider talking to `base_url` (e.g.
    /// `"https://generativelanguage.googleapis.com/v1beta"`) through `transport`.
    pub fn new(transport: impl HttpTransport + 'static, base_url: String) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url,
        }
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        if stream {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    fn embed_endpoint(&self, model: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/models/{model}:embedContent")
    }

    fn build_body(&self, messages: &[ModelMessage], config: &LLMConfig, mapper: &ToolNameMapper) -> Result<Value, LlmError> {
        let (message_system, turns) = split_system_prompt(messages);
        let mut body = json!({"contents": to_contents(&turns, mapper)?});

        let system = match (&config.system_prompt, message_system) {
            (Some(config_system), Some(message_system)) => Some(format!("{config_system}\n\n{message_system}")),
            (Some(config_system), None) => Some(config_system.clone()),
            (None, message_system) => message_system,
        };
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = config.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = config.top_p {
            generation_config.insert("topP".to_string(), json!(top_p));
        }
        if let Some(top_k) = config.top_k {
            generation_config.insert("topK".to_string(), json!(top_k));
        }
        if let Some(max_tokens) = config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !config.stop_sequences.is_empty() {
            generation_config.insert("stopSequences".to_string(), json!(config.stop_sequences));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        let mut tools_wire = Vec::new();
        if !config.tools.is_empty() {
            tools_wire.push(json!({
                "functionDeclarations": config.tools.iter().map(|tool| tool_to_wire(tool, mapper)).collect::<Vec<_>>(),
            }));
        }
        for provider_tool in &config.provider_tools {
            tools_wire.push(provider_tool_to_wire(provider_tool));
        }
        if !tools_wire.is_empty() {
            body["tools"] = json!(tools_wire);
        }
        if let Some(choice) = &config.tool_choice {
            // Gemini has no parallel-function-call toggle; disable_parallel is accepted but
            // dropped here rather than rejected, matching this crate's "ignore unsupported knobs"
            // convention for LLMConfig fields.
            body["toolConfig"] = json!({"functionCallingConfig": tool_choice_to_wire(choice, mapper)});
        }

        Ok(body)
    }
}

/// Gemini's native tools (`code_execution`, `url_context`, `file_search`, `google_search`) are
/// each their own entry in the `tools` array, camelCased and taking `options` as their inner
/// config object (empty object when the tool takes none).
fn provider_tool_to_wire(tool: &crate::llm::tool::ProviderTool) -> Value {
    let key = match tool.name.as_str() {
        "code_execution" => "codeExecution",
        "url_context" => "urlContext",
        "file_search" => "fileSearch",
        "google_search" => "googleSearch",
        other => other,
    };
    let options = if tool.options.is_null() {
        json!({})
    } else {
        tool.options.clone()
    };
    json!({key: options})
}

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
        "parameters": tool.parameters,
    })
}

fn tool_choice_to_wire(choice: &ToolChoice, mapper: &ToolNameMapper) -> Value {
    match choice {
        ToolChoice::Auto { .. } => json!({"mode": "AUTO"}),
        ToolChoice::None => json!({"mode": "NONE"}),
        ToolChoice::Required { .. } => json!({"mode": "ANY"}),
        ToolChoice::Specific { name, .. } => {
            let wire_name = mapper.wire_name(name).unwrap_or(name);
            json!({"mode": "ANY", "allowedFunctionNames": [wire_name]})
        }
    }
}

fn to_contents(messages: &[ModelMessage], mapper: &ToolNameMapper) -> Result<Vec<Value>, LlmError> {
    let mut contents = Vec::new();
    for m in messages {
        let role_str = match m.role {
            Role::User => "user",
            Role::Assistant => "model",
            Role::System => continue,
        };

        let mut parts = Vec::new();
        for part in &m.parts {
            match part {
                ChatContentPart::Text { text } => parts.push(json!({"text": text})),
                ChatContentPart::Image { mime, data, .. } => parts.push(json!({
                    "inlineData": {"mimeType": mime, "data": super::common::data_url(mime, data).split(',').nth(1)}
                })),
                ChatContentPart::File { mime, data, .. } => parts.push(json!({
                    "inlineData": {"mimeType": mime, "data": super::common::data_url(mime, data).split(',').nth(1)}
                })),
                ChatContentPart::ToolCall {
                    tool_name,
                    arguments_json,
                    ..
                } => {
                    let args: Value = serde_json::from_str(arguments_json).unwrap_or(Value::Null);
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    parts.push(json!({"functionCall": {"name": wire_name, "args": args}}));
                }
                ChatContentPart::ToolResult {
                    tool_name, payload, ..
                } => {
                    let response = match payload {
                        ToolResultPayload::Structured { value } => value.clone(),
                        ToolResultPayload::Text { text } => json!({"result": text}),
                        ToolResultPayload::Bytes { mime, .. } => {
                            json!({"result": format!("<binary {mime} tool result>")})
                        }
                    };
                    let wire_name = mapper.wire_name(tool_name).unwrap_or(tool_name);
                    parts.push(json!({"functionResponse": {"name": wire_name, "response": response}}));
                }
                ChatContentPart::Reasoning { .. } | ChatContentPart::ImageUrl { .. } | ChatContentPart::UrlFile { .. } => {}
            }
        }

        if !parts.is_empty() {
            contents.push(json!({"role": role_str, "parts": parts}));
        }
    }
    Ok(contents)
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

fn parse_response(body: &Value, mapper: &ToolNameMapper) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    if let Some(parts) = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                text_parts.push(text.to_string());
            }
            if let Some(call) = part.get("functionCall") {
                if let Some(wire_name) = call.get("name").and_then(Value::as_str) {
                    let args = call.get("args").cloned().unwrap_or(Value::Null);
                    tool_calls.push(crate::llm::tool::ToolCall {
                        id: format!("gemini_call_{}", uuid::Uuid::new_v4()),
                        name: resolve_tool_name(mapper, wire_name),
                        arguments_json: args.to_string(),
                    });
                }
            }
        }
    }

    let finish_reason = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        .map(|reason| {
            if !tool_calls.is_empty() {
                FinishReason::ToolCalls
            } else {
                parse_finish_reason(reason)
            }
        });

    let usage = body.get("usageMetadata").and_then(|u| {
        Some(Usage::new(
            u.get("promptTokenCount")?.as_u64()? as u32,
            u.get("candidatesTokenCount")?.as_u64()? as u32,
        ))
    });

    ChatResponse {
        text: (!text_parts.is_empty()).then(|| text_parts.join("")),
        reasoning: None,
        tool_calls,
        usage,
        finish_reason,
        provider_metadata: provider_metadata(PROVIDER_ID, ALIAS, body.clone()),
    }
}

#[async_trait]
impl ChatCapability for GeminiProvider {
    async fn chat(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, &mapper)?;
        let headers = gemini_headers(config.api_key.as_deref());
        let response = self
            .transport
            .post_json(&self.endpoint(&config.model, false), headers, body, cancel)
            .await?;
        Ok(parse_response(&response.body, &mapper))
    }
}

#[async_trait]
impl ChatStreamPartsCapability for GeminiProvider {
    async fn chat_stream(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<PartStream, LlmError> {
        let mapper = build_tool_mapper(&config.tools);
        let body = self.build_body(messages, config, &mapper)?;
        let headers = gemini_headers(config.api_key.as_deref());
        let byte_stream = self
            .transport
            .post_stream(&self.endpoint(&config.model, true), headers, body, cancel)
            .await?;

        // Gemini repeats the full parts-so-far shape per event rather than emitting minimal
        // deltas against an existing accumulator; text deltas are recovered by diffing against
        // the previously-seen length. Tool calls arrive whole (Gemini doesn't stream partial
        // function-call JSON), so no ToolCallAccumulator indexing is needed here.
        let mut seen_text_len = 0usize;
        Ok(sse_to_part_stream(byte_stream, move |event| {
            let parsed: Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("llm_core::gemini malformed stream chunk: {e}");
                    return vec![Err(LlmError::Generic {
                        message: format!("malformed Gemini stream chunk: {e}"),
                    })];
                }
            };
            let response = parse_response(&parsed, &mapper);
            let mut parts = Vec::new();

            if let Some(text) = &response.text {
                if text.len() > seen_text_len {
                    parts.push(Ok(StreamPart::TextDelta(text[seen_text_len..].to_string())));
                    seen_text_len = text.len();
                }
            }
            for call in response.tool_calls {
                parts.push(Ok(StreamPart::ToolCallDone(call)));
            }
            if let Some(usage) = response.usage {
                parts.push(Ok(StreamPart::Usage(usage)));
            }
            if let Some(reason) = response.finish_reason {
                parts.push(Ok(StreamPart::FinishReason(reason)));
            }
            parts
        }))
    }
}

#[async_trait]
impl EmbeddingCapability for GeminiProvider {
    async fn embed(
        &self,
        inputs: &[String],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, LlmError> {
        let headers = gemini_headers(config.api_key.as_deref());
        let mut embeddings = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let body = json!({"content": {"parts": [{"text": input}]}});
            let response = self
                .transport
                .post_json(&self.embed_endpoint(&config.model), headers.clone(), body, cancel)
                .await?;
            let vector = response
                .body
                .get("embedding")
                .and_then(|e| e.get("values"))
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

impl ProviderCapabilities for GeminiProvider {
    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }
}

fn gemini_headers(api_key: Option<&str>) -> std::collections::HashMap<String, String> {
    let mut headers = std::collections::HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    if let Some(key) = api_key {
        headers.insert("x-goog-api-key".to_string(), key.to_string());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_tools_mapper() -> ToolNameMapper {
        build_tool_mapper(&[])
    }

    #[test]
    fn roles_map_assistant_to_model() {
        let messages = vec![ModelMessage::text(Role::Assistant, "hi")];
        let contents = to_contents(&messages, &no_tools_mapper()).unwrap();
        assert_eq!(contents[0]["role"], json!("model"));
    }

    #[test]
    fn parse_response_marks_finish_reason_as_tool_calls_when_function_call_present() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"functionCall": {"name": "search", "args": {"q": "rust"}}}]},
                "finishReason": "STOP"
            }]
        });
        let parsed = parse_response(&body, &no_tools_mapper());
        assert_eq!(parsed.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(parsed.tool_calls[0].name, "search");
    }

    #[test]
    fn parse_response_double_keys_provider_metadata() {
        let body = json!({"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]});
        let parsed = parse_response(&body, &no_tools_mapper());
        assert_eq!(parsed.provider_metadata["gemini"], parsed.provider_metadata["gemini.generateContent"]);
    }

    #[test]
    fn provider_tool_to_wire_camel_cases_known_native_tool_names() {
        let tool = crate::llm::tool::ProviderTool::new("code_execution");
        assert_eq!(provider_tool_to_wire(&tool), json!({"codeExecution": {}}));
    }

    #[test]
    fn safety_finish_reason_maps_to_content_filter() {
        assert_eq!(parse_finish_reason("SAFETY"), FinishReason::ContentFilter);
    }
}
