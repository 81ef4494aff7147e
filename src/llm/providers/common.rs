//! Helpers shared across provider request builders.

use std::collections::{HashMap, HashSet, VecDeque};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;

use crate::llm::error::LlmError;
use crate::llm::stream::{JsonLinesParser, ProviderMetadata, SseEvent, SseParser, StreamPart};
use crate::llm::tool::Tool;
use crate::llm::tool_name_mapping::ToolNameMapper;
use crate::llm::transport::ByteStream;

use crate::llm::stream::PartStream;

/// Build a tool-name mapper for one request's declared tools. No provider in this crate reserves
/// extra names beyond the input set itself, so `reserved` is always empty here — a provider that
/// later needs to reserve its own built-in tool names can thread them in at the call site instead.
pub fn build_tool_mapper(tools: &[Tool]) -> ToolNameMapper {
    ToolNameMapper::build(tools.iter().map(|t| t.name.clone()), HashSet::new())
}

/// Resolve a wire tool-call name back to the caller-visible name, falling back to the wire name
/// itself if the mapper never assigned it (e.g. the provider echoed back something the caller never
/// declared as a tool).
pub fn resolve_tool_name(mapper: &ToolNameMapper, wire_name: &str) -> String {
    mapper.caller_name(wire_name).unwrap_or(wire_name).to_string()
}

/// Build the double-keyed `providerMetadata` map every response parser populates: identical
/// `payload` under both the provider's base id and its capability-qualified alias (see
/// `registry.rs`'s `register_both`, which is where these same id/alias pairs come from).
pub fn provider_metadata(base_id: &str, alias: &str, payload: serde_json::Value) -> ProviderMetadata {
    let mut map = ProviderMetadata::new();
    map.insert(base_id.to_string(), payload.clone());
    map.insert(alias.to_string(), payload);
    map
}

/// Build the standard `Content-Type: application/json` header map, adding `Authorization: Bearer
/// <key>` when `api_key` is present (absent for providers like local Ollama that need no auth).
pub fn bearer_headers(api_key: Option<&str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    if let Some(key) = api_key {
        headers.insert("Authorization".to_string(), format!("Bearer {key}"));
    }
    headers
}

/// Build the `x-api-key` header map Anthropic's Messages API expects instead of `Authorization`.
pub fn anthropic_headers(api_key: Option<&str>, version: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert("anthropic-version".to_string(), version.to_string());
    if let Some(key) = api_key {
        headers.insert("x-api-key".to_string(), key.to_string());
    }
    headers
}

/// Encode raw bytes as a `data:` URL, for providers that accept inline images only as data URLs
/// rather than raw base64 fields.
pub fn data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64_STANDARD.encode(data))
}

/// Drive an SSE [`ByteStream`] into a [`PartStream`], calling `on_event` for every
/// fully-decoded [`SseEvent`] and emitting whatever [`StreamPart`]s it returns, in order.
///
/// `on_event` typically closes over a [`crate::stream::ToolCallAccumulator`] to reassemble
/// streamed tool calls across events. The `data: [DONE]` sentinel (OpenAI-family providers) ends
/// the stream without being passed to `on_event`; providers that never send it (Anthropic,
/// Gemini) simply end when the underlying byte stream does.
pub fn sse_to_part_stream<F>(byte_stream: ByteStream, on_event: F) -> PartStream
where
    F: FnMut(SseEvent) -> Vec<Result<StreamPart, LlmError>> + Send + 'static,
{
    let state = (byte_stream, SseParser::new(), VecDeque::new(), on_event, false);
    Box::pin(futures_util::stream::unfold(
        state,
        |(mut stream, mut parser, mut pending, mut on_event, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (stream, parser, pending, on_event, finished)));
                }
                if finished {
                    return None;
                }
                match stream.next().await {
                    None => {
                        finished = true;
                    }
                    Some(Err(e)) => {
                        log::warn!("llm_core::sse_to_part_stream transport error: {e}");
                        return Some((Err(e), (stream, parser, pending, on_event, true)));
                    }
                    Some(Ok(bytes)) => {
                        for event in parser.push(&bytes) {
                            if event.is_done() {
                                finished = true;
                                continue;
                            }
                            for result in on_event(event) {
                                pending.push_back(result);
                            }
                        }
                    }
                }
            }
        },
    ))
}

/// Drive a newline-delimited-JSON [`ByteStream`] (Ollama's wire framing) into a [`PartStream`],
/// calling `on_line` for every successfully parsed line. A malformed line ends the stream with an
/// `Err` item, since a framing desync can't be recovered from line to line.
pub fn jsonl_to_part_stream<F>(byte_stream: ByteStream, on_line: F) -> PartStream
where
    F: FnMut(serde_json::Value) -> Vec<Result<StreamPart, LlmError>> + Send + 'static,
{
    let state = (byte_stream, JsonLinesParser::new(), VecDeque::new(), on_line, false);
    Box::pin(futures_util::stream::unfold(
        state,
        |(mut stream, mut parser, mut pending, mut on_line, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (stream, parser, pending, on_line, finished)));
                }
                if finished {
                    return None;
                }
                match stream.next().await {
                    None => {
                        finished = true;
                    }
                    Some(Err(e)) => {
                        log::warn!("llm_core::jsonl_to_part_stream transport error: {e}");
                        return Some((Err(e), (stream, parser, pending, on_line, true)));
                    }
                    Some(Ok(bytes)) => {
                        for line in parser.push(&bytes) {
                            match line {
                                Ok(value) => {
                                    for result in on_line(value) {
                                        pending.push_back(result);
                                    }
                                }
                                Err(e) => {
                                    log::warn!("llm_core::jsonl_to_part_stream malformed line: {e}");
                                    pending.push_back(Err(e));
                                    finished = true;
                                }
                            }
                        }
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_headers_omits_authorization_without_a_key() {
        let headers = bearer_headers(None);
        assert!(!headers.contains_key("Authorization"));
    }

    #[test]
    fn bearer_headers_sets_authorization_with_a_key() {
        let headers = bearer_headers(Some("sk-test"));
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer sk-test");
    }

    #[test]
    fn data_url_encodes_as_base64() {
        let url = data_url("image/png", b"hi");
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
