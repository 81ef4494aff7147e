//! High-level convenience functions built on the capability traits: one-shot text generation,
//! streaming text, schema-validated structured output, and an agentic tool-calling loop.
//!
//! These mirror the teacher's instinct for small free functions over the client (its
//! `send_and_track`/`send_with_native_tools` helpers) rather than a larger orchestration type —
//! generalized from "works against one concrete client" to "works against any
//! [`ChatCapability`]/[`ChatStreamPartsCapability`] implementor".

use std::future::Future;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{ChatCapability, ChatStreamPartsCapability};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::{ChatContentPart, ModelMessage, Role, ToolResultPayload};
use crate::llm::stream::{ChatResponse, FinishReason, PartStream, StreamPart};
use crate::llm::tool::{ToolCall, ToolResult};

/// Send `messages` and return the complete response. A fresh, never-cancelled token is used;
/// call [`ChatCapability::chat`] directly when the caller needs to cancel mid-flight.
pub async fn generate_text<P>(
    provider: &P,
    config: &LLMConfig,
    messages: impl Into<Vec<ModelMessage>>,
) -> Result<ChatResponse, LlmError>
where
    P: ChatCapability + ?Sized,
{
    let messages = messages.into();
    provider.chat(&messages, config, &CancellationToken::new()).await
}

/// Send `messages` and return a stream of just the text deltas, discarding tool-call/usage/finish
/// parts. Use [`ChatStreamPartsCapability::chat_stream`] directly when those are needed too.
pub async fn stream_text<P>(
    provider: &P,
    config: &LLMConfig,
    messages: impl Into<Vec<ModelMessage>>,
) -> Result<impl Stream<Item = Result<String, LlmError>>, LlmError>
where
    P: ChatStreamPartsCapability + ?Sized,
{
    let messages = messages.into();
    let parts = provider
        .chat_stream(&messages, config, &CancellationToken::new())
        .await?;
    Ok(parts.filter_map(|part| async move {
        match part {
            Ok(StreamPart::TextDelta(text)) => Some(Ok(text)),
            Ok(StreamPart::Error(err)) => Some(Err(err)),
            Err(err) => Some(Err(err)),
            Ok(_) => None,
        }
    }))
}

/// Try, in order: parsing the whole trimmed text as JSON; parsing the body of the first fenced
/// ```` ``` ```` code block; parsing the first balanced-brace `{...}` substring. Returns the first
/// strategy that parses as valid JSON at all — schema validation happens separately in
/// [`generate_object`], per the distinct `ResponseFormat`/`StructuredOutput` error variants.
fn extract_json(text: &str) -> Result<Value, LlmError> {
    let candidates = [
        text.trim().to_string(),
        extract_fenced_block(text).unwrap_or_default(),
        extract_first_balanced_object(text).unwrap_or_default(),
    ];

    let mut last_error = None;
    for candidate in candidates.iter().filter(|c| !c.is_empty()) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    let message = last_error.map(|e| e.to_string()).unwrap_or_else(|| "no JSON found in model output".to_string());
    log::warn!("llm_core::helpers structured output extraction failed: {message}");
    Err(LlmError::ResponseFormat {
        message,
        raw_text: text.to_string(),
    })
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim().to_string())
}

fn extract_first_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Check `value`'s `"type"` keyword (`"object"`, `"array"`, `"string"`, `"number"`, `"integer"`,
/// `"boolean"`, `"null"`), descending into `"properties"`/`"required"` for objects and `"items"`
/// for arrays. Not a full JSON Schema implementation — just the subset named in the crate's
/// structured-output contract.
fn validate_schema(value: &Value, schema: &Value) -> Result<(), String> {
    let Some(expected_type) = schema.get("type").and_then(Value::as_str) else {
        return Ok(());
    };

    let matches_type = match expected_type {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    };
    if !matches_type {
        return Err(format!("expected type \"{expected_type}\", got {value}"));
    }

    if expected_type == "object" {
        let object = value.as_object().expect("checked above");
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required {
                let Some(key) = key.as_str() else { continue };
                if !object.contains_key(key) {
                    return Err(format!("missing required field \"{key}\""));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, sub_schema) in properties {
                if let Some(sub_value) = object.get(key) {
                    validate_schema(sub_value, sub_schema)
                        .map_err(|e| format!("field \"{key}\": {e}"))?;
                }
            }
        }
    }

    if expected_type == "array" {
        if let Some(item_schema) = schema.get("items") {
            for (index, item) in value.as_array().expect("checked above").iter().enumerate() {
                validate_schema(item, item_schema).map_err(|e| format!("item {index}: {e}"))?;
            }
        }
    }

    Ok(())
}

/// Send `messages`, requesting structured output, and parse+validate the response text against
/// `schema`.
///
/// Parsing tries, in order: a direct JSON parse, extraction from the first fenced code block, and
/// extraction of the first balanced `{...}` substring — returning [`LlmError::ResponseFormat`] if
/// none of the three produce valid JSON. The parsed value is then checked against `schema` (type,
/// `required`, nested `properties`/`items`), returning [`LlmError::StructuredOutput`] on mismatch.
pub async fn generate_object<P>(
    provider: &P,
    config: &LLMConfig,
    messages: impl Into<Vec<ModelMessage>>,
    schema: &Value,
) -> Result<Value, LlmError>
where
    P: ChatCapability + ?Sized,
{
    let response = generate_text(provider, config, messages).await?;
    let text = response.text.ok_or_else(|| LlmError::ResponseFormat {
        message: "response had no text content to parse".to_string(),
        raw_text: String::new(),
    })?;
    let value = extract_json(&text)?;
    validate_schema(&value, schema).map_err(|message| {
        log::warn!("llm_core::helpers structured output failed schema validation: {message}");
        LlmError::StructuredOutput {
            message,
            schema: schema.clone(),
            actual: value.clone(),
        }
    })?;
    Ok(value)
}

/// Build the assistant turn (tool call parts) and the paired tool-result turn for one round of
/// `tool_calls`, running `execute_tool` on each.
async fn run_tool_calls<F, Fut>(
    tool_calls: &[ToolCall],
    execute_tool: &mut F,
) -> (ModelMessage, ModelMessage)
where
    F: FnMut(ToolCall) -> Fut,
    Fut: Future<Output = ToolResult>,
{
    let assistant_parts = tool_calls
        .iter()
        .map(|call| ChatContentPart::tool_call(&call.id, &call.name, &call.arguments_json))
        .collect();

    let mut result_parts = Vec::with_capacity(tool_calls.len());
    for call in tool_calls {
        let result = execute_tool(call.clone()).await;
        result_parts.push(if result.success {
            ChatContentPart::tool_result_text(result.call_id, &call.name, result.output.unwrap_or_default())
        } else {
            ChatContentPart::ToolResult {
                call_id: result.call_id,
                tool_name: call.name.clone(),
                payload: ToolResultPayload::Text {
                    text: result.error.unwrap_or_default(),
                },
                is_error: true,
            }
        });
    }

    (
        ModelMessage::new(Role::Assistant, assistant_parts),
        ModelMessage::new(Role::User, result_parts),
    )
}

/// Drive a non-streaming tool-calling loop: call the provider, and whenever it stops with
/// [`FinishReason::ToolCalls`], run `execute_tool` on each call, append the results, and call
/// again — up to `max_iterations` round-trips. Returns the first response that doesn't request
/// further tool calls (or the last one, once `max_iterations` is exhausted).
pub async fn run_tool_loop<P, F, Fut>(
    provider: &P,
    config: &LLMConfig,
    mut messages: Vec<ModelMessage>,
    mut execute_tool: F,
    max_iterations: u32,
    cancel: &CancellationToken,
) -> Result<ChatResponse, LlmError>
where
    P: ChatCapability + ?Sized,
    F: FnMut(ToolCall) -> Fut,
    Fut: Future<Output = ToolResult>,
{
    let mut iterations = 0;
    loop {
        let response = provider.chat(&messages, config, cancel).await?;

        let should_continue =
            response.finish_reason == Some(FinishReason::ToolCalls) && !response.tool_calls.is_empty();
        if !should_continue || iterations >= max_iterations {
            return Ok(response);
        }

        let (assistant_turn, result_turn) = run_tool_calls(&response.tool_calls, &mut execute_tool).await;
        messages.push(assistant_turn);
        messages.push(result_turn);
        iterations += 1;
    }
}

enum LoopPhase {
    NeedStream,
    Draining {
        stream: PartStream,
        collected_calls: Vec<ToolCall>,
        finished_with_tool_calls: bool,
    },
    Done,
}

/// Streaming agentic tool loop: stream the provider's response, and whenever it finishes with
/// [`FinishReason::ToolCalls`], run `execute_tool` on each completed [`StreamPart::ToolCallDone`],
/// append an assistant turn (the tool calls) and a tool-result turn, and stream again — until a
/// round produces no tool calls or `max_iterations` round-trips have run. Every part from every
/// round (text, tool call events, usage, finish reasons) is forwarded to the caller in order; nothing
/// is buffered beyond one round's tool calls.
pub fn stream_tool_loop_parts<P, F, Fut>(
    provider: Arc<P>,
    config: LLMConfig,
    messages: Vec<ModelMessage>,
    execute_tool: F,
    max_iterations: u32,
    cancel: CancellationToken,
) -> PartStream
where
    P: ChatStreamPartsCapability + Send + Sync + 'static,
    F: FnMut(ToolCall) -> Fut + Send + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    struct State<P, F> {
        provider: Arc<P>,
        config: LLMConfig,
        cancel: CancellationToken,
        messages: Vec<ModelMessage>,
        execute_tool: F,
        max_iterations: u32,
        iteration: u32,
        phase: LoopPhase,
    }

    let state = State {
        provider,
        config,
        cancel,
        messages,
        execute_tool,
        max_iterations,
        iteration: 0,
        phase: LoopPhase::NeedStream,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            // Take `phase` by value so matching it never holds a borrow of `state` across the
            // `return`/`await` points below — `state` itself must stay movable throughout.
            let phase = std::mem::replace(&mut state.phase, LoopPhase::Done);
            match phase {
                LoopPhase::Done => return None,
                LoopPhase::NeedStream => {
                    if state.iteration > state.max_iterations {
                        state.phase = LoopPhase::Done;
                        continue;
                    }
                    match state
                        .provider
                        .chat_stream(&state.messages, &state.config, &state.cancel)
                        .await
                    {
                        Ok(stream) => {
                            state.phase = LoopPhase::Draining {
                                stream,
                                collected_calls: Vec::new(),
                                finished_with_tool_calls: false,
                            };
                        }
                        Err(err) => return Some((Err(err), state)),
                    }
                }
                LoopPhase::Draining {
                    mut stream,
                    mut collected_calls,
                    mut finished_with_tool_calls,
                } => match stream.next().await {
                    Some(Ok(StreamPart::ToolCallDone(call))) => {
                        collected_calls.push(call.clone());
                        state.phase = LoopPhase::Draining {
                            stream,
                            collected_calls,
                            finished_with_tool_calls,
                        };
                        return Some((Ok(StreamPart::ToolCallDone(call)), state));
                    }
                    Some(Ok(StreamPart::FinishReason(reason))) => {
                        finished_with_tool_calls = reason == FinishReason::ToolCalls;
                        state.phase = LoopPhase::Draining {
                            stream,
                            collected_calls,
                            finished_with_tool_calls,
                        };
                        return Some((Ok(StreamPart::FinishReason(reason)), state));
                    }
                    Some(Ok(other)) => {
                        state.phase = LoopPhase::Draining {
                            stream,
                            collected_calls,
                            finished_with_tool_calls,
                        };
                        return Some((Ok(other), state));
                    }
                    Some(Err(err)) => return Some((Err(err), state)),
                    None => {
                        let ready_for_next_round = finished_with_tool_calls
                            && !collected_calls.is_empty()
                            && state.iteration < state.max_iterations;
                        if !ready_for_next_round {
                            continue;
                        }

                        let (assistant_turn, result_turn) =
                            run_tool_calls(&collected_calls, &mut state.execute_tool).await;
                        state.messages.push(assistant_turn);
                        state.messages.push(result_turn);
                        state.iteration += 1;
                        state.phase = LoopPhase::NeedStream;
                    }
                },
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_direct_json() {
        let value = extract_json(r#"{"x": 1, "y": 2}"#).unwrap();
        assert_eq!(value["x"], 1);
    }

    #[test]
    fn extracts_fenced_json_block() {
        let text = "Here you go:\n```json\n{\"x\": 3, \"y\": 4}\n```\nHope that helps!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["y"], 4);
    }

    #[test]
    fn extracts_first_balanced_object_amid_prose() {
        let text = "Sure, the point is {\"x\": 5, \"y\": 6} as requested.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["x"], 5);
    }

    #[test]
    fn errors_with_raw_text_when_nothing_parses() {
        match extract_json("no json here at all") {
            Err(LlmError::ResponseFormat { raw_text, .. }) => {
                assert_eq!(raw_text, "no json here at all");
            }
            other => panic!("expected ResponseFormat error, got {other:?}"),
        }
    }

    #[test]
    fn validate_schema_accepts_matching_object() {
        let schema = serde_json::json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}},
        });
        let value = serde_json::json!({"name": "ada", "age": 30});
        assert!(validate_schema(&value, &schema).is_ok());
    }

    #[test]
    fn validate_schema_rejects_missing_required_field() {
        let schema = serde_json::json!({"type": "object", "required": ["name"]});
        let value = serde_json::json!({"age": 30});
        assert!(validate_schema(&value, &schema).is_err());
    }

    #[test]
    fn validate_schema_rejects_wrong_nested_type() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"age": {"type": "integer"}},
        });
        let value = serde_json::json!({"age": "thirty"});
        assert!(validate_schema(&value, &schema).is_err());
    }

    #[test]
    fn validate_schema_checks_array_items() {
        let schema = serde_json::json!({"type": "array", "items": {"type": "number"}});
        let good = serde_json::json!([1, 2, 3]);
        let bad = serde_json::json!([1, "two", 3]);
        assert!(validate_schema(&good, &schema).is_ok());
        assert!(validate_schema(&bad, &schema).is_err());
    }
}
