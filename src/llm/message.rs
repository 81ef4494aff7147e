//! The prompt IR: [`ModelMessage`] / [`ChatContentPart`], plus the legacy [`ChatMessage`] bridge.
//!
//! Every request builder in [`crate::providers`] consumes `&[ModelMessage]` — it never sees a
//! vendor wire shape until it builds one. Parts carry their own `provider_options` bag so a
//! protocol-specific hint (Anthropic `cache_control`, OpenAI image `detail`) can ride along
//! without the IR needing to know about every vendor extension that exists.
//!
//! # Example
//!
//! ```rust
//! use llm_core::message::{ChatContentPart, ModelMessage, Role};
//!
//! let prompt = vec![
//!     ModelMessage::new(Role::System, vec![ChatContentPart::text("Be concise.")]),
//!     ModelMessage::new(Role::User, vec![ChatContentPart::text("What is 2+2?")]),
//! ];
//! assert_eq!(prompt.len(), 2);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The role a [`ModelMessage`] was authored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Primes or constrains assistant behavior.
    System,
    /// A human end-user turn.
    User,
    /// A model-authored turn (including tool calls the model requested).
    Assistant,
}

/// Per-part or per-message protocol-specific hints, e.g. `{"anthropic": {"cacheControl": {"ttl":
/// "1h"}}}`. Keys are provider ids; values are opaque to the core — only the provider owning that
/// key reads them.
pub type ProviderOptions = HashMap<String, HashMap<String, serde_json::Value>>;

/// Read a single option value nested under `provider_id.key` in a [`ProviderOptions`] bag.
pub fn provider_option<'a>(
    options: &'a ProviderOptions,
    provider_id: &str,
    key: &str,
) -> Option<&'a serde_json::Value> {
    options.get(provider_id)?.get(key)
}

/// How a [`ToolResultPart`]'s payload was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolResultPayload {
    /// Plain text result, the common case.
    Text {
        /// The result text.
        text: String,
    },
    /// Raw bytes (e.g. a tool that returns an image).
    Bytes {
        /// MIME type of the payload.
        mime: String,
        /// The raw bytes.
        data: Vec<u8>,
    },
    /// A structured JSON result.
    Structured {
        /// The JSON value.
        value: serde_json::Value,
    },
}

/// One typed fragment of a [`ModelMessage`].
///
/// This is the IR's atom: a prompt is an ordered sequence of `(Role, Vec<ChatContentPart>)`, and
/// every provider's request builder folds that sequence into its own wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Model-emitted reasoning/thinking text, distinct from the final answer.
    Reasoning {
        /// The reasoning text.
        text: String,
        /// Opaque provider-issued signature (e.g. Anthropic's encrypted thinking signature,
        /// OpenAI Responses' encrypted reasoning signature) that must be echoed back untouched
        /// when continuing the conversation.
        signature: Option<String>,
    },
    /// An inline image.
    Image {
        /// MIME type, e.g. `"image/png"`.
        mime: String,
        /// Raw image bytes.
        data: Vec<u8>,
        /// Optional caption/alt text.
        caption: Option<String>,
        /// Per-part provider hints (e.g. OpenAI image `detail`).
        provider_options: ProviderOptions,
    },
    /// A reference to an image by URL rather than inline bytes.
    ImageUrl {
        /// The image URL.
        url: String,
        /// Vendor-specific detail hint (e.g. OpenAI's `"low"|"high"|"auto"`).
        detail: Option<String>,
    },
    /// An inline file. PDFs carry document semantics on providers that distinguish them
    /// (Anthropic maps PDF file parts to `{"type":"document",...}`; other MIME types are
    /// rejected by that provider).
    File {
        /// MIME type, e.g. `"application/pdf"`.
        mime: String,
        /// Raw file bytes.
        data: Vec<u8>,
        /// Optional caption/description.
        caption: Option<String>,
    },
    /// A reference to a file by URL rather than inline bytes.
    UrlFile {
        /// The file URL.
        url: String,
        /// MIME type, when known.
        mime: Option<String>,
    },
    /// A function call the assistant requested.
    ToolCall {
        /// Provider-assigned call id, echoed back in the matching [`ChatContentPart::ToolResult`].
        id: String,
        /// The tool name as declared in the request (pre tool-name-mapping rewrite, i.e. the
        /// caller-visible name).
        tool_name: String,
        /// Arguments as a raw JSON string, exactly as the provider emitted them.
        arguments_json: String,
        /// Per-part provider hints.
        provider_options: ProviderOptions,
    },
    /// The result of executing a previously requested tool call.
    ToolResult {
        /// Must match an earlier `ToolCall.id` from a prior assistant turn.
        call_id: String,
        /// The tool name the result corresponds to.
        tool_name: String,
        /// The result payload.
        payload: ToolResultPayload,
        /// `true` if the tool execution itself failed (distinct from the LLM request failing).
        is_error: bool,
    },
}

impl ChatContentPart {
    /// Construct a [`ChatContentPart::Text`].
    pub fn text(text: impl Into<String>) -> Self {
        ChatContentPart::Text { text: text.into() }
    }

    /// Construct a [`ChatContentPart::Reasoning`] with no signature.
    pub fn reasoning(text: impl Into<String>) -> Self {
        ChatContentPart::Reasoning {
            text: text.into(),
            signature: None,
        }
    }

    /// Construct a [`ChatContentPart::Image`] with empty provider options.
    pub fn image(mime: impl Into<String>, data: Vec<u8>) -> Self {
        ChatContentPart::Image {
            mime: mime.into(),
            data,
            caption: None,
            provider_options: ProviderOptions::new(),
        }
    }

    /// Construct a [`ChatContentPart::ImageUrl`] with no detail hint.
    pub fn image_url(url: impl Into<String>) -> Self {
        ChatContentPart::ImageUrl {
            url: url.into(),
            detail: None,
        }
    }

    /// Construct a [`ChatContentPart::ToolCall`] with empty provider options.
    pub fn tool_call(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments_json: impl Into<String>,
    ) -> Self {
        ChatContentPart::ToolCall {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments_json: arguments_json.into(),
            provider_options: ProviderOptions::new(),
        }
    }

    /// Construct a successful [`ChatContentPart::ToolResult`] carrying text.
    pub fn tool_result_text(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        ChatContentPart::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            payload: ToolResultPayload::Text { text: text.into() },
            is_error: false,
        }
    }

    /// `true` if this part is a [`ChatContentPart::Text`] or [`ChatContentPart::Reasoning`] and
    /// its text is empty.
    pub fn is_empty_text(&self) -> bool {
        match self {
            ChatContentPart::Text { text } => text.is_empty(),
            ChatContentPart::Reasoning { text, .. } => text.is_empty(),
            _ => false,
        }
    }

    /// The plain-text content of this part, if it carries one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatContentPart::Text { text } => Some(text),
            ChatContentPart::Reasoning { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// A single turn in the prompt IR: a [`Role`] plus an ordered sequence of [`ChatContentPart`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Who authored this turn.
    pub role: Role,
    /// The ordered content parts making up this turn.
    pub parts: Vec<ChatContentPart>,
    /// Per-message provider hints (e.g. Anthropic `cache_control` on the system prompt).
    pub provider_options: ProviderOptions,
}

impl ModelMessage {
    /// Construct a message with no provider options.
    pub fn new(role: Role, parts: Vec<ChatContentPart>) -> Self {
        Self {
            role,
            parts,
            provider_options: ProviderOptions::new(),
        }
    }

    /// Convenience constructor for a single-text-part message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ChatContentPart::text(text)])
    }

    /// Concatenate the text of every [`ChatContentPart::Text`]/[`ChatContentPart::Reasoning`]
    /// part in this message, ignoring non-text parts.
    pub fn concat_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ChatContentPart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// `true` if every part in this message is a tool call or tool result (used by
    /// [`ToolCallPruneMode`] to decide whether a whole turn becomes dangling after pruning).
    pub fn is_tool_only(&self) -> bool {
        !self.parts.is_empty()
            && self.parts.iter().all(|p| {
                matches!(
                    p,
                    ChatContentPart::ToolCall { .. } | ChatContentPart::ToolResult { .. }
                )
            })
    }
}

/// Discriminator for the legacy flattened [`ChatMessage`] bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageType {
    /// Corresponds to [`Role::System`].
    System,
    /// Corresponds to [`Role::User`].
    User,
    /// Corresponds to [`Role::Assistant`].
    Assistant,
    /// Corresponds to a [`ChatContentPart::Reasoning`] part.
    Reasoning,
    /// Corresponds to a [`ChatContentPart::ToolCall`] part.
    ToolCall,
    /// Corresponds to a [`ChatContentPart::ToolResult`] part.
    ToolResult,
}

/// A flattened message with a single string body and a type discriminator.
///
/// This is a bridge for call sites still built around the flat-message shape the teacher's
/// `client_wrapper::Message` used. [`ChatMessage::from_model_messages`] /
/// [`ChatMessage::to_model_messages`] convert losslessly for text-only prompts (see the
/// round-trip property in the crate's design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// What kind of turn/part this flattened message represents.
    pub message_type: ChatMessageType,
    /// The flattened string content.
    pub content: String,
}

impl ChatMessage {
    /// Flatten a prompt into one legacy message per part. Lossless for prompts containing only
    /// text/reasoning parts; non-text parts (images, tool calls with structured args, …) are
    /// flattened to their textual summary and may not round-trip exactly.
    pub fn from_model_messages(messages: &[ModelMessage]) -> Vec<ChatMessage> {
        let mut flattened = Vec::new();
        for message in messages {
            if message.parts.is_empty() {
                flattened.push(ChatMessage {
                    message_type: role_to_message_type(message.role),
                    content: String::new(),
                });
                continue;
            }
            for part in &message.parts {
                match part {
                    ChatContentPart::Text { text } => flattened.push(ChatMessage {
                        message_type: role_to_message_type(message.role),
                        content: text.clone(),
                    }),
                    ChatContentPart::Reasoning { text, .. } => flattened.push(ChatMessage {
                        message_type: ChatMessageType::Reasoning,
                        content: text.clone(),
                    }),
                    ChatContentPart::ToolCall {
                        tool_name,
                        arguments_json,
                        ..
                    } => flattened.push(ChatMessage {
                        message_type: ChatMessageType::ToolCall,
                        content: format!("{tool_name}({arguments_json})"),
                    }),
                    ChatContentPart::ToolResult {
                        payload: ToolResultPayload::Text { text },
                        ..
                    } => flattened.push(ChatMessage {
                        message_type: ChatMessageType::ToolResult,
                        content: text.clone(),
                    }),
                    other => flattened.push(ChatMessage {
                        message_type: role_to_message_type(message.role),
                        content: format!("{other:?}"),
                    }),
                }
            }
        }
        flattened
    }

    /// Rebuild a prompt from legacy flattened messages, one [`ModelMessage`] per entry.
    pub fn to_model_messages(messages: &[ChatMessage]) -> Vec<ModelMessage> {
        messages
            .iter()
            .map(|m| match m.message_type {
                ChatMessageType::System => {
                    ModelMessage::text(Role::System, m.content.clone())
                }
                ChatMessageType::User => ModelMessage::text(Role::User, m.content.clone()),
                ChatMessageType::Assistant => {
                    ModelMessage::text(Role::Assistant, m.content.clone())
                }
                ChatMessageType::Reasoning => ModelMessage::new(
                    Role::Assistant,
                    vec![ChatContentPart::reasoning(m.content.clone())],
                ),
                ChatMessageType::ToolCall => ModelMessage::new(
                    Role::Assistant,
                    vec![ChatContentPart::text(m.content.clone())],
                ),
                ChatMessageType::ToolResult => ModelMessage::new(
                    Role::User,
                    vec![ChatContentPart::text(m.content.clone())],
                ),
            })
            .collect()
    }
}

fn role_to_message_type(role: Role) -> ChatMessageType {
    match role {
        Role::System => ChatMessageType::System,
        Role::User => ChatMessageType::User,
        Role::Assistant => ChatMessageType::Assistant,
    }
}

/// How [`prune_reasoning`] should treat [`ChatContentPart::Reasoning`] parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningPruneMode {
    /// Leave reasoning parts in place.
    Keep,
    /// Remove all reasoning parts.
    Strip,
}

/// How [`prune_dangling_tool_calls`] should treat tool calls/results that no longer pair up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallPruneMode {
    /// Leave tool calls/results in place even if dangling.
    Keep,
    /// Remove tool call parts with no matching result, and result parts with no matching call.
    Strip,
}

/// Remove [`ChatContentPart::Reasoning`] parts per `mode`.
///
/// Used before replaying history to a provider that forbids (or simply does not want billed for)
/// reasoning content from a different vendor.
pub fn prune_reasoning(messages: &[ModelMessage], mode: ReasoningPruneMode) -> Vec<ModelMessage> {
    if mode == ReasoningPruneMode::Keep {
        return messages.to_vec();
    }
    messages
        .iter()
        .map(|message| {
            let parts = message
                .parts
                .iter()
                .filter(|p| !matches!(p, ChatContentPart::Reasoning { .. }))
                .cloned()
                .collect();
            ModelMessage {
                role: message.role,
                parts,
                provider_options: message.provider_options.clone(),
            }
        })
        .collect()
}

/// Remove dangling tool calls/results per `mode`.
///
/// A [`ChatContentPart::ToolCall`] is dangling if no later message contains a
/// [`ChatContentPart::ToolResult`] with a matching `call_id`; a [`ChatContentPart::ToolResult`] is
/// dangling if no earlier message contains a matching `ToolCall.id`.
pub fn prune_dangling_tool_calls(
    messages: &[ModelMessage],
    mode: ToolCallPruneMode,
) -> Vec<ModelMessage> {
    if mode == ToolCallPruneMode::Keep {
        return messages.to_vec();
    }

    let call_ids: std::collections::HashSet<&str> = messages
        .iter()
        .flat_map(|m| &m.parts)
        .filter_map(|p| match p {
            ChatContentPart::ToolCall { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    let result_ids: std::collections::HashSet<&str> = messages
        .iter()
        .flat_map(|m| &m.parts)
        .filter_map(|p| match p {
            ChatContentPart::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();

    messages
        .iter()
        .map(|message| {
            let parts: Vec<ChatContentPart> = message
                .parts
                .iter()
                .filter(|p| match p {
                    ChatContentPart::ToolCall { id, .. } => result_ids.contains(id.as_str()),
                    ChatContentPart::ToolResult { call_id, .. } => {
                        call_ids.contains(call_id.as_str())
                    }
                    _ => true,
                })
                .cloned()
                .collect();
            ModelMessage {
                role: message.role,
                parts,
                provider_options: message.provider_options.clone(),
            }
        })
        .filter(|m| !m.parts.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_round_trips_through_chat_messages() {
        let prompt = vec![
            ModelMessage::text(Role::System, "be nice"),
            ModelMessage::text(Role::User, "hi"),
        ];
        let flattened = ChatMessage::from_model_messages(&prompt);
        let rebuilt = ChatMessage::to_model_messages(&flattened);
        assert_eq!(prompt, rebuilt);
    }

    #[test]
    fn prune_reasoning_strips_only_reasoning_parts() {
        let messages = vec![ModelMessage::new(
            Role::Assistant,
            vec![
                ChatContentPart::text("answer"),
                ChatContentPart::reasoning("scratch work"),
            ],
        )];
        let pruned = prune_reasoning(&messages, ReasoningPruneMode::Strip);
        assert_eq!(pruned[0].parts, vec![ChatContentPart::text("answer")]);
    }

    #[test]
    fn prune_dangling_tool_calls_removes_unmatched_call() {
        let messages = vec![ModelMessage::new(
            Role::Assistant,
            vec![ChatContentPart::tool_call("call_1", "search", "{}")],
        )];
        let pruned = prune_dangling_tool_calls(&messages, ToolCallPruneMode::Strip);
        assert!(pruned.is_empty());
    }

    #[test]
    fn prune_dangling_tool_calls_keeps_matched_pair() {
        let messages = vec![
            ModelMessage::new(
                Role::Assistant,
                vec![ChatContentPart::tool_call("call_1", "search", "{}")],
            ),
            ModelMessage::new(
                Role::User,
                vec![ChatContentPart::tool_result_text("call_1", "search", "ok")],
            ),
        ];
        let pruned = prune_dangling_tool_calls(&messages, ToolCallPruneMode::Strip);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn is_tool_only_detects_pure_tool_turns() {
        let tool_turn = ModelMessage::new(
            Role::Assistant,
            vec![ChatContentPart::tool_call("call_1", "search", "{}")],
        );
        assert!(tool_turn.is_tool_only());
        let mixed_turn = ModelMessage::new(
            Role::Assistant,
            vec![
                ChatContentPart::text("calling a tool"),
                ChatContentPart::tool_call("call_1", "search", "{}"),
            ],
        );
        assert!(!mixed_turn.is_tool_only());
    }
}
