//! The provider-agnostic streaming vocabulary: [`StreamPart`], [`ChatResponse`], [`Usage`], and
//! the [`ToolCallAccumulator`] every streaming provider reassembles tool calls with.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::llm::error::LlmError;
use crate::llm::tool::ToolCall;

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens produced by the model.
    pub output_tokens: u32,
    /// `input_tokens + output_tokens`, tracked separately since some providers report it directly
    /// rather than leaving the caller to add the two up (and occasionally round differently).
    pub total_tokens: u32,
}

impl Usage {
    /// Construct usage from input/output counts, computing the total.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// The model reached a natural stop point.
    Stop,
    /// The response was truncated at `max_tokens`.
    Length,
    /// The model stopped to invoke one or more tools.
    ToolCalls,
    /// A content filter intervened.
    ContentFilter,
    /// Anthropic's pause-turn state: the turn paused mid-generation (e.g. for a long-running
    /// server tool) without being a terminal stop. Callers that treat every finish reason as
    /// terminal will mishandle this one; see [`FinishReason::is_terminal`].
    PauseTurn,
    /// A provider-specific reason this taxonomy doesn't name, preserved verbatim.
    Other(String),
}

impl FinishReason {
    /// `false` for [`FinishReason::PauseTurn`]; `true` for everything else. Reflects the design
    /// decision to treat `pause_turn` as non-terminal (see the crate's design notes).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FinishReason::PauseTurn)
    }
}

/// Vendor-specific metadata attached to a response, double-keyed by both the base provider id and
/// the specific capability alias that produced the response (e.g. both `"deepseek"` and
/// `"deepseek.chat"` carry an entry), so callers can match on whichever granularity they know
/// about.
pub type ProviderMetadata = HashMap<String, serde_json::Value>;

/// A complete, non-streaming (or fully-drained-streaming) chat response.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Concatenated text content, if any was produced.
    pub text: Option<String>,
    /// Concatenated reasoning/thinking content, if the model produced any and the provider
    /// surfaces it.
    pub reasoning: Option<String>,
    /// Tool calls the model requested, in emission order.
    pub tool_calls: Vec<ToolCall>,
    /// Token accounting, if the provider reported it.
    pub usage: Option<Usage>,
    /// Why generation stopped.
    pub finish_reason: Option<FinishReason>,
    /// Vendor-specific metadata.
    pub provider_metadata: ProviderMetadata,
}

/// One incremental unit of a streaming chat response.
#[derive(Debug)]
pub enum StreamPart {
    /// An incremental chunk of output text.
    TextDelta(String),
    /// An incremental chunk of reasoning/thinking text, with an optional signature attached once
    /// the provider finalizes it.
    ReasoningDelta {
        /// The reasoning text delta.
        text: String,
        /// Present once the provider has finalized the reasoning block's signature.
        signature: Option<String>,
    },
    /// A new tool call has started at `index` (OpenAI's numeric index, or Anthropic's content
    /// block index).
    ToolCallStart {
        /// Position among this turn's tool calls.
        index: u32,
        /// Provider-assigned call id.
        id: String,
        /// Tool name.
        name: String,
    },
    /// An incremental chunk of a tool call's JSON arguments, to be concatenated in order at
    /// `index`.
    ToolCallArgumentsDelta {
        /// Position among this turn's tool calls.
        index: u32,
        /// The next chunk of the arguments JSON string.
        arguments_json_delta: String,
    },
    /// A tool call has finished accumulating and is ready to execute.
    ToolCallDone(ToolCall),
    /// Token accounting became available (often only at stream end).
    Usage(Usage),
    /// The stream finished with this reason.
    FinishReason(FinishReason),
    /// The provider reported a recoverable mid-stream error (e.g. an SSE `error` event);
    /// the stream may still continue or may end immediately after.
    Error(LlmError),
}

/// The teacher's original flattened streaming chunk shape: a content delta plus an optional
/// terminal finish reason string, with no tool-call or usage awareness.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageChunk {
    /// Text content delta.
    pub content: String,
    /// Raw finish reason string, present only on the final chunk.
    pub finish_reason: Option<String>,
}

/// Adapt a legacy [`MessageChunk`] into the [`StreamPart`] vocabulary, for call sites still
/// built around the flattened shape.
pub fn legacy_chunk_to_stream_parts(chunk: MessageChunk) -> Vec<StreamPart> {
    let mut parts = Vec::new();
    if !chunk.content.is_empty() {
        parts.push(StreamPart::TextDelta(chunk.content));
    }
    if let Some(reason) = chunk.finish_reason {
        parts.push(StreamPart::FinishReason(parse_legacy_finish_reason(
            &reason,
        )));
    }
    parts
}

fn parse_legacy_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" | "end_turn" | "STOP" => FinishReason::Stop,
        "length" | "max_tokens" | "MAX_TOKENS" => FinishReason::Length,
        "tool_calls" | "tool_use" => FinishReason::ToolCalls,
        "content_filter" | "SAFETY" => FinishReason::ContentFilter,
        "pause_turn" => FinishReason::PauseTurn,
        other => FinishReason::Other(other.to_string()),
    }
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments_json: String,
}

/// Reassembles streamed tool calls keyed by their provider-assigned index.
///
/// Providers may emit tool-call chunks out of order across a multiplexed stream (seen with
/// OpenAI's parallel tool calls under load); entries are kept in a [`BTreeMap`] so
/// [`ToolCallAccumulator::finalize`] always emits them in ascending index order regardless of
/// arrival order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: BTreeMap<u32, ToolCallBuilder>,
}

impl ToolCallAccumulator {
    /// Construct an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a tool call at `index`.
    pub fn start(&mut self, index: u32, id: impl Into<String>, name: impl Into<String>) {
        let entry = self.entries.entry(index).or_default();
        entry.id = Some(id.into());
        entry.name = Some(name.into());
    }

    /// Append an arguments JSON chunk at `index`. Anthropic's `partial_json` deltas and OpenAI's
    /// `arguments` deltas both concatenate this way.
    pub fn append_arguments(&mut self, index: u32, delta: &str) {
        self.entries.entry(index).or_default().arguments_json.push_str(delta);
    }

    /// `true` if no tool call has been started yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finish accumulating and emit every tool call in ascending index order. Entries missing an
    /// id or name (a provider bug, or a call still in flight) are skipped rather than emitted
    /// with empty fields.
    pub fn finalize(self) -> Vec<ToolCall> {
        self.entries
            .into_values()
            .filter_map(|entry| {
                Some(ToolCall {
                    id: entry.id?,
                    name: entry.name?,
                    arguments_json: entry.arguments_json,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_emits_in_ascending_index_order_regardless_of_arrival_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(1, "call_b", "second_tool");
        acc.append_arguments(1, "{}");
        acc.start(0, "call_a", "first_tool");
        acc.append_arguments(0, "{}");

        let calls = acc.finalize();
        assert_eq!(calls[0].name, "first_tool");
        assert_eq!(calls[1].name, "second_tool");
    }

    #[test]
    fn accumulator_concatenates_argument_deltas_in_append_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.start(0, "call_a", "search");
        acc.append_arguments(0, "{\"q\":");
        acc.append_arguments(0, "\"rust\"}");
        let calls = acc.finalize();
        assert_eq!(calls[0].arguments_json, "{\"q\":\"rust\"}");
    }

    #[test]
    fn accumulator_skips_entries_missing_id_or_name() {
        let mut acc = ToolCallAccumulator::new();
        acc.append_arguments(0, "{}");
        assert!(acc.finalize().is_empty());
    }

    #[test]
    fn pause_turn_is_not_terminal() {
        assert!(!FinishReason::PauseTurn.is_terminal());
        assert!(FinishReason::Stop.is_terminal());
    }

    #[test]
    fn legacy_chunk_adapts_content_and_finish_reason() {
        let parts = legacy_chunk_to_stream_parts(MessageChunk {
            content: "hi".to_string(),
            finish_reason: Some("stop".to_string()),
        });
        assert!(matches!(parts[0], StreamPart::TextDelta(ref t) if t == "hi"));
        assert!(matches!(parts[1], StreamPart::FinishReason(FinishReason::Stop)));
    }
}
