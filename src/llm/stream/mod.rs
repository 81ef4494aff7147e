//! Incremental stream parsing: byte decoding, wire framing (SSE / JSON-lines), and the
//! provider-agnostic [`parts::StreamPart`] vocabulary providers translate their framing into.

pub mod decoder;
pub mod jsonl;
pub mod parts;
pub mod sse;

pub use decoder::LineDecoder;
pub use jsonl::JsonLinesParser;
pub use parts::{
    ChatResponse, FinishReason, MessageChunk, ProviderMetadata, StreamPart, ToolCallAccumulator,
    Usage,
};
pub use sse::{SseEvent, SseParser};

use futures_util::Stream;
use std::pin::Pin;

/// A boxed stream of [`StreamPart`]s, the return type every streaming capability method produces.
pub type PartStream = Pin<Box<dyn Stream<Item = Result<StreamPart, crate::llm::error::LlmError>> + Send>>;
