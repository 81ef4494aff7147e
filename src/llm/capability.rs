//! The capability traits a provider implements any subset of.
//!
//! Rather than one monolithic provider trait every vendor must fully implement (the teacher's
//! `ClientWrapper` bundles chat, streaming, and usage tracking into one trait with default
//! no-op methods for the parts a given client doesn't support), the core splits each concern into
//! its own narrow async trait. A provider module implements [`ChatCapability`] and whichever
//! others its vendor actually offers; [`ProviderCapabilities::capabilities`] lets callers
//! introspect what's available before calling it.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::ModelMessage;
use crate::llm::stream::{ChatResponse, PartStream};

/// Non-streaming chat completion. Every chat-capable provider implements this.
#[async_trait]
pub trait ChatCapability: Send + Sync {
    /// Send `messages` and return the complete response.
    async fn chat(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmError>;
}

/// Streaming chat completion, emitting [`crate::stream::StreamPart`]s incrementally.
#[async_trait]
pub trait ChatStreamPartsCapability: Send + Sync {
    /// Send `messages` and return a stream of incremental parts.
    async fn chat_stream(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<PartStream, LlmError>;
}

/// A single embedding vector and the index of the input it corresponds to (batched embedding
/// calls may reorder results; the index lets callers re-associate them).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// Position of the corresponding input text in the request batch.
    pub index: u32,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

/// Text embedding generation.
#[async_trait]
pub trait EmbeddingCapability: Send + Sync {
    /// Embed each of `inputs`, returning one [`Embedding`] per input.
    async fn embed(
        &self,
        inputs: &[String],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, LlmError>;
}

pub use crate::llm::image_generation::{
    ImageData, ImageGenerationCapability, ImageGenerationOptions, ImageGenerationResponse,
};

/// One transcribed/synthesized audio segment.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// MIME type of the audio payload.
    pub mime: String,
    /// Raw audio bytes (for synthesis) or `empty` for a transcription-only response.
    pub data: Vec<u8>,
    /// Transcript text (for transcription, or a synthesis echo when the provider returns one).
    pub text: Option<String>,
}

/// Audio transcription and synthesis.
#[async_trait]
pub trait AudioCapability: Send + Sync {
    /// Transcribe `audio` (raw bytes of the given `mime` type) to text.
    async fn transcribe(
        &self,
        audio: &[u8],
        mime: &str,
        cancel: &CancellationToken,
    ) -> Result<AudioData, LlmError>;

    /// Synthesize speech audio for `text`.
    async fn synthesize(
        &self,
        text: &str,
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<AudioData, LlmError>;
}

/// A model entry as reported by a provider's model-listing endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// The model identifier to pass as [`LLMConfig::model`].
    pub id: String,
    /// Human-readable display name, when the provider supplies one distinct from `id`.
    pub display_name: Option<String>,
}

/// Model discovery.
#[async_trait]
pub trait ModelListingCapability: Send + Sync {
    /// List the models this provider currently exposes to this caller.
    async fn list_models(&self, cancel: &CancellationToken) -> Result<Vec<ModelInfo>, LlmError>;
}

/// A file uploaded to a provider's file storage endpoint (OpenAI Files, Gemini Files, …).
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Provider-assigned file id.
    pub id: String,
    /// Original file name, when the provider echoes it back.
    pub name: Option<String>,
    /// Size in bytes, when reported.
    pub size_bytes: Option<u64>,
}

/// Provider-side file storage, used to reference large attachments by id instead of inlining
/// them in every request.
#[async_trait]
pub trait FileManagementCapability: Send + Sync {
    /// Upload `data` (of the given `mime` type) and return its provider-assigned handle.
    async fn upload_file(
        &self,
        data: Vec<u8>,
        mime: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadedFile, LlmError>;

    /// Delete a previously uploaded file by id.
    async fn delete_file(&self, file_id: &str, cancel: &CancellationToken) -> Result<(), LlmError>;
}

/// A capability a provider may or may not support, for runtime introspection via
/// [`ProviderCapabilities::capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// [`ChatCapability`].
    Chat,
    /// [`ChatStreamPartsCapability`].
    ChatStream,
    /// [`EmbeddingCapability`].
    Embedding,
    /// [`ImageGenerationCapability`].
    ImageGeneration,
    /// [`AudioCapability`].
    Audio,
    /// [`ModelListingCapability`].
    ModelListing,
    /// [`FileManagementCapability`].
    FileManagement,
}

/// Lets a caller ask a provider handle which capabilities it actually implements, without
/// downcasting or probing with a throwaway request.
pub trait ProviderCapabilities {
    /// The capabilities this provider implements.
    fn capabilities(&self) -> &'static [Capability];

    /// `true` if `capability` is in [`ProviderCapabilities::capabilities`].
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}
