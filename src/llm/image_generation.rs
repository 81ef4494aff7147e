//! Image generation: [`ImageGenerationCapability`] and its supporting types.
//!
//! Adapted from the teacher's `image_generation::{ImageGenerationClient, ImageGenerationOptions,
//! ImageGenerationResponse, ImageData}`, generalized from a standalone client trait into one of
//! this crate's narrow [`crate::capability`] traits so a provider can implement it alongside chat
//! rather than needing a wholly separate client type.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;

/// Options controlling an image generation request.
#[derive(Debug, Clone, Default)]
pub struct ImageGenerationOptions {
    /// Aspect ratio hint, e.g. `"1:1"`, `"16:9"`.
    pub aspect_ratio: Option<String>,
    /// Number of images to generate.
    pub num_images: Option<u32>,
    /// Requested response format (`"url"` or `"b64_json"`), where the provider supports both.
    pub response_format: Option<String>,
}

/// One generated image, as either a hosted URL or inline base64 data. Exactly one of `url` /
/// `b64_json` is set, per [`ImageGenerationOptions::response_format`].
#[derive(Debug, Clone)]
pub struct ImageData {
    /// A hosted URL to the image, when the provider returns one.
    pub url: Option<String>,
    /// Inline base64-encoded image bytes, when the provider returns one.
    pub b64_json: Option<String>,
}

/// The result of an image generation call.
#[derive(Debug, Clone)]
pub struct ImageGenerationResponse {
    /// The generated images.
    pub images: Vec<ImageData>,
    /// The provider's revised/expanded prompt, if it returns one (OpenAI's DALL-E rewrites
    /// prompts for safety/clarity and reports the rewritten version here).
    pub revised_prompt: Option<String>,
}

/// Image generation, implemented by providers exposing a text-to-image endpoint (OpenAI's
/// `/images/generations`, Gemini's image models, …) alongside their chat capability.
#[async_trait]
pub trait ImageGenerationCapability: Send + Sync {
    /// Generate one or more images for `prompt`. `config` supplies credentials and the model id;
    /// sampling fields that don't apply to image generation are ignored.
    async fn generate_image(
        &self,
        prompt: &str,
        options: &ImageGenerationOptions,
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ImageGenerationResponse, LlmError>;
}
