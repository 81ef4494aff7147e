//! Per-vendor request builders and response parsers.
//!
//! Every provider in this module implements whichever [`crate::capability`] traits its vendor
//! actually supports against the shared [`ModelMessage`](crate::message::ModelMessage) IR. None of
//! them own their own HTTP client: they're handed a [`crate::transport::HttpTransport`] at
//! construction, so tests can substitute a fake transport without a real network call.

pub mod anthropic;
pub mod common;
pub mod compatible;
pub mod gemini;
pub mod ollama;
pub mod openai_chat;
pub mod openai_responses;

pub use anthropic::AnthropicProvider;
pub use compatible::{DeepSeekProvider, GroqProvider, OpenRouterProvider, PhindProvider};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai_chat::OpenAIChatProvider;
pub use openai_responses::OpenAIResponsesProvider;
