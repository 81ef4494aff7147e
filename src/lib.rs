//! `llm_core` — a provider-agnostic client core for large language model APIs.
//!
//! The crate unifies OpenAI Chat Completions, the OpenAI Responses API, Anthropic Messages,
//! Google Gemini, and the many OpenAI-compatible derivatives (DeepSeek, Groq, OpenRouter, Phind,
//! Ollama) behind a single prompt-first programming model: one [`ModelMessage`](llm::message::ModelMessage)
//! IR, one [`LLMConfig`](llm::config::LLMConfig), and a set of narrow
//! [capability traits](llm::capability) a provider implements any subset of.
//!
//! This crate is the **provider abstraction and streaming protocol layer**: prompt IR, request
//! builders, response parsers, the incremental SSE/JSON-lines stream state machines, tool-name
//! collision mapping, and the provider/model registry. It does not host a model, run local
//! inference, or persist conversations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_core::config::LLMConfig;
//! use llm_core::message::{ChatContentPart, ModelMessage, Role};
//! use llm_core::providers::openai_chat::OpenAIChatProvider;
//! use llm_core::transport::ReqwestTransport;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LLMConfig::builder()
//!     .api_key(std::env::var("OPENAI_API_KEY")?)
//!     .model("gpt-4.1-mini")
//!     .build();
//!
//! let transport = ReqwestTransport::shared();
//! let provider = OpenAIChatProvider::new(transport, "https://api.openai.com/v1".to_string());
//!
//! let prompt = vec![ModelMessage::new(Role::User, vec![ChatContentPart::text("Hello!")])];
//! let response = llm_core::helpers::generate_text(&provider, &config, prompt.into()).await?;
//! println!("{}", response.text.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod llm;

pub use llm::capability;
pub use llm::config;
pub use llm::error;
pub use llm::helpers;
pub use llm::message;
pub use llm::providers;
pub use llm::registry;
pub use llm::stream;
pub use llm::tool;
pub use llm::tool_name_mapping;
pub use llm::transport;

pub use llm::error::LlmError;
pub use llm::message::{ChatContentPart, ModelMessage, Role};
