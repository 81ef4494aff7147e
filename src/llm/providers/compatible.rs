//! Thin wrappers over [`OpenAIChatProvider`] for vendors that speak the OpenAI Chat Completions
//! wire protocol against their own base URL.
//!
//! Mirrors the teacher's `ClaudeClient`, which was nothing but an `OpenAIClient` pointed at
//! Anthropic's (then OpenAI-compatible) endpoint: `ClaudeClient::new_with_model_str` simply calls
//! `OpenAIClient::new_with_base_url`. Each wrapper here does the same thing — fix the base URL,
//! delegate every capability to the inner [`OpenAIChatProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{Capability, ChatCapability, ChatStreamPartsCapability, ProviderCapabilities};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::ModelMessage;
use crate::llm::stream::{ChatResponse, PartStream};
use crate::llm::transport::HttpTransport;

use super::openai_chat::OpenAIChatProvider;

const CAPABILITIES: &[Capability] = &[Capability::Chat, Capability::ChatStream];

macro_rules! openai_compatible_provider {
    ($name:ident, $default_base_url:expr, $provider_id:expr, $alias:expr, $doc:expr) => {
        #[doc = $doc]
        pub struct $name {
            delegate: OpenAIChatProvider,
        }

        impl $name {
            /// Construct a provider against the vendor's default base URL.
            pub fn new(transport: impl HttpTransport + 'static) -> Self {
                Self {
                    delegate: OpenAIChatProvider::new(transport, $default_base_url.to_string())
                        .with_provider_ids($provider_id, $alias),
                }
            }

            /// Construct a provider against a caller-supplied base URL (self-hosted gateways,
            /// regional endpoints, …).
            pub fn with_base_url(transport: impl HttpTransport + 'static, base_url: String) -> Self {
                Self {
                    delegate: OpenAIChatProvider::new(transport, base_url)
                        .with_provider_ids($provider_id, $alias),
                }
            }

            /// Construct a provider sharing an already-`Arc`'d transport.
            pub fn from_shared(transport: Arc<dyn HttpTransport>, base_url: String) -> Self {
                Self {
                    delegate: OpenAIChatProvider::from_shared(transport, base_url)
                        .with_provider_ids($provider_id, $alias),
                }
            }
        }

        #[async_trait]
        impl ChatCapability for $name {
            async fn chat(
                &self,
                messages: &[ModelMessage],
                config: &LLMConfig,
                cancel: &CancellationToken,
            ) -> Result<ChatResponse, LlmError> {
                self.delegate.chat(messages, config, cancel).await
            }
        }

        #[async_trait]
        impl ChatStreamPartsCapability for $name {
            async fn chat_stream(
                &self,
                messages: &[ModelMessage],
                config: &LLMConfig,
                cancel: &CancellationToken,
            ) -> Result<PartStream, LlmError> {
                self.delegate.chat_stream(messages, config, cancel).await
            }
        }

        impl ProviderCapabilities for $name {
            fn capabilities(&self) -> &'static [Capability] {
                CAPABILITIES
            }
        }
    };
}

openai_compatible_provider!(
    DeepSeekProvider,
    "https://api.deepseek.com/v1",
    "deepseek",
    "deepseek.chat",
    "DeepSeek, an OpenAI-Chat-Completions-compatible vendor."
);
openai_compatible_provider!(
    GroqProvider,
    "https://api.groq.com/openai/v1",
    "groq",
    "groq.chat",
    "Groq, an OpenAI-Chat-Completions-compatible vendor."
);
openai_compatible_provider!(
    OpenRouterProvider,
    "https://openrouter.ai/api/v1",
    "openrouter",
    "openrouter.chat",
    "OpenRouter, an OpenAI-Chat-Completions-compatible aggregator."
);
openai_compatible_provider!(
    PhindProvider,
    "https://https.extension.phind.com/agent/v1",
    "phind",
    "phind.chat",
    "Phind, an OpenAI-Chat-Completions-compatible vendor."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::transport::ReqwestTransport;

    #[test]
    fn wrappers_report_chat_capabilities() {
        let provider = DeepSeekProvider::new(ReqwestTransport::shared());
        assert!(provider.supports(Capability::Chat));
        assert!(provider.supports(Capability::ChatStream));
        assert!(!provider.supports(Capability::Embedding));
    }
}
