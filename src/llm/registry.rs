//! The provider/model registry: resolve a provider id string to a live provider instance.
//!
//! A provider is registered under its base id (`"deepseek"`) and, where it exposes more than one
//! capability surface worth distinguishing, under a capability-qualified alias too
//! (`"deepseek.chat"`) — both point at the same factory, so callers that only know the generic
//! vendor name and callers that asked for a specific capability both resolve correctly. This is
//! also where [`crate::message::ProviderOptions`]/[`crate::stream::ProviderMetadata`]'s
//! double-keying convention comes from: the same two keys a caller would look a provider up under
//! are the two keys vendor-specific metadata gets attached under.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::llm::capability::{Capability, ChatCapability, ChatStreamPartsCapability, ProviderCapabilities};
use crate::llm::config::LLMConfig;
use crate::llm::error::LlmError;
use crate::llm::message::ModelMessage;
use crate::llm::providers::{
    AnthropicProvider, DeepSeekProvider, GeminiProvider, GroqProvider, OllamaProvider,
    OpenAIChatProvider, OpenAIResponsesProvider, OpenRouterProvider, PhindProvider,
};
use crate::llm::stream::{ChatResponse, PartStream};
use crate::llm::transport::{HttpTransport, ReqwestTransport};

/// Default separator between a provider id and a model id in a combined identifier passed to
/// [`ProviderRegistryClient::new`] (`"deepseek:deepseek-reasoner"`).
pub const PROVIDER_MODEL_SEPARATOR: char = ':';

/// A fully-capable chat provider: implements chat, streaming chat, and capability introspection.
/// Blanket-implemented for anything that implements the three individually, so every concrete
/// provider in [`crate::providers`] satisfies it for free.
#[async_trait]
pub trait Provider: ChatCapability + ChatStreamPartsCapability + ProviderCapabilities + Send + Sync {}

impl<T> Provider for T where T: ChatCapability + ChatStreamPartsCapability + ProviderCapabilities + Send + Sync {}

type Factory = Box<dyn Fn(Arc<dyn HttpTransport>, Option<String>) -> Arc<dyn Provider> + Send + Sync>;

/// A registered factory plus the capability set it was found to expose when it was registered
/// (read once off a throwaway instance, since [`ProviderCapabilities::capabilities`] needs `&self`
/// but the registry only builds real instances lazily on [`ProviderRegistry::get`]).
struct Registration {
    factory: Factory,
    capabilities: &'static [Capability],
}

/// Maps provider id strings to factories that build a live [`Provider`] given a transport and an
/// optional base-URL override.
pub struct ProviderRegistry {
    registrations: HashMap<String, Registration>,
}

impl ProviderRegistry {
    /// An empty registry with nothing pre-registered.
    pub fn empty() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// A registry pre-populated with every provider this crate ships, under both their base id
    /// and (where applicable) a capability-qualified alias.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register_both("openai", "openai.chat", |transport, base_url| {
            Arc::new(OpenAIChatProvider::new(
                transport,
                base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            ))
        });
        registry.register("openai.responses", |transport, base_url| {
            Arc::new(OpenAIResponsesProvider::new(
                transport,
                base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            ))
        });
        registry.register_both("anthropic", "anthropic.messages", |transport, base_url| {
            Arc::new(AnthropicProvider::new(
                transport,
                base_url.unwrap_or_else(|| "https://api.anthropic.com/v1".to_string()),
            ))
        });
        registry.register_both("gemini", "gemini.generateContent", |transport, base_url| {
            Arc::new(GeminiProvider::new(
                transport,
                base_url.unwrap_or_else(|| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
            ))
        });
        registry.register_both("ollama", "ollama.chat", |transport, base_url| {
            Arc::new(OllamaProvider::new(
                transport,
                base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            ))
        });
        registry.register_both("deepseek", "deepseek.chat", |transport, base_url| {
            match base_url {
                Some(base_url) => Arc::new(DeepSeekProvider::with_base_url(transport, base_url)),
                None => Arc::new(DeepSeekProvider::new(transport)),
            }
        });
        registry.register_both("groq", "groq.chat", |transport, base_url| match base_url {
            Some(base_url) => Arc::new(GroqProvider::with_base_url(transport, base_url)),
            None => Arc::new(GroqProvider::new(transport)),
        });
        registry.register_both(
            "openrouter",
            "openrouter.chat",
            |transport, base_url| match base_url {
                Some(base_url) => Arc::new(OpenRouterProvider::with_base_url(transport, base_url)),
                None => Arc::new(OpenRouterProvider::new(transport)),
            },
        );
        registry.register_both("phind", "phind.chat", |transport, base_url| match base_url {
            Some(base_url) => Arc::new(PhindProvider::with_base_url(transport, base_url)),
            None => Arc::new(PhindProvider::new(transport)),
        });

        registry
    }

    /// Register a factory under a single id.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(Arc<dyn HttpTransport>, Option<String>) -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        let capabilities = probe_capabilities(&factory);
        self.registrations.insert(
            id.into(),
            Registration {
                factory: Box::new(factory),
                capabilities,
            },
        );
    }

    fn register_both<F>(&mut self, base_id: &str, alias: &str, factory: F)
    where
        F: Fn(Arc<dyn HttpTransport>, Option<String>) -> Arc<dyn Provider> + Send + Sync + 'static,
    {
        let capabilities = probe_capabilities(&factory);
        let factory = Arc::new(factory);
        let base_factory = factory.clone();
        self.registrations.insert(
            base_id.to_string(),
            Registration {
                factory: Box::new(move |transport, base_url| (*base_factory)(transport, base_url)),
                capabilities,
            },
        );
        self.registrations.insert(
            alias.to_string(),
            Registration {
                factory: Box::new(move |transport, base_url| (*factory)(transport, base_url)),
                capabilities,
            },
        );
    }

    /// Build a provider instance for `id`, or `None` if nothing is registered under it.
    pub fn get(
        &self,
        id: &str,
        transport: Arc<dyn HttpTransport>,
        base_url_override: Option<String>,
    ) -> Option<Arc<dyn Provider>> {
        self.registrations
            .get(id)
            .map(|r| (r.factory)(transport, base_url_override))
    }

    /// Every id (and alias) currently registered, in no particular order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.registrations.keys().map(String::as_str).collect()
    }

    /// `true` if `id` is registered and exposes `capability`.
    pub fn has_capability(&self, id: &str, capability: Capability) -> bool {
        self.registrations
            .get(id)
            .is_some_and(|r| r.capabilities.contains(&capability))
    }

    /// Every registered id whose provider supports every capability in `required`.
    pub fn find_with_all(&self, required: &[Capability]) -> Vec<&str> {
        self.registrations
            .iter()
            .filter(|(_, r)| required.iter().all(|c| r.capabilities.contains(c)))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Every registered id whose provider supports at least one capability in `any_of`.
    pub fn find_with_any(&self, any_of: &[Capability]) -> Vec<&str> {
        self.registrations
            .iter()
            .filter(|(_, r)| any_of.iter().any(|c| r.capabilities.contains(c)))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Among ids supporting every capability in `required`, the one whose capability set overlaps
    /// `preferred` the most (ties broken by picking the alphabetically first id, for determinism).
    /// `None` if no id satisfies `required`.
    pub fn best_provider(&self, required: &[Capability], preferred: &[Capability]) -> Option<&str> {
        self.registrations
            .iter()
            .filter(|(_, r)| required.iter().all(|c| r.capabilities.contains(c)))
            .map(|(id, r)| {
                let overlap = preferred.iter().filter(|c| r.capabilities.contains(c)).count();
                (overlap, id.as_str())
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, id)| id)
    }
}

/// Build one throwaway instance off `factory` purely to read its capability set at registration
/// time; construction does no I/O for any provider in this crate, so this is cheap.
fn probe_capabilities<F>(factory: &F) -> &'static [Capability]
where
    F: Fn(Arc<dyn HttpTransport>, Option<String>) -> Arc<dyn Provider>,
{
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::shared());
    factory(transport, None).capabilities()
}

/// Convenience client binding a [`ProviderRegistry`]-resolved provider to its transport and
/// config, so a caller driving several requests against the same provider doesn't need to thread
/// both through every call.
pub struct ProviderRegistryClient {
    provider: Arc<dyn Provider>,
    model_override: Option<String>,
}

impl ProviderRegistryClient {
    /// Resolve `provider_id` against `registry` and bind it to `transport`.
    ///
    /// `provider_id` may be a combined identifier of the form `providerId:modelId`
    /// (`PROVIDER_MODEL_SEPARATOR`), in which case only the part before the separator is looked up
    /// in `registry` and the part after it overrides [`LLMConfig::model`] on every call this client
    /// makes, regardless of what the caller passes in `config`.
    pub fn new(
        registry: &ProviderRegistry,
        provider_id: &str,
        transport: Arc<dyn HttpTransport>,
        base_url_override: Option<String>,
    ) -> Result<Self, LlmError> {
        let (id, model_override) = match provider_id.split_once(PROVIDER_MODEL_SEPARATOR) {
            Some((id, model)) => (id, Some(model.to_string())),
            None => (provider_id, None),
        };
        let provider = registry.get(id, transport, base_url_override).ok_or_else(|| {
            LlmError::invalid_request(format!("no provider registered under id '{id}'"))
        })?;
        Ok(Self { provider, model_override })
    }

    fn resolved_config(&self, config: &LLMConfig) -> LLMConfig {
        match &self.model_override {
            Some(model) => {
                let mut config = config.clone();
                config.model = model.clone();
                config
            }
            None => config.clone(),
        }
    }

    /// Non-streaming chat through the bound provider.
    pub async fn chat(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, LlmError> {
        let config = self.resolved_config(config);
        self.provider.chat(messages, &config, cancel).await
    }

    /// Streaming chat through the bound provider.
    pub async fn chat_stream(
        &self,
        messages: &[ModelMessage],
        config: &LLMConfig,
        cancel: &CancellationToken,
    ) -> Result<PartStream, LlmError> {
        let config = self.resolved_config(config);
        self.provider.chat_stream(messages, &config, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::capability::Capability;
    use crate::llm::transport::ReqwestTransport;

    #[test]
    fn defaults_register_both_base_id_and_alias() {
        let registry = ProviderRegistry::with_defaults();
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::shared());
        assert!(registry.get("deepseek", transport.clone(), None).is_some());
        assert!(registry.get("deepseek.chat", transport.clone(), None).is_some());
        assert!(registry.get("does-not-exist", transport, None).is_none());
    }

    #[test]
    fn resolved_provider_reports_capabilities() {
        let registry = ProviderRegistry::with_defaults();
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::shared());
        let provider = registry.get("anthropic", transport, None).unwrap();
        assert!(provider.supports(Capability::Chat));
    }

    #[tokio::test]
    async fn client_new_errors_on_unknown_provider_id() {
        let registry = ProviderRegistry::with_defaults();
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::shared());
        let result = ProviderRegistryClient::new(&registry, "not-a-provider", transport, None);
        assert!(result.is_err());
    }

    #[test]
    fn has_capability_reflects_what_the_provider_actually_implements() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.has_capability("openai", Capability::ImageGeneration));
        assert!(!registry.has_capability("anthropic", Capability::ImageGeneration));
        assert!(!registry.has_capability("does-not-exist", Capability::Chat));
    }

    #[test]
    fn find_with_all_only_returns_ids_supporting_every_required_capability() {
        let registry = ProviderRegistry::with_defaults();
        let ids = registry.find_with_all(&[Capability::Chat, Capability::ImageGeneration]);
        assert!(ids.contains(&"openai"));
        assert!(!ids.contains(&"anthropic"));
    }

    #[test]
    fn find_with_any_returns_ids_supporting_at_least_one_capability() {
        let registry = ProviderRegistry::with_defaults();
        let ids = registry.find_with_any(&[Capability::ModelListing]);
        assert!(ids.contains(&"ollama"));
        assert!(!ids.contains(&"anthropic"));
    }

    #[test]
    fn best_provider_ranks_by_preferred_capability_overlap() {
        let registry = ProviderRegistry::with_defaults();
        let best = registry.best_provider(&[Capability::Chat], &[Capability::ImageGeneration]);
        assert_eq!(best, Some("openai"));
    }

    #[test]
    fn best_provider_returns_none_when_nothing_satisfies_required() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.best_provider(&[Capability::Audio], &[]), None);
    }

    #[tokio::test]
    async fn client_new_parses_a_combined_provider_model_identifier() {
        let registry = ProviderRegistry::with_defaults();
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::shared());
        let client = ProviderRegistryClient::new(&registry, "deepseek:deepseek-reasoner", transport, None).unwrap();
        let config = client.resolved_config(&LLMConfig::builder().model("ignored").build());
        assert_eq!(config.model, "deepseek-reasoner");
    }
}
