//! Request-scoped configuration: [`LLMConfig`] and its builder.
//!
//! Follows the teacher's `CloudLLMConfig` idiom of a plain struct built directly (no
//! configuration-file-format dependency) but widened to cover everything a provider request
//! builder needs: credentials, model selection, sampling parameters, and an escape hatch for
//! vendor-specific knobs via [`ProviderOptions`](crate::message::ProviderOptions).

use std::collections::HashMap;
use std::time::Duration;

use crate::llm::message::ProviderOptions;
use crate::llm::tool::{ProviderTool, Tool, ToolChoice};

/// Per-request configuration shared across all providers.
///
/// Fields a given provider doesn't support (e.g. `top_k` on a provider that only accepts
/// `top_p`) are silently ignored by that provider's request builder rather than rejected, since
/// the same `LLMConfig` is commonly reused across providers.
#[derive(Debug, Clone)]
pub struct LLMConfig {
    /// API key / bearer token. Absent for providers that don't require one (e.g. local Ollama).
    pub api_key: Option<String>,
    /// Model identifier, in the provider's own naming scheme (e.g. `"gpt-4.1-mini"`,
    /// `"claude-sonnet-4-5"`, `"gemini-2.5-flash"`).
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f32>,
    /// Top-k sampling threshold (Anthropic, Gemini).
    pub top_k: Option<u32>,
    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop_sequences: Vec<String>,
    /// Tools available to the model this turn.
    pub tools: Vec<Tool>,
    /// Provider-native tools to enable this turn (OpenAI Responses' `web_search`/`file_search`/…,
    /// Gemini's `code_execution`/`google_search`/…), distinct from caller-defined [`Tool`]s.
    pub provider_tools: Vec<ProviderTool>,
    /// How strongly to direct tool use.
    pub tool_choice: Option<ToolChoice>,
    /// System/developer prompt prepended ahead of the conversation, for providers with a
    /// dedicated system-prompt field (Anthropic's top-level `system`, Gemini's
    /// `systemInstruction`) rather than a `system`-role message.
    pub system_prompt: Option<String>,
    /// Stable end-user identifier forwarded to providers that use it for abuse monitoring
    /// (OpenAI's `user` field).
    pub user: Option<String>,
    /// Requested service tier (OpenAI's `service_tier`: `"auto"`, `"default"`, `"flex"`, …).
    pub service_tier: Option<String>,
    /// Per-call deadline, applied by the provider's [`crate::transport::HttpTransport`] call.
    pub timeout: Option<Duration>,
    /// Vendor-specific request hints, keyed by provider id (see
    /// [`crate::message::provider_option`]).
    pub provider_options: ProviderOptions,
    /// Transport-layer hints (custom headers, proxy routing, …) consumed by
    /// [`crate::transport::HttpTransport`] implementations rather than provider request builders.
    pub transport_options: HashMap<String, serde_json::Value>,
    /// Freeform escape hatch for request-level fields no typed knob above covers yet.
    pub extensions: HashMap<String, serde_json::Value>,
}

impl LLMConfig {
    /// Start building a config for `model`. Equivalent to `LLMConfigBuilder::new(model)`.
    pub fn builder() -> LLMConfigBuilder {
        LLMConfigBuilder::default()
    }
}

/// Builder for [`LLMConfig`]. All fields default to unset; `model` must be set before
/// [`LLMConfigBuilder::build`], which otherwise falls back to an empty string (providers reject an
/// empty model at request-build time rather than the builder panicking).
#[derive(Debug, Clone, Default)]
pub struct LLMConfigBuilder {
    api_key: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    max_tokens: Option<u32>,
    stop_sequences: Vec<String>,
    tools: Vec<Tool>,
    provider_tools: Vec<ProviderTool>,
    tool_choice: Option<ToolChoice>,
    system_prompt: Option<String>,
    user: Option<String>,
    service_tier: Option<String>,
    timeout: Option<Duration>,
    provider_options: ProviderOptions,
    transport_options: HashMap<String, serde_json::Value>,
    extensions: HashMap<String, serde_json::Value>,
}

impl LLMConfigBuilder {
    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the nucleus sampling threshold.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set the top-k sampling threshold.
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set the maximum output tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Append a stop sequence.
    pub fn stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    /// Replace the tool list wholesale.
    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Replace the provider-native tool list wholesale.
    pub fn provider_tools(mut self, provider_tools: Vec<ProviderTool>) -> Self {
        self.provider_tools = provider_tools;
        self
    }

    /// Set the tool choice policy.
    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Set the system/developer prompt.
    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set the stable end-user identifier.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the requested service tier.
    pub fn service_tier(mut self, service_tier: impl Into<String>) -> Self {
        self.service_tier = Some(service_tier.into());
        self
    }

    /// Set the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Insert a single provider-specific option under `provider_id.key`.
    pub fn provider_option(
        mut self,
        provider_id: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.provider_options
            .entry(provider_id.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    /// Insert a single transport-layer hint.
    pub fn transport_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.transport_options.insert(key.into(), value);
        self
    }

    /// Insert a single freeform extension value.
    pub fn extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Finish building. Missing `model` becomes an empty string; providers reject that at
    /// request-build time.
    pub fn build(self) -> LLMConfig {
        LLMConfig {
            api_key: self.api_key,
            model: self.model.unwrap_or_default(),
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_tokens: self.max_tokens,
            stop_sequences: self.stop_sequences,
            tools: self.tools,
            provider_tools: self.provider_tools,
            tool_choice: self.tool_choice,
            system_prompt: self.system_prompt,
            user: self.user,
            service_tier: self.service_tier,
            timeout: self.timeout,
            provider_options: self.provider_options,
            transport_options: self.transport_options,
            extensions: self.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = LLMConfig::builder()
            .api_key("sk-test")
            .model("gpt-4.1-mini")
            .temperature(0.7)
            .max_tokens(512)
            .stop_sequence("\n\n")
            .build();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4.1-mini");
        assert_eq!(config.temperature, Some(0.7));
        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.stop_sequences, vec!["\n\n".to_string()]);
    }

    #[test]
    fn builder_sets_prompt_and_request_identity_fields() {
        let config = LLMConfig::builder()
            .model("gpt-4.1-mini")
            .system_prompt("be terse")
            .user("user_123")
            .service_tier("flex")
            .provider_tools(vec![crate::llm::tool::ProviderTool::new("web_search")])
            .transport_option("proxy", serde_json::json!("http://localhost:8080"))
            .extension("reasoning_effort", serde_json::json!("high"))
            .build();
        assert_eq!(config.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(config.user.as_deref(), Some("user_123"));
        assert_eq!(config.service_tier.as_deref(), Some("flex"));
        assert_eq!(config.provider_tools.len(), 1);
        assert_eq!(config.transport_options["proxy"], "http://localhost:8080");
        assert_eq!(config.extensions["reasoning_effort"], "high");
    }

    #[test]
    fn builder_defaults_model_to_empty_string() {
        let config = LLMConfig::builder().build();
        assert_eq!(config.model, "");
    }

    #[test]
    fn provider_option_nests_under_provider_id() {
        let config = LLMConfig::builder()
            .model("claude-sonnet-4-5")
            .provider_option("anthropic", "cacheControl", serde_json::json!({"ttl": "1h"}))
            .build();
        let value = crate::llm::message::provider_option(
            &config.provider_options,
            "anthropic",
            "cacheControl",
        );
        assert_eq!(value, Some(&serde_json::json!({"ttl": "1h"})));
    }
}
