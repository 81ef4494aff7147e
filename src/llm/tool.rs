//! Tool declaration, invocation, and choice types.
//!
//! A [`Tool`] is declared once by the caller; [`ToolChoice`] controls whether/which tool the model
//! must use; a resolved [`ToolCall`] is what a provider hands back (mirroring the shape the
//! teacher's `NativeToolCall`/`ToolDefinition` used, generalized to a JSON-schema parameter
//! descriptor instead of a flat string).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A tool the model may call, declared with a JSON Schema for its parameters.
///
/// The `parameters` value must be a JSON Schema object (`{"type": "object", ...}`); providers that
/// want a narrower shape (e.g. Gemini's `FunctionDeclaration`) derive it from this at request-build
/// time rather than the caller needing to supply per-provider variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// The tool's name as the caller will refer to it. May collide across providers sharing one
    /// [`crate::tool_name_mapping`] session; collisions are resolved there, not here.
    pub name: String,
    /// Human/model-readable description of what the tool does and when to use it.
    pub description: String,
    /// JSON Schema describing the tool's call arguments.
    pub parameters: serde_json::Value,
}

impl Tool {
    /// Construct a new tool declaration.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// How strongly the model should be directed to use tools.
///
/// `disable_parallel` carries the provider-agnostic form of OpenAI's `parallel_tool_calls: false`
/// and Anthropic's `tool_choice.disable_parallel_tool_use`: forcing the model to emit at most one
/// tool call per turn even when it would otherwise batch several. `None` has no such knob since no
/// tool call is possible in the first place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides freely whether to call a tool.
    Auto {
        /// Forbid the model from requesting more than one tool call in the same turn.
        disable_parallel: bool,
    },
    /// The model must not call any tool.
    None,
    /// The model must call at least one tool, but may pick which.
    Required {
        /// Forbid the model from requesting more than one tool call in the same turn.
        disable_parallel: bool,
    },
    /// The model must call this specific tool.
    Specific {
        /// The tool name to force, matching a [`Tool::name`] in the same request.
        name: String,
        /// Forbid the model from requesting more than one tool call in the same turn.
        disable_parallel: bool,
    },
}

impl ToolChoice {
    /// `Auto` with parallel tool calls allowed.
    pub fn auto() -> Self {
        ToolChoice::Auto { disable_parallel: false }
    }

    /// `Required` with parallel tool calls allowed.
    pub fn required() -> Self {
        ToolChoice::Required { disable_parallel: false }
    }

    /// `Specific` with parallel tool calls allowed (moot, since only one tool is nameable anyway).
    pub fn specific(name: impl Into<String>) -> Self {
        ToolChoice::Specific {
            name: name.into(),
            disable_parallel: false,
        }
    }

    /// Forbid parallel tool calls on a mutable choice, builder-style.
    pub fn disallow_parallel(mut self) -> Self {
        match &mut self {
            ToolChoice::Auto { disable_parallel }
            | ToolChoice::Required { disable_parallel }
            | ToolChoice::Specific { disable_parallel, .. } => *disable_parallel = true,
            ToolChoice::None => {}
        }
        self
    }

    /// Whether this choice forbids the model from batching multiple tool calls in one turn.
    pub fn disable_parallel(&self) -> bool {
        match self {
            ToolChoice::Auto { disable_parallel }
            | ToolChoice::Required { disable_parallel }
            | ToolChoice::Specific { disable_parallel, .. } => *disable_parallel,
            ToolChoice::None => false,
        }
    }
}

/// A reference to one of a provider's own built-in tools, as opposed to a caller-defined [`Tool`].
///
/// OpenAI's Responses API (`web_search`, `file_search`, `code_interpreter`, `image_generation`,
/// `computer_use`) and Gemini (`code_execution`, `url_context`, `file_search`, `google_search`) both
/// let a caller opt into server-side tools by name rather than declaring a JSON-Schema function;
/// `options` carries whatever per-tool configuration that provider's variant accepts (e.g. Gemini's
/// `code_execution` takes none, OpenAI's `file_search` takes a `vector_store_ids` array) as a raw
/// JSON object so this type doesn't need a variant per vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTool {
    /// The provider-native tool name, e.g. `"web_search"` or `"code_execution"`.
    pub name: String,
    /// Provider-specific configuration for this tool, or `null` when the tool takes none.
    pub options: serde_json::Value,
}

impl ProviderTool {
    /// Construct a provider-native tool reference with no extra configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: serde_json::Value::Null,
        }
    }

    /// Attach provider-specific configuration, builder-style.
    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// A resolved tool invocation, as reassembled from either a non-streaming response or a completed
/// streaming accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id.
    pub id: String,
    /// The tool name, in the caller-visible namespace (post tool-name-mapping reverse lookup).
    pub name: String,
    /// Call arguments as a raw JSON string.
    pub arguments_json: String,
}

impl ToolCall {
    /// Parse [`ToolCall::arguments_json`] as a JSON value.
    ///
    /// Returns `Err` if the provider emitted malformed JSON (seen in the wild on truncated
    /// streaming responses where the model was cut off mid-argument).
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.arguments_json)
    }
}

/// The outcome of executing a [`ToolCall`], fed back into the prompt as a
/// [`crate::message::ChatContentPart::ToolResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Matches [`ToolCall::id`].
    pub call_id: String,
    /// Whether the tool ran successfully.
    pub success: bool,
    /// Output text on success.
    pub output: Option<String>,
    /// Error detail on failure.
    pub error: Option<String>,
    /// Arbitrary metadata the tool wants to surface alongside the result (timing, source, …).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    /// Construct a successful result.
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: Some(output.into()),
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Construct a failed result.
    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attach metadata, builder-style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_arguments_rejects_malformed_json() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "search".to_string(),
            arguments_json: "{\"q\": ".to_string(),
        };
        assert!(call.parse_arguments().is_err());
    }

    #[test]
    fn parse_arguments_accepts_well_formed_json() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "search".to_string(),
            arguments_json: "{\"q\": \"rust\"}".to_string(),
        };
        let parsed = call.parse_arguments().unwrap();
        assert_eq!(parsed["q"], "rust");
    }

    #[test]
    fn provider_tool_defaults_options_to_null() {
        let tool = ProviderTool::new("web_search");
        assert_eq!(tool.options, serde_json::Value::Null);
    }

    #[test]
    fn provider_tool_with_options_attaches_config() {
        let tool = ProviderTool::new("file_search").with_options(serde_json::json!({"vector_store_ids": ["vs_1"]}));
        assert_eq!(tool.options["vector_store_ids"][0], "vs_1");
    }

    #[test]
    fn tool_result_builders() {
        let ok = ToolResult::success("call_1", "42");
        assert!(ok.success);
        let failed = ToolResult::failure("call_1", "boom").with_metadata("attempt", 1.into());
        assert!(!failed.success);
        assert_eq!(failed.metadata["attempt"], 1);
    }
}
