//! The error taxonomy shared by every provider and stream parser.
//!
//! Parsers and request builders return [`LlmError`] rather than an assortment of
//! provider-specific error types, so callers can match on [`LlmError`] once regardless of which
//! vendor they're talking to. Cancellation is represented distinctly from provider failures —
//! see [`CancellationHelper`].
//!
//! # Example
//!
//! ```rust
//! use llm_core::error::{CancellationHelper, LlmError};
//!
//! let err = LlmError::RateLimit { message: "slow down".to_string() };
//! assert!(!CancellationHelper::is_cancelled(&err));
//!
//! let cancelled = LlmError::Cancelled;
//! assert!(CancellationHelper::is_cancelled(&cancelled));
//! ```

use std::fmt;

/// Unified error taxonomy surfaced by every request builder, response parser, and stream state
/// machine in this crate.
///
/// HTTP status codes are mapped onto this taxonomy per the table in the crate's design notes:
/// `400 -> InvalidRequest`, `401/403 -> Auth`, `404 -> InvalidRequest`, `429 -> RateLimit`,
/// `5xx -> Provider`. Network/timeout failures map to [`LlmError::Timeout`]; a cancelled
/// [`tokio_util::sync::CancellationToken`] maps to [`LlmError::Cancelled`], which is deliberately
/// *not* folded into [`LlmError::Provider`] so callers can tell "the model failed" apart from
/// "the caller gave up".
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Invalid or missing API key, or a provider rejected the credentials (HTTP 401/403).
    #[error("authentication error: {message}")]
    Auth {
        /// Human readable detail from the provider, when one was supplied.
        message: String,
    },

    /// The request was malformed in a way the provider rejected before doing any work (HTTP 400,
    /// 404, or a local validation failure such as Anthropic's first-message-must-be-user rule).
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Human readable detail.
        message: String,
    },

    /// The provider is throttling this caller (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimit {
        /// Human readable detail, often including a retry-after hint when the provider sent one.
        message: String,
    },

    /// The call did not complete before its deadline.
    #[error("request timed out: {message}")]
    Timeout {
        /// Human readable detail.
        message: String,
    },

    /// A transport-level failure (connection refused, DNS failure, TLS error, …) that is not
    /// itself an HTTP response.
    #[error("transport error: {message}")]
    Http {
        /// Human readable detail.
        message: String,
    },

    /// The provider accepted the request but failed while producing a response (HTTP 5xx, an
    /// `"overloaded_error"` SSE event, or a non-zero `done_reason` in an Ollama line).
    #[error("provider error: {message}")]
    Provider {
        /// Human readable detail.
        message: String,
    },

    /// The caller's [`tokio_util::sync::CancellationToken`] was cancelled, either before the call
    /// started or mid-flight. This is not a provider failure: [`CancellationHelper::is_cancelled`]
    /// lets callers branch on it without string-matching.
    #[error("request was cancelled")]
    Cancelled,

    /// Structured-output text could not be parsed as JSON by any of the three extraction
    /// strategies `generate_object` tries (direct parse, fenced code block, first balanced
    /// object).
    #[error("could not parse structured output: {message}")]
    ResponseFormat {
        /// Human readable detail.
        message: String,
        /// The raw model text that failed to parse, preserved for caller inspection/logging.
        raw_text: String,
    },

    /// Structured output parsed as JSON but did not match the requested schema.
    #[error("structured output did not match schema: {message}")]
    StructuredOutput {
        /// Human readable detail (which key/type failed).
        message: String,
        /// The JSON schema that was being validated against.
        schema: serde_json::Value,
        /// The value that failed validation.
        actual: serde_json::Value,
    },

    /// Catch-all for conditions that don't fit the other variants (e.g. an internal invariant
    /// violation surfaced as a recoverable error rather than a panic).
    #[error("{message}")]
    Generic {
        /// Human readable detail.
        message: String,
    },
}

impl LlmError {
    /// Map an HTTP status code and response body into the taxonomy described in the crate's
    /// design notes (§4.5 / §7).
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => LlmError::Auth { message },
            400 | 404 => LlmError::InvalidRequest { message },
            429 => LlmError::RateLimit { message },
            500..=599 => LlmError::Provider { message },
            _ => LlmError::Http {
                message: format!("HTTP {status}: {message}"),
            },
        }
    }

    /// Construct an [`LlmError::InvalidRequest`] from any displayable message.
    pub fn invalid_request(message: impl fmt::Display) -> Self {
        LlmError::InvalidRequest {
            message: message.to_string(),
        }
    }

    /// Construct an [`LlmError::Provider`] from any displayable message.
    pub fn provider(message: impl fmt::Display) -> Self {
        LlmError::Provider {
            message: message.to_string(),
        }
    }

    /// Construct an [`LlmError::Generic`] from any displayable message.
    pub fn generic(message: impl fmt::Display) -> Self {
        LlmError::Generic {
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Generic {
            message: format!("JSON error: {err}"),
        }
    }
}

/// Helper for distinguishing caller-initiated cancellation from provider/transport failures.
///
/// Mirrors the teacher's warning that cancellation "is not an error of the provider" — callers
/// that race a user-facing cancel button against a request should check this before logging a
/// failure or showing an error toast.
pub struct CancellationHelper;

impl CancellationHelper {
    /// Returns `true` if `err` represents a cancelled request rather than a real failure.
    pub fn is_cancelled(err: &LlmError) -> bool {
        matches!(err, LlmError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_status_codes() {
        assert!(matches!(
            LlmError::from_http_status(401, "nope"),
            LlmError::Auth { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(403, "nope"),
            LlmError::Auth { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(400, "bad"),
            LlmError::InvalidRequest { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(404, "missing"),
            LlmError::InvalidRequest { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(429, "slow down"),
            LlmError::RateLimit { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(500, "boom"),
            LlmError::Provider { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(503, "overloaded"),
            LlmError::Provider { .. }
        ));
        assert!(matches!(
            LlmError::from_http_status(418, "teapot"),
            LlmError::Http { .. }
        ));
    }

    #[test]
    fn cancellation_helper_distinguishes_cancelled() {
        assert!(CancellationHelper::is_cancelled(&LlmError::Cancelled));
        assert!(!CancellationHelper::is_cancelled(&LlmError::Provider {
            message: "oops".into()
        }));
    }
}
