//! External collaborators the core depends on: HTTP transport, wall clock, and cancellation.
//!
//! Per the crate's scope, concrete HTTP transport configuration is an external concern — the
//! request builders and response parsers only need *something* that can POST/GET JSON and hand
//! back either a parsed JSON object or a raw byte stream. [`HttpTransport`] is that seam.
//! [`ReqwestTransport`] is the bundled default implementation, built the same way the teacher's
//! `clients::common::get_shared_http_client` builds its pooled client.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm_core::transport::{HttpTransport, ReqwestTransport};
//! use std::collections::HashMap;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::shared();
//! let mut headers = HashMap::new();
//! headers.insert("Authorization".to_string(), "Bearer sk-...".to_string());
//! let response = transport
//!     .post_json(
//!         "https://api.openai.com/v1/chat/completions",
//!         headers,
//!         serde_json::json!({"model": "gpt-4.1-mini", "messages": []}),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("status={}", response.status);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use lazy_static::lazy_static;
use tokio_util::sync::CancellationToken;

use crate::llm::error::LlmError;

/// A parsed JSON response from a non-streaming HTTP call.
#[derive(Debug, Clone)]
pub struct HttpJsonResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The parsed JSON body. Callers that need the raw text on a parse failure should inspect
    /// `status` first — non-2xx bodies are not guaranteed to be valid JSON.
    pub body: serde_json::Value,
}

/// A stream of raw response bytes, used by the SSE and JSON-lines parsers.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// The HTTP collaborator the core depends on.
///
/// Implementors must be `Send + Sync` so a single transport instance can be shared across
/// concurrently in-flight requests, matching the teacher's `ClientWrapper: Send + Sync` bound.
/// A pre-cancelled `cancel` token must cause an immediate [`LlmError::Cancelled`] without
/// attempting a network call.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a POST request with a JSON body and parse the response as JSON.
    async fn post_json(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError>;

    /// Issue a GET request and parse the response as JSON.
    async fn get_json(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError>;

    /// Issue a DELETE request and parse the response as JSON.
    async fn delete_json(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError>;

    /// Issue a POST request with a JSON body and return the raw response body as a byte stream,
    /// for SSE / JSON-lines consumers.
    async fn post_stream(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, LlmError>;
}

/// A wall clock, abstracted so deadline/timeout math is testable.
///
/// [`SystemClock`] is the default; tests can substitute a fixed clock.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

/// [`Clock`] backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

lazy_static! {
    /// Shared HTTP client with persistent connection pooling.
    ///
    /// Keeping a single instance around keeps TLS sessions and DNS lookups warm, which matters a
    /// lot when many concurrent requests are issued to the same provider.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = {
        reqwest::ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build shared HTTP client")
    };
}

/// Default [`HttpTransport`] backed by a pooled [`reqwest::Client`].
///
/// Construct via [`ReqwestTransport::shared`] to reuse the crate-wide connection pool, or
/// [`ReqwestTransport::with_client`] to supply a client configured with custom timeouts/proxies.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    /// Per-call deadline. `None` means no deadline is enforced beyond the underlying client's own
    /// configuration.
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Build a transport around the crate-wide pooled client.
    pub fn shared() -> Self {
        Self {
            client: SHARED_HTTP_CLIENT.clone(),
            timeout: None,
        }
    }

    /// Build a transport around a caller-supplied client, e.g. one configured with a proxy.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Return a copy of this transport enforcing a per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn apply_headers(
        mut builder: reqwest::RequestBuilder,
        headers: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        builder
    }

    async fn run_with_deadline<T, F>(&self, cancel: &CancellationToken, fut: F) -> Result<T, LlmError>
    where
        F: std::future::Future<Output = Result<T, LlmError>>,
    {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let timed = async {
            if let Some(timeout) = self.timeout {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout {
                        message: format!("request exceeded {timeout:?}"),
                    }),
                }
            } else {
                fut.await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = timed => result,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError> {
        self.run_with_deadline(cancel, async {
            let builder = Self::apply_headers(self.client.post(url), &headers).json(&body);
            let resp = builder.send().await.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })?;
            let status = resp.status().as_u16();
            let text = resp.text().await.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })?;
            if log::log_enabled!(log::Level::Debug) {
                log::debug!("llm_core::transport POST {url} -> {status}");
            }
            parse_json_response(status, text)
        })
        .await
    }

    async fn get_json(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError> {
        self.run_with_deadline(cancel, async {
            let builder = Self::apply_headers(self.client.get(url), &headers);
            let resp = builder.send().await.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })?;
            let status = resp.status().as_u16();
            let text = resp.text().await.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })?;
            parse_json_response(status, text)
        })
        .await
    }

    async fn delete_json(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError> {
        self.run_with_deadline(cancel, async {
            let builder = Self::apply_headers(self.client.delete(url), &headers);
            let resp = builder.send().await.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })?;
            let status = resp.status().as_u16();
            let text = resp.text().await.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })?;
            parse_json_response(status, text)
        })
        .await
    }

    async fn post_stream(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let builder = Self::apply_headers(self.client.post(url), &headers).json(&body);
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = builder.send() => result.map_err(|e| LlmError::Http { message: e.to_string() })?,
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            log::error!("llm_core::transport POST {url} -> {status} (stream)");
            return Err(LlmError::from_http_status(status.as_u16(), text));
        }

        let cancel = cancel.clone();
        let byte_stream = resp.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| LlmError::Http {
                message: e.to_string(),
            })
        });

        let guarded = futures_util::stream::unfold(
            (byte_stream, cancel),
            |(mut stream, cancel)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Some(Err(LlmError::Cancelled)),
                    item = stream.next() => item,
                };
                next.map(|item| (item, (stream, cancel)))
            },
        );

        Ok(Box::pin(guarded))
    }
}

fn parse_json_response(status: u16, text: String) -> Result<HttpJsonResponse, LlmError> {
    if !(200..300).contains(&status) {
        log::error!("llm_core::transport received non-success status {status}");
        return Err(LlmError::from_http_status(status, text));
    }
    let body: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        log::error!("llm_core::transport failed to parse JSON response: {e}");
        LlmError::Generic {
            message: format!("failed to parse JSON response: {e}"),
        }
    })?;
    Ok(HttpJsonResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_post_json() {
        let transport = ReqwestTransport::shared();
        let token = CancellationToken::new();
        token.cancel();
        let result = transport
            .post_json(
                "https://example.invalid/should-not-be-called",
                HashMap::new(),
                serde_json::json!({}),
                &token,
            )
            .await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_post_stream() {
        let transport = ReqwestTransport::shared();
        let token = CancellationToken::new();
        token.cancel();
        let result = transport
            .post_stream(
                "https://example.invalid/should-not-be-called",
                HashMap::new(),
                serde_json::json!({}),
                &token,
            )
            .await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }
}
