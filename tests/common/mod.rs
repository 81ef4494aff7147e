//! A fixture [`HttpTransport`] that replays canned JSON responses / SSE byte chunks instead of
//! making real network calls, so the scenario tests in `tests/scenarios.rs` can drive a provider's
//! actual request-building and response-parsing code without a live API key.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use llm_core::error::LlmError;
use llm_core::transport::{ByteStream, HttpJsonResponse, HttpTransport};
use tokio_util::sync::CancellationToken;

/// Initializes the `log` facade for test runs (idempotent, safe to call from every test). Run with
/// `RUST_LOG=llm_core=debug cargo test -- --nocapture` to see the crate's own logging output
/// alongside assertions.
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records every JSON body this transport was asked to POST, and replays one fixed response for
/// non-streaming calls or one fixed sequence of raw chunks for streaming calls.
pub struct MockTransport {
    json_response: serde_json::Value,
    stream_chunks: Vec<String>,
    posted_bodies: Mutex<Vec<serde_json::Value>>,
}

impl MockTransport {
    /// A transport whose `post_json`/`get_json` calls return `response`.
    pub fn json(response: serde_json::Value) -> Self {
        Self {
            json_response: response,
            stream_chunks: Vec::new(),
            posted_bodies: Mutex::new(Vec::new()),
        }
    }

    /// A transport whose `post_stream` call replays `chunks` (each a raw SSE/JSON-lines fragment)
    /// in order, checking `cancel` before handing back each one.
    pub fn stream(chunks: Vec<String>) -> Self {
        Self {
            json_response: serde_json::Value::Null,
            stream_chunks: chunks,
            posted_bodies: Mutex::new(Vec::new()),
        }
    }

    /// Every body passed to `post_json`/`post_stream` so far, in call order.
    pub fn posted_bodies(&self) -> Vec<serde_json::Value> {
        self.posted_bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_json(
        &self,
        _url: &str,
        _headers: std::collections::HashMap<String, String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        self.posted_bodies.lock().unwrap().push(body);
        Ok(HttpJsonResponse {
            status: 200,
            body: self.json_response.clone(),
        })
    }

    async fn get_json(
        &self,
        _url: &str,
        _headers: std::collections::HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        Ok(HttpJsonResponse {
            status: 200,
            body: self.json_response.clone(),
        })
    }

    async fn delete_json(
        &self,
        _url: &str,
        _headers: std::collections::HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<HttpJsonResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        Ok(HttpJsonResponse {
            status: 200,
            body: serde_json::json!({}),
        })
    }

    async fn post_stream(
        &self,
        _url: &str,
        _headers: std::collections::HashMap<String, String>,
        body: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        self.posted_bodies.lock().unwrap().push(body);

        let items: VecDeque<Bytes> = self
            .stream_chunks
            .iter()
            .cloned()
            .map(Bytes::from)
            .collect();
        let cancel = cancel.clone();

        // Mirrors `ReqwestTransport::post_stream`'s own cancellation guard, but checked
        // synchronously per item rather than raced against the network future, since there's no
        // real I/O here for a `tokio::select!` to race against.
        let guarded = futures_util::stream::unfold(
            (items, cancel, false),
            |(mut items, cancel, done)| async move {
                if done {
                    return None;
                }
                if cancel.is_cancelled() {
                    return Some((Err(LlmError::Cancelled), (items, cancel, true)));
                }
                items.pop_front().map(|bytes| (Ok(bytes), (items, cancel, false)))
            },
        );

        Ok(Box::pin(guarded))
    }
}
