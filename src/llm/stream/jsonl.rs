//! Newline-delimited JSON parsing, used by the Ollama wire protocol.
//!
//! Ollama streams one complete JSON object per line rather than SSE framing. This sits on the
//! same [`super::decoder::LineDecoder`] as [`super::sse::SseParser`] so both protocols share the
//! same partial-UTF-8/partial-line handling.

use crate::llm::error::LlmError;

use super::decoder::LineDecoder;

/// Incremental JSON-lines parser.
#[derive(Debug, Default)]
pub struct JsonLinesParser {
    decoder: LineDecoder,
}

impl JsonLinesParser {
    /// Construct an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes in, returning a parsed [`serde_json::Value`] (or parse error) for each
    /// complete line. Blank lines are skipped rather than surfaced as an error, since some
    /// servers emit a trailing blank line before closing the connection.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<serde_json::Value, LlmError>> {
        self.decoder
            .push(bytes)
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(&line).map_err(|e| LlmError::Generic {
                    message: format!("malformed JSON line: {e}"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_object_per_line() {
        let mut parser = JsonLinesParser::new();
        let results = parser.push(b"{\"a\":1}\n{\"a\":2}\n");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap()["a"], 1);
        assert_eq!(results[1].as_ref().unwrap()["a"], 2);
    }

    #[test]
    fn skips_blank_lines() {
        let mut parser = JsonLinesParser::new();
        let results = parser.push(b"{\"a\":1}\n\n{\"a\":2}\n");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn surfaces_malformed_line_as_error() {
        let mut parser = JsonLinesParser::new();
        let results = parser.push(b"not json\n");
        assert!(results[0].is_err());
    }

    #[test]
    fn holds_back_partial_line_across_chunks() {
        let mut parser = JsonLinesParser::new();
        assert!(parser.push(b"{\"a\":").is_empty());
        let results = parser.push(b"1}\n");
        assert_eq!(results[0].as_ref().unwrap()["a"], 1);
    }
}
