//! Server-Sent Events parsing over the lines [`super::decoder::LineDecoder`] produces.
//!
//! Implements the subset of the SSE wire format every provider in this crate's scope actually
//! emits: `event:`/`data:` fields, multi-line `data:` concatenation with `\n`, comment lines
//! (leading `:`) ignored, and a blank line terminating the event. OpenAI's `data: [DONE]`
//! sentinel is surfaced as [`SseEvent::is_done`] rather than swallowed here, since callers differ
//! on whether they need to act on it.

use super::decoder::LineDecoder;

/// One fully-accumulated SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event:` field, if the provider sent one. Anthropic always sends this; OpenAI never
    /// does (relying on `data`'s own `"type"` field instead).
    pub event: Option<String>,
    /// The concatenated `data:` field lines, joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// `true` if this event's data is the literal OpenAI stream-termination sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE parser: feed it raw bytes as they arrive over the wire, get back zero or more
/// complete [`SseEvent`]s per chunk.
#[derive(Debug, Default)]
pub struct SseParser {
    decoder: LineDecoder,
    event_field: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Construct an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes in, returning any events they completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let lines = self.decoder.push(bytes);
        let mut events = Vec::new();
        for line in lines {
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event_field = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(value.trim_start().to_string());
        }
        // Fields without a recognized prefix (`id:`, `retry:`) are accepted by the wire format
        // but none of this crate's providers rely on them, so they're ignored.
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event_field.is_none() && self.data_lines.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.event_field.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_style_anonymous_events() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: {\"choices\":[]}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, None);
        assert_eq!(events[0].data, "{\"choices\":[]}");
    }

    #[test]
    fn parses_anthropic_style_named_events() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: content_block_delta\ndata: {\"type\":\"x\"}\n\n");
        assert_eq!(events[0].event.as_deref(), Some("content_block_delta"));
    }

    #[test]
    fn concatenates_multiline_data_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn ignores_comment_lines() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\ndata: hi\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hi");
    }

    #[test]
    fn recognizes_done_sentinel() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: [DONE]\n\n");
        assert!(events[0].is_done());
    }

    #[test]
    fn splits_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: par").is_empty());
        let events = parser.push(b"tial\n\n");
        assert_eq!(events[0].data, "partial");
    }
}
