//! Incremental UTF-8 decoding and line buffering over a raw byte stream.
//!
//! HTTP chunk boundaries never align with UTF-8 character boundaries or newline boundaries, so
//! both the SSE and JSON-lines parsers sit on top of this buffer rather than decoding each chunk
//! independently.

/// Buffers raw bytes, decodes them incrementally as UTF-8, and yields complete lines (split on
/// `\n`, with a trailing `\r` stripped).
///
/// A multi-byte UTF-8 character split across two chunks is held back until the rest arrives;
/// [`LineDecoder::push`] never panics on a chunk boundary that falls mid-character.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending_bytes: Vec<u8>,
    pending_line: String,
}

impl LineDecoder {
    /// Construct an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes in, returning any complete lines they produced (not including a final
    /// partial line, which is retained for the next call or [`LineDecoder::finish`]).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(bytes);

        let (valid, consumed) = match std::str::from_utf8(&self.pending_bytes) {
            Ok(s) => (s.to_string(), self.pending_bytes.len()),
            Err(e) => {
                let valid_len = e.valid_up_to();
                let valid = std::str::from_utf8(&self.pending_bytes[..valid_len])
                    .expect("valid_up_to guarantees valid UTF-8 prefix")
                    .to_string();
                (valid, valid_len)
            }
        };
        self.pending_bytes.drain(..consumed);

        let mut lines = Vec::new();
        let mut combined = std::mem::take(&mut self.pending_line);
        combined.push_str(&valid);

        let mut rest = combined.as_str();
        while let Some(idx) = rest.find('\n') {
            let mut line = &rest[..idx];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            lines.push(line.to_string());
            rest = &rest[idx + 1..];
        }
        self.pending_line = rest.to_string();
        lines
    }

    /// Flush any buffered partial line as a final line. Call once the underlying byte stream has
    /// ended.
    pub fn finish(mut self) -> Option<String> {
        if self.pending_line.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline_and_strips_carriage_return() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"line one\r\nline two\n");
        assert_eq!(lines, vec!["line one".to_string(), "line two".to_string()]);
    }

    #[test]
    fn holds_back_partial_line_across_calls() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"partial-sta").is_empty());
        let lines = decoder.push(b"rt\ncomplete\n");
        assert_eq!(
            lines,
            vec!["partial-start".to_string(), "complete".to_string()]
        );
    }

    #[test]
    fn holds_back_split_multibyte_character() {
        let mut decoder = LineDecoder::new();
        let snowman = "☃".as_bytes();
        assert!(decoder.push(&snowman[..1]).is_empty());
        let lines = decoder.push(&[&snowman[1..], b"\n"].concat());
        assert_eq!(lines, vec!["☃".to_string()]);
    }

    #[test]
    fn finish_flushes_trailing_partial_line() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"no trailing newline");
        assert_eq!(decoder.finish(), Some("no trailing newline".to_string()));
    }
}
