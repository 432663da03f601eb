//! Incremental `text/event-stream` decoder.
//!
//! Only the `data` field matters for the feed. Multi-line `data:` fields are
//! joined with `\n`, comment lines (leading `:`) are skipped and a message is
//! emitted on the blank line that terminates it. A partial message left when
//! the stream ends is discarded.

use thiserror::Error;

/// Longest line buffered while waiting for its terminating newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("event stream line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
    saw_data: bool,
    max_line: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self { pending: Vec::new(), data_lines: Vec::new(), saw_data: false, max_line }
    }

    /// Feed raw bytes and collect every message completed by them. Fails once
    /// a single line outgrows the limit; the decoder is then reset.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, LineTooLong> {
        self.pending.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            if newline > self.max_line {
                return Err(self.overflow());
            }
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }

        if self.pending.len() > self.max_line {
            return Err(self.overflow());
        }
        Ok(messages)
    }

    fn overflow(&mut self) -> LineTooLong {
        self.pending.clear();
        self.data_lines.clear();
        self.saw_data = false;
        LineTooLong { limit: self.max_line }
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_owned());
            self.saw_data = true;
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if !self.saw_data {
            return None;
        }
        self.saw_data = false;
        let message = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::{LineTooLong, SseDecoder};

    #[test]
    fn single_data_line_becomes_one_message() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(b"data: {\"event_type\":\"log\"}\n\n").expect("decodes");
        assert_eq!(messages, vec!["{\"event_type\":\"log\"}".to_owned()]);
    }

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(b"data: {\"message\":\ndata: \"hi\"}\n\n").expect("decodes");
        assert_eq!(messages, vec!["{\"message\":\n\"hi\"}".to_owned()]);
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(b": keep-alive\n\nevent: update\nid: 7\ndata: x\n\n").expect("decodes");
        assert_eq!(messages, vec!["x".to_owned()]);
    }

    #[test]
    fn messages_split_across_chunks_are_reassembled() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: par"), Ok(vec![]));
        assert_eq!(decoder.push(b"tial\r\n"), Ok(vec![]));
        assert_eq!(
            decoder.push(b"\r\ndata: next\n\n"),
            Ok(vec!["partial".to_owned(), "next".to_owned()])
        );
    }

    #[test]
    fn trailing_partial_message_is_never_emitted() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: unterminated\n"), Ok(vec![]));
    }

    #[test]
    fn endless_line_is_rejected_and_decoder_recovers() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert_eq!(decoder.push(b"data: 0123456789"), Ok(vec![]));
        assert_eq!(decoder.push(b"abcdef"), Err(LineTooLong { limit: 16 }));

        assert_eq!(decoder.push(b"data: ok\n\n"), Ok(vec!["ok".to_owned()]));
    }

    #[test]
    fn oversized_line_inside_one_chunk_is_rejected() {
        let mut decoder = SseDecoder::with_max_line(16);
        let chunk = b"data: this line is far too long\n\n";
        assert_eq!(decoder.push(chunk), Err(LineTooLong { limit: 16 }));
    }
}
