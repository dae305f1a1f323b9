//! Newline-delimited JSON framing
//!
//! One message per line. Output chunks from a worker carry no framing
//! guarantees, so [`LineCodec::feed`] buffers partial lines across calls.

use super::error::McpError;
use super::protocol::McpMessage;

/// Default upper bound for a single frame (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Stateful line codec
#[derive(Debug)]
pub struct LineCodec {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    /// Set after an oversized frame was dropped; bytes are discarded until the
    /// next newline.
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default frame limit
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a codec with a custom frame limit
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Serialize a message followed by the line terminator
    pub fn encode(message: &McpMessage) -> Result<Vec<u8>, McpError> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Append a chunk and return every complete message it finished.
    ///
    /// Lines that fail to parse are handed to `on_malformed` and skipped;
    /// parsing continues with the next line.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_malformed: F) -> Vec<McpMessage>
    where
        F: FnMut(McpError),
    {
        let mut messages = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                self.buffer.clear();
                continue;
            }

            if self.buffer.len() + head.len() > self.max_frame_bytes {
                let excerpt = if self.buffer.is_empty() { head } else { &self.buffer[..] };
                on_malformed(self.oversized(excerpt));
                self.buffer.clear();
                continue;
            }

            self.buffer.extend_from_slice(head);
            let line = std::mem::take(&mut self.buffer);
            if let Some(result) = Self::decode_line(&line) {
                match result {
                    Ok(message) => messages.push(message),
                    Err(err) => on_malformed(err),
                }
            }
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_frame_bytes {
                on_malformed(self.oversized(&self.buffer));
                self.buffer.clear();
                self.discarding = true;
            }
        }

        messages
    }

    /// Bytes held back waiting for a line terminator
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn oversized(&self, frame: &[u8]) -> McpError {
        McpError::malformed(format!("frame exceeds {} bytes", self.max_frame_bytes), frame)
    }

    fn decode_line(line: &[u8]) -> Option<Result<McpMessage, McpError>> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        let decoded = serde_json::from_slice(line)
            .map_err(|e| McpError::malformed(e.to_string(), line))
            .and_then(|value| {
                McpMessage::from_value(value).map_err(|e| McpError::malformed(e.to_string(), line))
            });
        Some(decoded)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{McpRequest, RequestId};
    use serde_json::json;

    fn feed_ok(codec: &mut LineCodec, chunk: &[u8]) -> Vec<McpMessage> {
        codec.feed(chunk, |e| panic!("unexpected malformed frame: {e}"))
    }

    #[test]
    fn test_encode_appends_newline() {
        let msg = McpMessage::from(McpRequest::new(7i64, "ping"));
        let bytes = LineCodec::encode(&msg).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_partial_frame_across_two_feeds() {
        let mut codec = LineCodec::new();

        let first = feed_ok(&mut codec, br#"{"jsonrpc":"2.0","id":1,"resu"#);
        assert!(first.is_empty());
        assert!(codec.buffered_len() > 0);

        let second = feed_ok(&mut codec, b"lt\":{}}\n");
        assert_eq!(second.len(), 1);
        match &second[0] {
            McpMessage::Response(res) => {
                assert_eq!(res.id, RequestId::Number(1));
                assert_eq!(res.result, Some(json!({})));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_coalesced_frames_in_one_chunk() {
        let mut codec = LineCodec::new();
        let chunk = concat!(
            r#"{"jsonrpc":"2.0","id":1,"result":1}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#,
            "\r\n",
            r#"{"jsonrpc":"2.0","id":2,"result":2}"#,
            "\n"
        );
        let messages = feed_ok(&mut codec, chunk.as_bytes());
        assert_eq!(messages.len(), 3);
        assert!(messages[0].is_response());
        assert!(messages[1].is_notification());
        assert_eq!(messages[2].id(), Some(&RequestId::Number(2)));
    }

    #[test]
    fn test_malformed_line_does_not_poison_following_lines() {
        let mut codec = LineCodec::new();
        let mut errors = Vec::new();
        let chunk = b"not json at all\n{\"jsonrpc\":\"2.0\",\"id\":3,\"result\":true}\n";

        let messages = codec.feed(chunk, |e| errors.push(e));

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], McpError::MalformedFrame { .. }));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), Some(&RequestId::Number(3)));
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let mut codec = LineCodec::new();
        let messages = feed_ok(&mut codec, b"\n   \n\r\n");
        assert!(messages.is_empty());
    }

    #[test]
    fn test_oversized_frame_is_dropped_and_stream_resyncs() {
        let mut codec = LineCodec::with_max_frame_bytes(48);
        let mut errors = 0;

        let messages = codec.feed(&[b'a'; 60], |_| errors += 1);
        assert!(messages.is_empty());
        assert_eq!(errors, 1);

        // Remainder of the oversized line is discarded up to the newline.
        let messages = codec.feed(b"aaaa\n{\"jsonrpc\":\"2.0\",\"id\":9,\"result\":0}\n", |_| {
            errors += 1
        });
        assert_eq!(errors, 1);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_complete_oversized_line_is_rejected() {
        let mut codec = LineCodec::with_max_frame_bytes(48);
        let mut errors = Vec::new();

        let mut chunk = format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{}"}}"#, "x".repeat(64));
        chunk.push('\n');
        chunk.push_str("{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":0}\n");

        let messages = codec.feed(chunk.as_bytes(), |e| errors.push(e));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], McpError::MalformedFrame { .. }));
        assert_eq!(messages.len(), 1);
        assert_eq!(codec.buffered_len(), 0);

        // A buffered prefix counts toward the limit when its line completes.
        let mut errors = 0;
        assert!(codec.feed(&[b'a'; 40], |_| errors += 1).is_empty());
        assert_eq!(errors, 0);
        let mut completion = vec![b'a'; 20];
        completion.push(b'\n');
        assert!(codec.feed(&completion, |_| errors += 1).is_empty());
        assert_eq!(errors, 1);
        assert_eq!(codec.buffered_len(), 0);
    }
}
