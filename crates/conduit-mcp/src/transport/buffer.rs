//! Read Buffer for Newline-Delimited Framing
//!
//! Stream transports deliver byte chunks with no alignment to message
//! boundaries. [`ReadBuffer`] accumulates chunks and yields one complete
//! newline-delimited JSON frame at a time, leaving partial frames
//! buffered.
//!
//! # Edge cases
//!
//! - A trailing `\r` before the `\n` is stripped (CRLF tolerance)
//! - Empty frames between consecutive newlines are skipped
//! - A buffer that grows past its frame-size cap without yielding a
//!   newline is an error; the transport should reset the connection

// Layer 2: Third-party crate imports
use bytes::{Buf, BytesMut};

// Layer 3: Internal module imports
use crate::protocol::constants::defaults;
use crate::protocol::errors::{ProtocolError, ProtocolResult};
use crate::protocol::JsonRpcMessage;

/// Accumulates raw bytes and emits complete JSON-RPC frames
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::transport::ReadBuffer;
///
/// let mut buffer = ReadBuffer::new();
/// buffer.append(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
/// assert!(buffer.read_message().unwrap().is_none()); // no newline yet
///
/// buffer.append(b"\n");
/// assert!(buffer.read_message().unwrap().is_some());
/// assert!(buffer.read_message().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct ReadBuffer {
    buffer: BytesMut,
    max_frame_bytes: usize,
}

impl ReadBuffer {
    /// Create a buffer with the default 4 MiB frame cap
    pub fn new() -> Self {
        Self::with_max_frame_bytes(defaults::MAX_FRAME_BYTES)
    }

    /// Create a buffer with a custom frame cap
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_bytes,
        }
    }

    /// Concatenate a chunk to the internal buffer
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Return the next complete frame, if any
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] when the buffered bytes
    /// exceed the cap without a delimiter, and decode errors for frames
    /// that are not valid JSON-RPC.
    pub fn read_message(&mut self) -> ProtocolResult<Option<JsonRpcMessage>> {
        loop {
            let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_frame_bytes {
                    return Err(ProtocolError::FrameTooLarge {
                        max_bytes: self.max_frame_bytes,
                    });
                }
                return Ok(None);
            };

            let mut frame = self.buffer.split_to(newline + 1);
            frame.truncate(newline);
            if frame.last() == Some(&b'\r') {
                frame.truncate(frame.len() - 1);
            }
            if frame.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            return JsonRpcMessage::parse_bytes(&frame).map(Some);
        }
    }

    /// Drop all pending bytes (used on transport close or reset)
    pub fn clear(&mut self) {
        self.buffer.clear();
        // Release capacity accumulated by a large partial frame.
        self.buffer = BytesMut::new();
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.buffer.remaining()
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(method: &str) -> String {
        format!(r#"{{"jsonrpc":"2.0","method":"{method}"}}"#)
    }

    #[test]
    fn yields_frames_across_chunk_boundaries() {
        let mut buffer = ReadBuffer::new();
        let wire = format!("{}\n{}\n", frame("a"), frame("b"));
        let (left, right) = wire.split_at(wire.len() / 2);

        buffer.append(left.as_bytes());
        let mut seen = Vec::new();
        while let Some(message) = buffer.read_message().unwrap() {
            seen.push(message);
        }
        buffer.append(right.as_bytes());
        while let Some(message) = buffer.read_message().unwrap() {
            seen.push(message);
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].method(), Some("a"));
        assert_eq!(seen[1].method(), Some("b"));
    }

    #[test]
    fn strips_carriage_return() {
        let mut buffer = ReadBuffer::new();
        buffer.append(format!("{}\r\n", frame("crlf")).as_bytes());
        let message = buffer.read_message().unwrap().unwrap();
        assert_eq!(message.method(), Some("crlf"));
    }

    #[test]
    fn skips_empty_frames() {
        let mut buffer = ReadBuffer::new();
        buffer.append(format!("\n\r\n{}\n\n", frame("only")).as_bytes());
        let message = buffer.read_message().unwrap().unwrap();
        assert_eq!(message.method(), Some("only"));
        assert!(buffer.read_message().unwrap().is_none());
    }

    #[test]
    fn errors_on_oversized_partial_frame() {
        let mut buffer = ReadBuffer::with_max_frame_bytes(64);
        buffer.append(&[b'x'; 65]);
        assert!(matches!(
            buffer.read_message(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn clear_drops_partial_data() {
        let mut buffer = ReadBuffer::new();
        buffer.append(b"{\"jsonrpc\":");
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.append(format!("{}\n", frame("after")).as_bytes());
        assert!(buffer.read_message().unwrap().is_some());
    }
}
