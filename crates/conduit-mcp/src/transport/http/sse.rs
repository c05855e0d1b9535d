//! Server-Sent Events Framing
//!
//! Wire format shared by the streamable HTTP server (encoding) and client
//! (incremental parsing):
//!
//! ```text
//! event: message
//! id: <eventId>
//! data: <json>
//!
//! ```

/// One SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event id, when the stream supports resumption
    pub id: Option<String>,
    /// Event name; JSON-RPC traffic uses "message"
    pub event: String,
    /// Raw data payload
    pub data: String,
}

impl SseEvent {
    /// A `message` event carrying a JSON payload
    pub fn message(data: impl Into<String>, id: Option<String>) -> Self {
        Self {
            id,
            event: "message".to_string(),
            data: data.into(),
        }
    }

    /// Render the wire frame, terminated by the blank line
    pub fn to_frame(&self) -> String {
        let mut frame = String::with_capacity(self.data.len() + 32);
        frame.push_str("event: ");
        frame.push_str(&self.event);
        frame.push('\n');
        if let Some(id) = &self.id {
            frame.push_str("id: ");
            frame.push_str(id);
            frame.push('\n');
        }
        for line in self.data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

/// Incremental SSE parser for byte-stream consumption
///
/// Feed arbitrary chunks; complete events come out as they terminate.
/// Comment lines (leading `:`) and unknown fields are ignored per the SSE
/// specification.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    id: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning any events it completed
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let mut line = self.buffer[..newline].to_string();
            self.buffer.drain(..=newline);
            if line.ends_with('\r') {
                line.pop();
            }

            if line.is_empty() {
                if let Some(event) = self.flush() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "id" => self.id = Some(value.to_string()),
                "data" => self.data_lines.push(value.to_string()),
                _ => {}
            }
        }
        events
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() && self.event.is_none() && self.id.is_none() {
            return None;
        }
        let event = SseEvent {
            id: self.id.take(),
            event: self.event.take().unwrap_or_else(|| "message".to_string()),
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
    fn frame_round_trips_through_parser() {
        let event = SseEvent::message(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#, Some("e-7".to_string()));
        let frame = event.to_frame();
        assert!(frame.starts_with("event: message\nid: e-7\ndata: "));
        assert!(frame.ends_with("\n\n"));

        let mut parser = SseParser::new();
        let parsed = parser.feed(&frame);
        assert_eq!(parsed, vec![event]);
    }

    #[test]
    fn parses_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: mess").is_empty());
        assert!(parser.feed("age\ndata: {\"a\":").is_empty());
        let events = parser.feed("1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, r#"{"a":1}"#);
        assert!(events[0].id.is_none());
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\nretry: 1000\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn multi_line_data_joined_with_newlines() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: a\ndata: b\n\n");
        assert_eq!(events[0].data, "a\nb");
    }
}
