//! Application-side stream handlers.
//!
//! A handler sees each session's inbound bytes exactly once and strictly in
//! order. Whatever it returns is queued on the same session's outbound
//! stream.

use std::sync::Arc;

use lrcp_frame::SessionId;
use tracing::debug;

/// Consumer of one session's in-order byte stream.
pub trait StreamHandler: Send {
    /// Called with newly delivered bytes; returns bytes to send back.
    fn on_bytes(&mut self, session: SessionId, bytes: &[u8]) -> Vec<u8>;

    /// Called once when the session closes, for any reason.
    fn on_close(&mut self, _session: SessionId) {}
}

/// Builds a fresh handler for every new session.
pub type HandlerFactory = Arc<dyn Fn(SessionId) -> Box<dyn StreamHandler> + Send + Sync>;

/// Reverses every complete line and sends it back.
///
/// Bytes after the last newline wait in the handler until the rest of the
/// line arrives.
#[derive(Debug, Default)]
pub struct LineReverse {
    buffer: Vec<u8>,
}

impl LineReverse {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamHandler for LineReverse {
    fn on_bytes(&mut self, session: SessionId, bytes: &[u8]) -> Vec<u8> {
        self.buffer.extend_from_slice(bytes);

        let mut reply = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            debug!(
                session,
                line = %String::from_utf8_lossy(&line),
                "reversing line"
            );
            line.reverse();
            reply.extend_from_slice(&line);
            reply.push(b'\n');
        }
        reply
    }
}

/// Factory producing a [`LineReverse`] handler per session.
pub fn line_reverse() -> HandlerFactory {
    Arc::new(|_: SessionId| -> Box<dyn StreamHandler> { Box::new(LineReverse::new()) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverses_complete_lines() {
        let mut app = LineReverse::new();
        assert_eq!(app.on_bytes(1, b"hello\nworld\n"), b"olleh\ndlrow\n");
        assert_eq!(app.on_bytes(1, b"\n"), b"\n");
    }

    #[test]
    fn holds_partial_line_until_newline() {
        let mut app = LineReverse::new();
        assert!(app.on_bytes(1, b"abc").is_empty());
        assert_eq!(app.on_bytes(1, b"def\ngh"), b"fedcba\n");
        assert_eq!(app.on_bytes(1, b"i\n"), b"ihg\n");
    }

    #[test]
    fn empty_lines_round_trip() {
        let mut app = LineReverse::new();
        assert_eq!(app.on_bytes(1, b"\n\n"), b"\n\n");
    }

    #[test]
    fn slashes_and_backslashes_are_plain_bytes() {
        let mut app = LineReverse::new();
        assert_eq!(app.on_bytes(1, b"a/b\\c\n"), b"c\\b/a\n");
    }

    #[test]
    fn factory_builds_independent_handlers() {
        let factory = line_reverse();
        let mut first = factory(1);
        let mut second = factory(2);

        assert!(first.on_bytes(1, b"par").is_empty());
        assert_eq!(second.on_bytes(2, b"xy\n"), b"yx\n");
        assert_eq!(first.on_bytes(1, b"tial\n"), b"laitrap\n");
    }
}
