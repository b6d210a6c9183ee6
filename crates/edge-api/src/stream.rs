//! Chat stream records and the newline-delimited decoder

use crate::types::Citation;
use serde::{Deserialize, Serialize};

/// One record of the `POST /chat` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text to append to the assistant reply
    Token { data: String },
    /// Full citation list, replacing any previous one
    Citation { data: Vec<Citation> },
    /// Performance summary
    Meta { tps: f64, duration: f64 },
    /// Generation finished
    Done,
    /// Backend failed while generating
    Error { message: String },
    /// Any other tag; ignored by consumers
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Check if this event ends the reply
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}

/// Parse one complete line. Blank lines yield `None`.
pub fn decode_line(line: &str) -> Option<serde_json::Result<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Splits an arbitrarily chunked byte stream into complete lines.
///
/// Bytes are buffered until a `\n` arrives, so a record (or a multi-byte
/// character) split across chunks is only decoded once it is whole.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(decode_utf8)
            .collect()
    }

    /// Take the unterminated remainder at end of stream, if it holds anything
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = decode_utf8(&rest);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
