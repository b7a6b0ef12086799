//! Decoding of server-sent-event streams into response events.
//!
//! Backends stream their answer as `data: <json>` frames separated by a
//! blank line, where the JSON payload looks like:
//!
//! ```json
//! { "text": "...", "function_call": { "id": "...", "name": "...", "arguments": "..." }, "token_usage": { ... } }
//! ```
//!
//! [`FrameDecoder`] is a pure state machine: feed it bytes as they arrive
//! and it hands back the events that became complete. It never assumes
//! that a read boundary lines up with a frame boundary.

use std::error::Error;
use std::fmt::{self, Display};
use std::mem;

use serde::Deserialize;

use crate::{ModelResponseEvent, TokenUsage, ToolCall};

const DELIMITER: &[u8] = b"\n\n";
const DATA_FIELD: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// An error raised when the stream violates the frame contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// A frame is not valid UTF-8.
    InvalidUtf8,
    /// A frame payload is not a valid JSON frame object.
    InvalidJson {
        /// The offending payload.
        payload: String,
        /// Why the payload could not be parsed.
        reason: String,
    },
}

impl Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidUtf8 => write!(f, "frame is not valid UTF-8"),
            FrameError::InvalidJson { payload, reason } => {
                write!(f, "invalid frame payload `{payload}`: {reason}")
            }
        }
    }
}

impl Error for FrameError {}

#[derive(Deserialize)]
struct WireFrame {
    text: Option<String>,
    function_call: Option<ToolCall>,
    token_usage: Option<TokenUsage>,
}

/// An incremental decoder for `data: <json>` frames.
#[derive(Clone, Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    // Bytes of `buf` already known not to contain a delimiter.
    scanned: usize,
    done: bool,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the stream terminator has been seen.
    ///
    /// Further input is ignored after that.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds a chunk of bytes and returns the events completed by it, in
    /// arrival order.
    pub fn decode(
        &mut self,
        chunk: &[u8],
    ) -> Result<Vec<ModelResponseEvent>, FrameError> {
        let mut events = vec![];
        if self.done {
            return Ok(events);
        }
        self.buf.extend_from_slice(chunk);

        while let Some(idx) = self.find_delimiter() {
            let block: Vec<u8> = self.buf.drain(..idx + DELIMITER.len()).collect();
            self.scanned = 0;
            self.decode_block(&block[..idx], &mut events)?;
            if self.done {
                self.buf.clear();
                break;
            }
        }
        self.scanned = self.buf.len();
        Ok(events)
    }

    /// Flushes the bytes left in the buffer at the end of the stream.
    ///
    /// Some servers omit the blank line after the last frame, so whatever
    /// remains is decoded as a final frame.
    pub fn finish(&mut self) -> Result<Vec<ModelResponseEvent>, FrameError> {
        let rest = mem::take(&mut self.buf);
        self.scanned = 0;
        let mut events = vec![];
        if !self.done {
            self.decode_block(&rest, &mut events)?;
        }
        self.done = true;
        Ok(events)
    }

    fn find_delimiter(&self) -> Option<usize> {
        // A delimiter may straddle the previously scanned region.
        let start = self.scanned.saturating_sub(DELIMITER.len() - 1);
        self.buf[start..]
            .windows(DELIMITER.len())
            .position(|w| w == DELIMITER)
            .map(|pos| start + pos)
    }

    fn decode_block(
        &mut self,
        block: &[u8],
        events: &mut Vec<ModelResponseEvent>,
    ) -> Result<(), FrameError> {
        let block = str::from_utf8(block).map_err(|_| FrameError::InvalidUtf8)?;
        for line in block.split('\n') {
            let line = line.trim_end_matches('\r');
            let Some(payload) = line.strip_prefix(DATA_FIELD) else {
                // Comments, `event:`, `id:` and other fields.
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == DONE_MARKER {
                self.done = true;
                return Ok(());
            }

            let frame = serde_json::from_str::<WireFrame>(payload).map_err(
                |err| FrameError::InvalidJson {
                    payload: payload.to_owned(),
                    reason: err.to_string(),
                },
            )?;
            if let Some(text) = frame.text {
                events.push(ModelResponseEvent::TextDelta(text));
            }
            if let Some(call) = frame.function_call {
                events.push(ModelResponseEvent::FunctionCall(call));
            }
            if let Some(usage) = frame.token_usage {
                events.push(ModelResponseEvent::TokenUsage(usage));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all<B: AsRef<[u8]>>(chunks: &[B]) -> Vec<ModelResponseEvent> {
        let mut decoder = FrameDecoder::new();
        let mut events = vec![];
        for chunk in chunks {
            events.extend(decoder.decode(chunk.as_ref()).unwrap());
        }
        events.extend(decoder.finish().unwrap());
        events
    }

    fn text_of(events: &[ModelResponseEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ModelResponseEvent::TextDelta(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_normal_frames() {
        let events = decode_all(&[
            "data: {\"text\":\"Hel\"}\n\n",
            "data: {\"text\":\"lo\"}\n\n",
        ]);
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::TextDelta("Hel".to_owned()),
                ModelResponseEvent::TextDelta("lo".to_owned()),
            ]
        );
    }

    #[test]
    fn test_chunking_invariance() {
        let stream = "data: {\"text\":\"The pump \"}\n\n\
                      data: {\"text\":\"is running \"}\n\n\
                      : keep-alive\n\n\
                      data:\n\n\
                      data: {\"text\":\"at 80 °C\"}\n\n";
        let bytes = stream.as_bytes();
        let expected = "The pump is running at 80 °C";

        for size in 1..bytes.len() {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(text_of(&decode_all(&chunks[..])), expected, "size {size}");
        }
        // Every split into three pieces.
        for a in 0..bytes.len() {
            for b in a..bytes.len() {
                let chunks = [&bytes[..a], &bytes[a..b], &bytes[b..]];
                assert_eq!(text_of(&decode_all(&chunks)), expected);
            }
        }
    }

    #[test]
    fn test_frame_kinds() {
        let events = decode_all(&[
            "data: {\"function_call\":{\"id\":\"c1\",\"name\":\"list_assets\",\"arguments\":\"{}\"}}\n\n",
            "event: usage\ndata: {\"token_usage\":{\"promptTokens\":10,\"completionTokens\":2,\"totalTokens\":12}}\n\n",
        ]);
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::FunctionCall(ToolCall {
                    id: "c1".to_owned(),
                    name: "list_assets".to_owned(),
                    arguments: "{}".to_owned(),
                }),
                ModelResponseEvent::TokenUsage(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 2,
                    total_tokens: 12,
                    total_price: 0.0,
                }),
            ]
        );
    }

    #[test]
    fn test_ignored_lines() {
        let events = decode_all(&[
            "id: 1\nretry: 10\n\n",
            "data:    \n\n",
            "data: {\"text\":\"x\"}\r\n\n",
        ]);
        assert_eq!(events, vec![ModelResponseEvent::TextDelta("x".to_owned())]);
    }

    #[test]
    fn test_done_marker() {
        let mut decoder = FrameDecoder::new();
        let events = decoder
            .decode(b"data: {\"text\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"text\":\"b\"}\n\n")
            .unwrap();
        assert_eq!(events, vec![ModelResponseEvent::TextDelta("a".to_owned())]);
        assert!(decoder.is_done());
        assert!(decoder.decode(b"data: oops\n\n").unwrap().is_empty());
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[test]
    fn test_trailing_frame() {
        let events = decode_all(&["data: {\"text\":\"a\"}\n\ndata: {\"text\":\"b\"}"]);
        assert_eq!(text_of(&events), "ab");
    }

    #[test]
    fn test_split_multibyte_char() {
        let bytes = "data: {\"text\":\"héllo\"}\n\n".as_bytes();
        // Split inside the two-byte `é`.
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let events = decode_all(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(text_of(&events), "héllo");
    }

    #[test]
    fn test_invalid_payload() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.decode(b"data: {not json}\n\n").unwrap_err();
        assert!(matches!(err, FrameError::InvalidJson { ref payload, .. } if payload == "{not json}"));

        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.decode(b"data: \xff\xfe\n\n").unwrap_err(),
            FrameError::InvalidUtf8
        );

        // An incomplete frame is not an error until the stream ends.
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode(b"data: {\"te").unwrap().is_empty());
        assert!(decoder.finish().is_err());
    }
}
