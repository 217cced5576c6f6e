pub mod relay;
pub mod sse;

pub use relay::relay_events;
pub use sse::{frame_stream, FrameReassembler};

use crate::error::RelayError;
use crate::protocol::anthropic::AnthropicStreamEvent;

/// Payload that marks the end of the upstream stream.
pub const TERMINATOR: &str = "[DONE]";

/// One complete SSE frame from the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `data: [DONE]`
    Terminator,
    /// Concatenated `data:` payload, expected to be JSON.
    Data(String),
}

impl Frame {
    /// Parse the text of one frame (without its blank-line separator).
    ///
    /// Only `data:` lines carry payload. One space after the colon is
    /// stripped and multiple `data:` lines are joined with `\n`. Returns
    /// `None` for frames without any `data:` line (comments, `event:` only).
    #[must_use]
    pub fn parse(raw: &[u8]) -> Option<Frame> {
        let text = String::from_utf8_lossy(raw);

        let mut data: Option<String> = None;
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some(value) = line.strip_prefix("data:") else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }

        let data = data?;
        if data.trim() == TERMINATOR {
            Some(Frame::Terminator)
        } else {
            Some(Frame::Data(data))
        }
    }
}

/// Decode a frame payload into a typed upstream event.
///
/// # Errors
///
/// Returns [`RelayError::FrameDecode`] when the payload is not a JSON object
/// with a string `type` field.
pub fn decode_event(payload: &str) -> Result<AnthropicStreamEvent, RelayError> {
    serde_json::from_str(payload).map_err(|err| RelayError::FrameDecode(err.to_string()))
}
