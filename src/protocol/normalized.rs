use bytes::Bytes;

use crate::util::push_json_string_escaped;

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Client-facing event. The closed set the browser client understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    ThinkingStart,
    ThinkingDelta(String),
    ThinkingStop,
    TextDelta(String),
    MessageStop,
    Error(String),
    /// The `[DONE]` sentinel.
    Done,
}

impl NormalizedEvent {
    /// `message_stop`, `error`, and the sentinel end a relay; nothing follows them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NormalizedEvent::MessageStop | NormalizedEvent::Error(_) | NormalizedEvent::Done
        )
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedEvent::ThinkingStart => "thinking_start",
            NormalizedEvent::ThinkingDelta(_) => "thinking_delta",
            NormalizedEvent::ThinkingStop => "thinking_stop",
            NormalizedEvent::TextDelta(_) => "text_delta",
            NormalizedEvent::MessageStop => "message_stop",
            NormalizedEvent::Error(_) => "error",
            NormalizedEvent::Done => "done",
        }
    }

    /// Append the `data: ...\n\n` frame for this event to `out`.
    pub fn encode_sse_into(&self, out: &mut String) {
        let (kind, field, value) = match self {
            NormalizedEvent::Done => {
                out.push_str(DONE_FRAME);
                return;
            }
            NormalizedEvent::ThinkingDelta(content) | NormalizedEvent::TextDelta(content) => {
                (self.kind(), Some("content"), content.as_str())
            }
            NormalizedEvent::Error(message) => (self.kind(), Some("message"), message.as_str()),
            NormalizedEvent::ThinkingStart
            | NormalizedEvent::ThinkingStop
            | NormalizedEvent::MessageStop => (self.kind(), None, ""),
        };

        out.reserve(32 + kind.len() + value.len());
        out.push_str("data: {\"type\":\"");
        out.push_str(kind);
        out.push('"');
        if let Some(field) = field {
            out.push_str(",\"");
            out.push_str(field);
            out.push_str("\":");
            push_json_string_escaped(out, value);
        }
        out.push_str("}\n\n");
    }

    #[must_use]
    pub fn to_sse_string(&self) -> String {
        let mut out = String::new();
        self.encode_sse_into(&mut out);
        out
    }

    #[must_use]
    pub fn to_sse_bytes(&self) -> Bytes {
        match self {
            NormalizedEvent::Done => Bytes::from_static(DONE_FRAME.as_bytes()),
            _ => Bytes::from(self.to_sse_string()),
        }
    }
}
