pub mod stream;

use serde::{Deserialize, Serialize};

use crate::conversation::Turn;

/// Messages API request body.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u64,
    pub messages: &'a [Turn],
    #[serde(skip_serializing_if = "is_blank")]
    pub system: &'a str,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

/// Extended-thinking switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub budget_tokens: u64,
}

impl ThinkingConfig {
    #[must_use]
    pub fn enabled(budget_tokens: u64) -> Self {
        Self {
            type_: "enabled",
            budget_tokens,
        }
    }
}

/// Anthropic SSE stream event.
///
/// Event types this relay has no use for land in [`AnthropicStreamEvent::Unknown`]
/// rather than failing deserialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart {
        #[serde(default)]
        message: Option<AnthropicMessageStart>,
    },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        #[serde(default)]
        index: usize,
        content_block: AnthropicContentBlock,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta {
        #[serde(default)]
        index: usize,
        delta: AnthropicDelta,
    },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop {
        #[serde(default)]
        index: usize,
        #[serde(default)]
        content_block: Option<AnthropicContentBlock>,
    },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    #[serde(rename = "message_stop")]
    MessageStop {},
    #[serde(rename = "ping")]
    Ping {},
    #[serde(rename = "error")]
    Error { error: AnthropicErrorBody },
    #[serde(other)]
    Unknown,
}

/// Message start payload. Only the parts worth logging are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicMessageStart {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block header carried by `content_block_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "thinking")]
    Thinking {},
    #[serde(rename = "text")]
    Text {},
    #[serde(other)]
    Other,
}

/// Delta variants for content block deltas.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

/// Error body in stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let turns = vec![Turn::user("hi")];
        let body = MessagesRequest {
            model: "claude-3-7-sonnet-20250219",
            max_tokens: 20_000,
            messages: &turns,
            system: "be nice",
            stream: true,
            thinking: Some(ThinkingConfig::enabled(16_000)),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "claude-3-7-sonnet-20250219");
        assert_eq!(json["max_tokens"], 20_000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["system"], "be nice");
        assert_eq!(json["stream"], true);
        assert_eq!(json["thinking"]["type"], "enabled");
        assert_eq!(json["thinking"]["budget_tokens"], 16_000);
    }

    #[test]
    fn test_request_body_omits_disabled_thinking_and_empty_system() {
        let turns = vec![Turn::user("hi")];
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            messages: &turns,
            system: "",
            stream: false,
            thinking: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("thinking").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_parse_full_event_set() {
        let start: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","model":"claude","content":[],"usage":{"input_tokens":12,"output_tokens":1}}}"#,
        )
        .unwrap();
        match start {
            AnthropicStreamEvent::MessageStart { message: Some(m) } => {
                assert_eq!(m.model.as_deref(), Some("claude"));
                assert_eq!(m.usage.and_then(|u| u.input_tokens), Some(12));
            }
            other => panic!("unexpected {other:?}"),
        }

        let block: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":"","signature":""}}"#,
        )
        .unwrap();
        assert!(matches!(
            block,
            AnthropicStreamEvent::ContentBlockStart {
                index: 0,
                content_block: AnthropicContentBlock::Thinking {}
            }
        ));

        let delta: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"signature_delta","signature":"abc"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            AnthropicStreamEvent::ContentBlockDelta {
                index: 1,
                delta: AnthropicDelta::Other
            }
        ));

        let stop: AnthropicStreamEvent =
            serde_json::from_str(r#"{"type":"message_stop"}"#).unwrap();
        assert!(matches!(stop, AnthropicStreamEvent::MessageStop {}));
    }

    #[test]
    fn test_unknown_event_type_parses() {
        let event: AnthropicStreamEvent =
            serde_json::from_str(r#"{"type":"brand_new_event","payload":{"x":1}}"#).unwrap();
        assert!(matches!(event, AnthropicStreamEvent::Unknown));
    }

    #[test]
    fn test_unknown_block_kind_parses() {
        let event: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"t","name":"n","input":{}}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            AnthropicStreamEvent::ContentBlockStart {
                content_block: AnthropicContentBlock::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_error_event_parses() {
        let event: AnthropicStreamEvent = serde_json::from_str(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap();
        match event {
            AnthropicStreamEvent::Error { error } => {
                assert_eq!(error.type_, "overloaded_error");
                assert_eq!(error.message, "Overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
