use smallvec::SmallVec;

use super::{AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent};
use crate::observability::RelayUsage;
use crate::protocol::NormalizedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Thinking,
    Other,
}

impl From<AnthropicContentBlock> for BlockKind {
    fn from(block: AnthropicContentBlock) -> Self {
        match block {
            AnthropicContentBlock::Thinking {} => BlockKind::Thinking,
            AnthropicContentBlock::Text {} | AnthropicContentBlock::Other => BlockKind::Other,
        }
    }
}

/// Maps Anthropic stream events onto [`NormalizedEvent`]s.
///
/// `content_block_stop` only carries an index, so block kinds seen on
/// `content_block_start` are remembered until their stop arrives. Indices are
/// upstream data and are only ever compared, never used for sizing. Usage from
/// `message_start` and `message_delta` is collected for the completion log.
#[derive(Debug, Default)]
pub struct EventTranslator {
    block_kinds: SmallVec<[(usize, BlockKind); 4]>,
    usage: RelayUsage,
}

impl EventTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn usage(&self) -> &RelayUsage {
        &self.usage
    }

    /// Translate one upstream event into zero or one client event.
    pub fn translate(&mut self, event: AnthropicStreamEvent) -> Option<NormalizedEvent> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(message) = message {
                    if let Some(model) = message.model {
                        self.usage.model = Some(model);
                    }
                    if let Some(usage) = message.usage {
                        self.usage.merge(&usage);
                    }
                }
                None
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let kind = BlockKind::from(content_block);
                self.set_block_kind(index, kind);
                (kind == BlockKind::Thinking).then_some(NormalizedEvent::ThinkingStart)
            }
            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicDelta::ThinkingDelta { thinking } => {
                    Some(NormalizedEvent::ThinkingDelta(thinking))
                }
                AnthropicDelta::TextDelta { text } => Some(NormalizedEvent::TextDelta(text)),
                AnthropicDelta::Other => None,
            },
            AnthropicStreamEvent::ContentBlockStop {
                index,
                content_block,
            } => {
                let remembered = self.take_block_kind(index);
                let kind = content_block.map(BlockKind::from).or(remembered);
                (kind == Some(BlockKind::Thinking)).then_some(NormalizedEvent::ThinkingStop)
            }
            AnthropicStreamEvent::MessageDelta { usage } => {
                if let Some(usage) = usage {
                    self.usage.merge(&usage);
                }
                None
            }
            AnthropicStreamEvent::MessageStop {} => Some(NormalizedEvent::MessageStop),
            AnthropicStreamEvent::Error { error } => {
                let message = if error.message.is_empty() {
                    format!("Upstream stream error: {}", error.type_)
                } else {
                    error.message
                };
                Some(NormalizedEvent::Error(message))
            }
            AnthropicStreamEvent::Ping {} | AnthropicStreamEvent::Unknown => None,
        }
    }

    fn set_block_kind(&mut self, index: usize, kind: BlockKind) {
        match self.block_kinds.iter_mut().find(|(open, _)| *open == index) {
            Some(slot) => slot.1 = kind,
            None => self.block_kinds.push((index, kind)),
        }
    }

    fn take_block_kind(&mut self, index: usize) -> Option<BlockKind> {
        let position = self
            .block_kinds
            .iter()
            .position(|(open, _)| *open == index)?;
        Some(self.block_kinds.swap_remove(position).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> AnthropicStreamEvent {
        serde_json::from_str(json).expect("valid event")
    }

    fn run(events: &[&str]) -> Vec<NormalizedEvent> {
        let mut translator = EventTranslator::new();
        events
            .iter()
            .filter_map(|json| translator.translate(event(json)))
            .collect()
    }

    #[test]
    fn test_dispatch_table() {
        let out = run(&[
            r#"{"type":"message_start","message":{"model":"claude","usage":{"input_tokens":5,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Let me think"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Hello"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":42}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(
            out,
            vec![
                NormalizedEvent::ThinkingStart,
                NormalizedEvent::ThinkingDelta("Let me think".into()),
                NormalizedEvent::ThinkingStop,
                NormalizedEvent::TextDelta("Hello".into()),
                NormalizedEvent::MessageStop,
            ]
        );
    }

    #[test]
    fn test_text_block_stop_is_silent() {
        let out = run(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_stop_for_unseen_index_is_silent() {
        assert!(run(&[r#"{"type":"content_block_stop","index":7}"#]).is_empty());
    }

    #[test]
    fn test_inline_block_on_stop_is_honored() {
        let out = run(&[
            r#"{"type":"content_block_stop","index":3,"content_block":{"type":"thinking"}}"#,
        ]);
        assert_eq!(out, vec![NormalizedEvent::ThinkingStop]);
    }

    #[test]
    fn test_thinking_stop_emitted_once_per_block() {
        let out = run(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_stop","index":0}"#,
        ]);
        assert_eq!(
            out,
            vec![NormalizedEvent::ThinkingStart, NormalizedEvent::ThinkingStop]
        );
    }

    #[test]
    fn test_huge_block_index_is_tracked_without_allocation() {
        let max = usize::MAX;
        let start = format!(
            r#"{{"type":"content_block_start","index":{max},"content_block":{{"type":"thinking"}}}}"#
        );
        let stop = format!(r#"{{"type":"content_block_stop","index":{max}}}"#);
        let far_start = r#"{"type":"content_block_start","index":1099511627776,"content_block":{"type":"text"}}"#;
        let out = run(&[start.as_str(), far_start, stop.as_str()]);
        assert_eq!(
            out,
            vec![NormalizedEvent::ThinkingStart, NormalizedEvent::ThinkingStop]
        );
    }

    #[test]
    fn test_interleaved_blocks_keep_their_kinds() {
        let out = run(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"text"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"content_block_stop","index":0}"#,
        ]);
        assert_eq!(
            out,
            vec![NormalizedEvent::ThinkingStart, NormalizedEvent::ThinkingStop]
        );
    }

    #[test]
    fn test_unknown_types_are_ignored() {
        let out = run(&[
            r#"{"type":"future_event","foo":"bar"}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"server_tool_use"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{"}}"#,
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_error_event_becomes_error() {
        let out = run(&[
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ]);
        assert_eq!(out, vec![NormalizedEvent::Error("Overloaded".into())]);

        let out = run(&[r#"{"type":"error","error":{"type":"api_error"}}"#]);
        assert_eq!(
            out,
            vec![NormalizedEvent::Error(
                "Upstream stream error: api_error".into()
            )]
        );
    }

    #[test]
    fn test_usage_is_recorded() {
        let mut translator = EventTranslator::new();
        translator.translate(event(
            r#"{"type":"message_start","message":{"model":"claude-3-7","usage":{"input_tokens":12,"output_tokens":1}}}"#,
        ));
        translator.translate(event(
            r#"{"type":"message_delta","delta":{},"usage":{"output_tokens":99}}"#,
        ));
        let usage = translator.usage();
        assert_eq!(usage.model.as_deref(), Some("claude-3-7"));
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(99));
    }
}
