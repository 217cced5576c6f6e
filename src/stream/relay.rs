use std::pin::Pin;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use super::{decode_event, frame_stream, Frame};
use crate::error::RelayError;
use crate::observability::{log_relay_complete, RelayOutcome};
use crate::protocol::anthropic::stream::EventTranslator;
use crate::protocol::NormalizedEvent;
use crate::util::truncate_on_char_boundary;

type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, RelayError>> + Send>>;

const MALFORMED_PREVIEW_LEN: usize = 120;

struct RelayState {
    frames: Option<FrameStream>,
    translator: EventTranslator,
    request_id: String,
    started: Instant,
    emitted: u64,
    finished: bool,
}

impl RelayState {
    /// Release the upstream and write the completion log line.
    fn finish(&mut self, outcome: RelayOutcome) {
        self.frames = None;
        self.finished = true;
        log_relay_complete(
            &self.request_id,
            self.translator.usage(),
            outcome,
            self.emitted,
            self.started.elapsed(),
        );
    }

    fn emit(mut self, event: NormalizedEvent) -> Option<(NormalizedEvent, Self)> {
        self.emitted += 1;
        if event.is_terminal() {
            let outcome = if matches!(event, NormalizedEvent::Error(_)) {
                RelayOutcome::UpstreamError
            } else {
                RelayOutcome::Completed
            };
            self.finish(outcome);
        }
        Some((event, self))
    }
}

impl Drop for RelayState {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(
                request_id = %self.request_id,
                events = self.emitted,
                "client disconnected before the relay finished; closing upstream"
            );
            self.finish(RelayOutcome::ClientDisconnected);
        }
    }
}

/// Turn an upstream chunk stream into client events.
///
/// Exactly one terminal event (`message_stop`, `error`, or the sentinel) ends
/// the returned stream, and the upstream stream is dropped as soon as it is
/// produced. Frames that fail to decode are logged and skipped. A chunk error
/// becomes an `error` event. A clean end of input without a terminal yields
/// the sentinel.
pub fn relay_events<S>(chunks: S, request_id: String) -> impl Stream<Item = NormalizedEvent> + Send
where
    S: Stream<Item = Result<Bytes, RelayError>> + Send + 'static,
{
    let frames: FrameStream = Box::pin(frame_stream(chunks));
    let state = RelayState {
        frames: Some(frames),
        translator: EventTranslator::new(),
        request_id,
        started: Instant::now(),
        emitted: 0,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            let frames = state.frames.as_mut()?;
            let next = frames.next().await;
            match next {
                None => return state.emit(NormalizedEvent::Done),
                Some(Err(err)) => {
                    tracing::warn!(
                        request_id = %state.request_id,
                        error = %err,
                        "upstream stream failed"
                    );
                    return state.emit(NormalizedEvent::Error(err.to_string()));
                }
                Some(Ok(Frame::Terminator)) => return state.emit(NormalizedEvent::Done),
                Some(Ok(Frame::Data(payload))) => match decode_event(&payload) {
                    Ok(event) => {
                        if let Some(event) = state.translator.translate(event) {
                            return state.emit(event);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            request_id = %state.request_id,
                            error = %err,
                            payload = truncate_on_char_boundary(&payload, MALFORMED_PREVIEW_LEN),
                            "dropping malformed upstream frame"
                        );
                    }
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, RelayError>> {
        parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect()
    }

    async fn collect(parts: Vec<Result<Bytes, RelayError>>) -> Vec<NormalizedEvent> {
        relay_events(futures_util::stream::iter(parts), "req-test".into())
            .collect()
            .await
    }

    const THINKING_START: &str = "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n";
    const THINKING_DELTA: &str = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n\n";
    const THINKING_STOP: &str = "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n";
    const TEXT_DELTA: &str = "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n";
    const MESSAGE_STOP: &str = "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";

    #[tokio::test]
    async fn test_full_stream_in_order() {
        let events = collect(chunks(&[
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"model\":\"m\"}}\n\n",
            THINKING_START,
            THINKING_DELTA,
            THINKING_STOP,
            "data: {\"type\":\"ping\"}\n\n",
            TEXT_DELTA,
            MESSAGE_STOP,
        ]))
        .await;
        assert_eq!(
            events,
            vec![
                NormalizedEvent::ThinkingStart,
                NormalizedEvent::ThinkingDelta("hmm".into()),
                NormalizedEvent::ThinkingStop,
                NormalizedEvent::TextDelta("Hello".into()),
                NormalizedEvent::MessageStop,
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let events = collect(chunks(&[
            TEXT_DELTA,
            "data: {\"type\":\"content_block_delta\",\"delta\":{oops\n\n",
            TEXT_DELTA,
            MESSAGE_STOP,
        ]))
        .await;
        assert_eq!(
            events,
            vec![
                NormalizedEvent::TextDelta("Hello".into()),
                NormalizedEvent::TextDelta("Hello".into()),
                NormalizedEvent::MessageStop,
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_follows_message_stop() {
        let events = collect(chunks(&[MESSAGE_STOP, TEXT_DELTA, "data: [DONE]\n\n"])).await;
        assert_eq!(events, vec![NormalizedEvent::MessageStop]);
    }

    #[tokio::test]
    async fn test_done_sentinel_is_terminal() {
        let events = collect(chunks(&[TEXT_DELTA, "data: [DONE]\n\n", TEXT_DELTA])).await;
        assert_eq!(
            events,
            vec![NormalizedEvent::TextDelta("Hello".into()), NormalizedEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_eof_without_terminal_yields_sentinel() {
        let events = collect(chunks(&[TEXT_DELTA, "data: {\"type\":\"message_st"])).await;
        assert_eq!(
            events,
            vec![NormalizedEvent::TextDelta("Hello".into()), NormalizedEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_chunk_error_becomes_single_error_event() {
        let mut parts = chunks(&[THINKING_START]);
        parts.push(Err(RelayError::UpstreamUnavailable(
            "connection reset".into(),
        )));
        parts.extend(chunks(&[TEXT_DELTA, MESSAGE_STOP]));
        let events = collect(parts).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], NormalizedEvent::ThinkingStart);
        match &events[1] {
            NormalizedEvent::Error(message) => assert!(message.contains("connection reset")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_in_stream_upstream_error_is_terminal() {
        let events = collect(chunks(&[
            TEXT_DELTA,
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
            TEXT_DELTA,
        ]))
        .await;
        assert_eq!(
            events,
            vec![
                NormalizedEvent::TextDelta("Hello".into()),
                NormalizedEvent::Error("Overloaded".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_for_arbitrary_chunking() {
        let body = [THINKING_START, THINKING_DELTA, THINKING_STOP, TEXT_DELTA, MESSAGE_STOP].concat();
        let bytes = body.as_bytes();
        for size in [1usize, 2, 3, 5, 17, 64, bytes.len()] {
            let parts: Vec<Result<Bytes, RelayError>> = bytes
                .chunks(size)
                .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                .collect();
            let events = collect(parts).await;
            assert_eq!(
                events.iter().filter(|event| event.is_terminal()).count(),
                1,
                "chunk size {size}"
            );
            assert_eq!(events.last(), Some(&NormalizedEvent::MessageStop));
            assert_eq!(events.len(), 5, "chunk size {size}");
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_upstream_released_at_terminal() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let upstream = futures_util::stream::iter(chunks(&[MESSAGE_STOP, TEXT_DELTA]))
            .chain(futures_util::stream::pending())
            .map(move |chunk| {
                let _ = &guard;
                chunk
            });

        let mut events = Box::pin(relay_events(upstream, "req-drop".into()));
        assert_eq!(events.next().await, Some(NormalizedEvent::MessageStop));
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_dropping_relay_releases_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(dropped.clone());
        let upstream = futures_util::stream::iter(chunks(&[TEXT_DELTA]))
            .chain(futures_util::stream::pending())
            .map(move |chunk| {
                let _ = &guard;
                chunk
            });

        let mut events = Box::pin(relay_events(upstream, "req-gone".into()));
        assert_eq!(
            events.next().await,
            Some(NormalizedEvent::TextDelta("Hello".into()))
        );
        assert!(!dropped.load(Ordering::SeqCst));
        drop(events);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
