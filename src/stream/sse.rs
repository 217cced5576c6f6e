//! SSE frame reassembly over an arbitrarily chunked byte stream.
//!
//! Chunks are appended to a byte buffer that survives chunk boundaries. The
//! buffer is scanned for blank-line separators (`\n\n` or `\r\n\r\n`); each
//! region before a separator becomes one [`Frame`]. Residue without a
//! separator waits for the next chunk and is dropped at end of stream.

use std::collections::VecDeque;
use std::sync::LazyLock;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use memchr::memmem;

use super::Frame;

/// Incremental frame reassembler.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: BytesMut,
    scan_from: usize,
}

impl FrameReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Feed one chunk and return the frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk and append completed frames to a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<Frame>) {
        self.buffer.extend_from_slice(chunk);
        while let Some((frame_end, separator_len)) =
            find_frame_separator_from(&self.buffer, self.scan_from)
        {
            let frame = self.buffer.split_to(frame_end + separator_len);
            self.scan_from = 0;
            if let Some(parsed) = Frame::parse(&frame[..frame_end]) {
                out.push(parsed);
            }
        }
        // Keep a short overlap so separators spanning chunks are still found.
        self.scan_from = self.buffer.len().saturating_sub(3);
    }

    /// Number of bytes waiting for a separator.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop unterminated residue at end of stream, returning its length.
    pub fn finish(&mut self) -> usize {
        let residue = self.buffer.len();
        if residue > 0 {
            tracing::debug!(
                residue_bytes = residue,
                "discarding unterminated SSE residue at end of stream"
            );
        }
        self.buffer.clear();
        self.scan_from = 0;
        residue
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Earliest blank line at or after `scan_from`, as `(frame_end, separator_len)`.
///
/// `\n\n`, `\r\n\r\n` and the mixed `\n\r\n` all end a frame. A `\r\n\n`
/// ending is found through its `\n\n` and leaves a trailing `\r` that
/// [`Frame::parse`] strips. Bare `\r` line endings are not supported.
#[inline]
fn find_frame_separator_from(buffer: &[u8], scan_from: usize) -> Option<(usize, usize)> {
    static LF_LF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\n"));
    static CRLF_CRLF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\r\n\r\n"));
    static LF_CRLF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\r\n"));

    let scan_from = scan_from.min(buffer.len());
    let haystack = &buffer[scan_from..];
    [
        (&*CRLF_CRLF_FINDER, 4),
        (&*LF_LF_FINDER, 2),
        (&*LF_CRLF_FINDER, 3),
    ]
    .into_iter()
    .filter_map(|(finder, len)| finder.find(haystack).map(|rel| (scan_from + rel, len)))
    .min_by_key(|&(pos, _)| pos)
}

/// Turn a chunk stream into a stream of frames.
///
/// A chunk error is passed through once and ends the stream. Clean end of
/// input discards any unterminated residue.
pub fn frame_stream<S, E>(chunks: S) -> impl Stream<Item = Result<Frame, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    futures_util::stream::unfold(
        (
            Some(Box::pin(chunks)),
            FrameReassembler::new(),
            Vec::<Frame>::with_capacity(8),
            VecDeque::<Frame>::with_capacity(8),
        ),
        |(mut chunks, mut reassembler, mut parsed, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (chunks, reassembler, parsed, pending)));
                }

                let source = chunks.as_mut()?;
                match source.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        reassembler.feed_into(&bytes, &mut parsed);
                        pending.extend(parsed.drain(..));
                    }
                    Some(Err(err)) => {
                        reassembler.finish();
                        return Some((Err(err), (None, reassembler, parsed, pending)));
                    }
                    None => {
                        reassembler.finish();
                        return None;
                    }
                }
            }
        },
    )
}
