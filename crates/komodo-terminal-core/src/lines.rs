//! Line reconstruction over arbitrarily chunked byte streams.
//!
//! `\n` and `\r\n` terminate a line; a lone `\r` does not. Splitting happens
//! on bytes and each line is decoded afterwards, so a multi-byte character
//! split across chunks is decoded intact.

use std::{collections::VecDeque, pin::Pin};

use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};

/// Lazy stream of lines, ending with the first error.
pub type LineStream<E> = BoxStream<'static, Result<String, E>>;

/// Stateful splitter carrying the unterminated tail between chunks.
#[derive(Debug, Default, Clone)]
pub struct LineSplitter {
    tail: Vec<u8>,
}

impl LineSplitter {
    /// Splitter with an empty tail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // The carried tail never holds a '\n'.
        let mut cursor = self.tail.len();
        self.tail.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.tail[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + pos;
            let line = &self.tail[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            cursor = start;
        }
        self.tail.drain(..start);
        lines
    }

    /// Flush at end of stream: the remaining tail, if non-empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.tail.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.tail);
        tracing::trace!(len = tail.len(), "Flushing unterminated tail");
        Some(String::from_utf8_lossy(&tail).into_owned())
    }

    /// Bytes seen but not yet emitted as a line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.tail
    }
}

struct SplitState<S> {
    chunks: Pin<Box<S>>,
    splitter: LineSplitter,
    ready: VecDeque<String>,
    done: bool,
}

/// Turn a stream of byte chunks into a lazy stream of lines.
///
/// The next chunk is only pulled once every line of the previous chunk has
/// been consumed. A chunk error is yielded once and ends the stream.
pub fn lines<S, B, E>(chunks: S) -> LineStream<E>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    let state = SplitState {
        chunks: Box::pin(chunks),
        splitter: LineSplitter::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.done {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let completed = state.splitter.push(chunk.as_ref());
                    state.ready.extend(completed);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    let last = state.splitter.finish()?;
                    return Some((Ok(last), state));
                }
            }
        }
    })
    .boxed()
}
