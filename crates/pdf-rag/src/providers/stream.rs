//! Line-oriented decoding of streamed HTTP bodies (NDJSON and SSE)

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;

use crate::error::{Error, Result};

use super::llm::FragmentStream;

/// What a single body line means to the caller
#[derive(Debug, PartialEq)]
pub(crate) enum LineEvent {
    /// Text to hand to the consumer
    Fragment(String),
    /// Keep-alive, metadata, or anything without text
    Skip,
    /// Provider signalled the end of generation
    Done,
    /// Provider reported an error in-band
    Failed(String),
}

type LineParser = Box<dyn FnMut(&str) -> LineEvent + Send>;

struct DecoderState {
    model: String,
    bytes: BoxStream<'static, std::result::Result<Bytes, String>>,
    buf: Vec<u8>,
    pending: VecDeque<Result<String>>,
    parse: LineParser,
    finished: bool,
}

impl DecoderState {
    /// Parse every complete line in the buffer; with `flush`, the remainder too
    fn drain_lines(&mut self, flush: bool) {
        while !self.finished {
            let line = match self.buf.iter().position(|b| *b == b'\n') {
                Some(pos) => self.buf.drain(..=pos).collect::<Vec<u8>>(),
                None if flush && !self.buf.is_empty() => std::mem::take(&mut self.buf),
                None => break,
            };

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match (self.parse)(text) {
                LineEvent::Fragment(fragment) => {
                    if !fragment.is_empty() {
                        self.pending.push_back(Ok(fragment));
                    }
                }
                LineEvent::Skip => {}
                LineEvent::Done => {
                    self.finished = true;
                    self.buf.clear();
                }
                LineEvent::Failed(message) => {
                    self.pending
                        .push_back(Err(Error::generation_interrupted(&self.model, message)));
                    self.finished = true;
                    self.buf.clear();
                }
            }
        }
    }
}

/// Turn a streamed response body into a [`FragmentStream`].
///
/// Lines may span byte chunks. Fragments are yielded as soon as their line
/// is complete; nothing is read ahead of the consumer.
pub(crate) fn decode_lines<S, E, F>(model: impl Into<String>, bytes: S, parse: F) -> FragmentStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    F: FnMut(&str) -> LineEvent + Send + 'static,
{
    let state = DecoderState {
        model: model.into(),
        bytes: bytes.map(|chunk| chunk.map_err(|e| e.to_string())).boxed(),
        buf: Vec::new(),
        pending: VecDeque::new(),
        parse: Box::new(parse),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buf.extend_from_slice(&chunk);
                    state.drain_lines(false);
                }
                Some(Err(message)) => {
                    state.finished = true;
                    let err = Error::generation_interrupted(&state.model, format!("Stream error: {}", message));
                    return Some((Err(err), state));
                }
                None => {
                    state.drain_lines(true);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
