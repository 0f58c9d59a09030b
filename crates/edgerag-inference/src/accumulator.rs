// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming response accumulation.
//!
//! Backends report progress either as the full text so far
//! ([`StreamingIncrement::Cumulative`]) or as the newest piece
//! ([`StreamingIncrement::Delta`]). [`ResponseAccumulator`] folds both into one
//! growing buffer and forwards trimmed snapshots to a [`StreamSink`].

use edgerag_core::error::EdgeRagError;
use edgerag_core::types::{IncrementStream, StreamingIncrement};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receives the visible response text as it grows.
///
/// `done` is true exactly once, on the final call. That call carries the
/// answer, or the error message if generation failed part way.
pub trait StreamSink: Send + Sync {
    fn emit(&self, text: &str, done: bool);
}

impl<F> StreamSink for F
where
    F: Fn(&str, bool) + Send + Sync,
{
    fn emit(&self, text: &str, done: bool) {
        self(text, done)
    }
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn emit(&self, _text: &str, _done: bool) {}
}

/// Final text of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// The caller cancelled before generation finished; `text` is partial.
    pub cancelled: bool,
}

/// Per-request buffer normalizing streamed increments.
pub struct ResponseAccumulator<'a> {
    buffer: String,
    forwarded: String,
    sink: &'a dyn StreamSink,
}

impl<'a> ResponseAccumulator<'a> {
    pub fn new(sink: &'a dyn StreamSink) -> Self {
        Self {
            buffer: String::new(),
            forwarded: String::new(),
            sink,
        }
    }

    /// Current buffer, untrimmed.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Applies one increment and forwards the result if it changed.
    ///
    /// A `Cumulative` value shorter than the buffer is ignored so the
    /// observed text never shrinks.
    pub fn push(&mut self, increment: StreamingIncrement) {
        let whitespace_only = increment.text().trim().is_empty();

        match increment {
            StreamingIncrement::Delta(piece) => self.buffer.push_str(&piece),
            StreamingIncrement::Cumulative(full) => {
                if !full.starts_with(self.buffer.as_str()) {
                    debug!(
                        buffered = self.buffer.len(),
                        incoming = full.len(),
                        "cumulative increment does not extend buffer"
                    );
                }
                if full.len() >= self.buffer.len() {
                    self.buffer = full;
                }
            }
        }

        if whitespace_only {
            return;
        }
        let visible = self.buffer.trim();
        if !visible.is_empty() && visible != self.forwarded {
            self.forwarded = visible.to_string();
            self.sink.emit(visible, false);
        }
    }

    /// Emits the final text with `done = true` and returns it.
    pub fn finish(self) -> String {
        let text = self.buffer.trim().to_string();
        self.sink.emit(&text, true);
        text
    }

    /// Pulls `stream` to completion, stopping early on cancellation.
    ///
    /// Returns [`EdgeRagError::Cancelled`] if `cancel` fires first; the
    /// buffer keeps whatever arrived before that.
    pub async fn drain(
        &mut self,
        mut stream: IncrementStream,
        cancel: &CancellationToken,
    ) -> Result<(), EdgeRagError> {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EdgeRagError::Cancelled),
                item = stream.next() => match item {
                    Some(Ok(increment)) => self.push(increment),
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Drains `stream` and finishes, mapping cancellation to a partial completion.
    pub async fn complete(
        mut self,
        stream: IncrementStream,
        cancel: &CancellationToken,
    ) -> Result<Completion, EdgeRagError> {
        let cancelled = match self.drain(stream, cancel).await {
            Ok(()) => false,
            Err(EdgeRagError::Cancelled) => true,
            Err(e) => return Err(e),
        };
        Ok(Completion {
            text: self.finish(),
            cancelled,
        })
    }
}
