// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [`StreamSink`] that records every call for later assertions.

use std::sync::Mutex;

use edgerag_inference::StreamSink;

#[derive(Debug, Default)]
pub struct CollectingSink {
    calls: Mutex<Vec<(String, bool)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(text, done)` pair received, in order.
    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Text of the final call, if `done` was received.
    pub fn final_text(&self) -> Option<String> {
        self.calls()
            .into_iter()
            .find(|(_, done)| *done)
            .map(|(text, _)| text)
    }

    pub fn done_count(&self) -> usize {
        self.calls().iter().filter(|(_, done)| *done).count()
    }

    /// Returns true if no call ever shortened the visible text.
    pub fn is_monotonic(&self) -> bool {
        self.calls()
            .windows(2)
            .all(|w| w[1].0.starts_with(w[0].0.as_str()))
    }
}

impl StreamSink for CollectingSink {
    fn emit(&self, text: &str, done: bool) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((text.to_string(), done));
    }
}
