// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streams answer text to a terminal.

use std::io::Write;
use std::sync::Mutex;

use edgerag_inference::StreamSink;

/// Prints only the newly visible part of each update.
///
/// When an update does not extend what was printed (an error message after
/// a partial answer), the new text starts on a fresh line.
pub struct ConsoleSink<W: Write + Send> {
    inner: Mutex<Printed<W>>,
}

struct Printed<W> {
    out: W,
    text: String,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: Mutex::new(Printed {
                out,
                text: String::new(),
            }),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
            .into_inner()
            .unwrap_or_else(|p| p.into_inner())
            .out
    }
}

impl<W: Write + Send> StreamSink for ConsoleSink<W> {
    fn emit(&self, text: &str, done: bool) {
        let mut printed = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let Printed { out, text: shown } = &mut *printed;

        // Terminal write failures are not worth aborting an answer for.
        if let Some(rest) = text.strip_prefix(shown.as_str()) {
            let _ = out.write_all(rest.as_bytes());
        } else {
            let _ = writeln!(out);
            let _ = out.write_all(text.as_bytes());
        }
        shown.clear();
        shown.push_str(text);

        if done {
            let _ = writeln!(out);
            shown.clear();
        }
        let _ = out.flush();
    }
}
