// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! edgerag application layer: the [`App`] context and terminal output.

pub mod app;
pub mod console;

pub use app::{App, IngestReport, load_image};
pub use console::ConsoleSink;
