// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus splitting for ingestion.

/// Splits a corpus into chunks.
///
/// A line starting with `marker` begins a new chunk; the marker is removed
/// and the remainder trimmed. Every other line is appended to the current
/// chunk after a single space. Chunks that end up blank are dropped.
pub fn split_chunks(corpus: &str, marker: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in corpus.lines() {
        if let Some(rest) = line.strip_prefix(marker) {
            push_chunk(&mut chunks, &mut current);
            current.push_str(rest.trim());
        } else {
            current.push(' ');
            current.push_str(line);
        }
    }
    push_chunk(&mut chunks, &mut current);

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, current: &mut String) {
    let text = current.trim();
    if !text.is_empty() {
        chunks.push(text.to_string());
    }
    current.clear();
}
