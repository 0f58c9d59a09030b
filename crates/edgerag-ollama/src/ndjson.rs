// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Newline-delimited JSON decoding for Ollama streaming responses.

use std::pin::Pin;

use bytes::Bytes;
use edgerag_core::EdgeRagError;
use futures::stream::{self, Stream, StreamExt};

use crate::types::GenerateChunk;

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateChunk, EdgeRagError>> + Send>>;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, EdgeRagError>> + Send>>;

struct Decoder {
    body: ByteStream,
    buf: Vec<u8>,
    exhausted: bool,
}

impl Decoder {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

fn parse(line: &[u8]) -> Result<GenerateChunk, EdgeRagError> {
    serde_json::from_slice(line).map_err(|e| EdgeRagError::Backend {
        message: format!("failed to parse stream line: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Decodes a byte stream into chunks, one per non-blank line.
///
/// Lines may be split across network reads; a final line without a
/// trailing newline is still decoded. The stream ends after the first error.
pub fn decode<S, E>(body: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let body: ByteStream = Box::pin(body.map(|r| {
        r.map_err(|e| EdgeRagError::Backend {
            message: format!("stream read failed: {e}"),
            source: Some(Box::new(e)),
        })
    }));
    let decoder = Decoder {
        body,
        buf: Vec::new(),
        exhausted: false,
    };

    Box::pin(stream::try_unfold(decoder, |mut d| async move {
        loop {
            if let Some(line) = d.next_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let chunk = parse(&line)?;
                return Ok(Some((chunk, d)));
            }
            if d.exhausted {
                if d.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut d.buf);
                return Ok(Some((parse(&rest)?, d)));
            }
            match d.body.next().await {
                Some(bytes) => d.buf.extend_from_slice(&bytes?),
                None => d.exhausted = true,
            }
        }
    }))
}

/// Decodes a streaming HTTP response body.
pub fn decode_response(response: reqwest::Response) -> ChunkStream {
    decode(response.bytes_stream())
}
