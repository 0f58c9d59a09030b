// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory vector store with optional SQLite snapshots.

use std::path::Path;

use edgerag_core::error::EdgeRagError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::types::{MemoryChunk, ScoredChunk, blob_to_vec, cosine_similarity, vec_to_blob};

/// Helper to convert tokio_rusqlite errors into EdgeRagError::Storage.
fn storage_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> EdgeRagError {
    EdgeRagError::Storage {
        source: Box::new(e),
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
        position INTEGER PRIMARY KEY NOT NULL,
        id TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL
    );
    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );";

/// Ordered collection of `(text, vector)` records, all of dimension `D`.
///
/// Exhaustive cosine search; ties keep insertion order.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dims: usize,
    chunks: Vec<MemoryChunk>,
}

impl VectorStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            chunks: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[MemoryChunk] {
        &self.chunks
    }

    /// Appends a record. Rejects vectors whose length is not `D`.
    pub fn insert(&mut self, chunk: MemoryChunk) -> Result<(), EdgeRagError> {
        self.check_dims(&chunk.embedding)?;
        self.chunks.push(chunk);
        Ok(())
    }

    /// Appends all records or none.
    pub fn insert_all(&mut self, chunks: Vec<MemoryChunk>) -> Result<(), EdgeRagError> {
        for chunk in &chunks {
            self.check_dims(&chunk.embedding)?;
        }
        self.chunks.extend(chunks);
        Ok(())
    }

    /// Top `k` records with similarity `>= min_score`, best first.
    pub fn search(&self, query: &[f32], k: usize, min_score: f32) -> Vec<ScoredChunk> {
        if k == 0 || query.len() != self.dims {
            return Vec::new();
        }

        let mut results: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let score = cosine_similarity(query, &chunk.embedding);
                (score >= min_score).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();

        // Stable sort: equal scores stay in insertion order.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        results
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    fn check_dims(&self, v: &[f32]) -> Result<(), EdgeRagError> {
        if v.len() == self.dims {
            Ok(())
        } else {
            Err(EdgeRagError::Embedding(format!(
                "vector has {} components, store expects {}",
                v.len(),
                self.dims
            )))
        }
    }

    /// Writes the store to a SQLite file, replacing any previous snapshot.
    pub async fn save(&self, path: &Path) -> Result<(), EdgeRagError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| EdgeRagError::Storage {
                source: Box::new(e),
            })?;
        let dims = self.dims;
        let rows: Vec<(i64, String, String, Vec<u8>)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(pos, c)| (pos as i64, c.id.clone(), c.text.clone(), vec_to_blob(&c.embedding)))
            .collect();
        let count = rows.len();

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(SCHEMA)?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM chunks", [])?;
            tx.execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('dimensions', ?1)",
                rusqlite::params![dims.to_string()],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chunks (position, id, text, embedding) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (pos, id, text, blob) in rows {
                    stmt.execute(rusqlite::params![pos, id, text, blob])?;
                }
            }
            tx.commit()
        })
        .await
        .map_err(storage_err)?;

        debug!(path = %path.display(), chunks = count, "vector store saved");
        Ok(())
    }

    /// Reads a snapshot written by [`save`](Self::save).
    ///
    /// Fails if the snapshot was written with a different dimension.
    pub async fn load(path: &Path, dims: usize) -> Result<Self, EdgeRagError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| EdgeRagError::Storage {
                source: Box::new(e),
            })?;
        let (stored_dims, rows) = conn
            .call(
                |conn| -> Result<(Option<String>, Vec<MemoryChunk>), rusqlite::Error> {
                    conn.execute_batch(SCHEMA)?;
                    let stored_dims = conn
                        .query_row(
                            "SELECT value FROM store_meta WHERE key = 'dimensions'",
                            [],
                            |row| row.get::<_, String>(0),
                        )
                        .map(Some)
                        .or_else(|e| match e {
                            rusqlite::Error::QueryReturnedNoRows => Ok(None),
                            other => Err(other),
                        })?;
                    let mut stmt = conn
                        .prepare("SELECT id, text, embedding FROM chunks ORDER BY position")?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok(MemoryChunk {
                                id: row.get(0)?,
                                text: row.get(1)?,
                                embedding: blob_to_vec(&row.get::<_, Vec<u8>>(2)?),
                            })
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok((stored_dims, rows))
                },
            )
            .await
            .map_err(storage_err)?;

        if let Some(stored) = stored_dims
            && stored != dims.to_string()
        {
            return Err(EdgeRagError::Config(format!(
                "snapshot {} holds {stored}-dimension vectors, expected {dims}",
                path.display()
            )));
        }

        let mut store = Self::new(dims);
        store.insert_all(rows)?;
        debug!(path = %path.display(), chunks = store.len(), "vector store loaded");
        Ok(store)
    }
}
