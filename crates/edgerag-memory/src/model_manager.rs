// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Path resolution and availability checks for on-disk model blobs.
//!
//! Models are provisioned out of band (pushed to the device); nothing is
//! downloaded here.

use std::path::{Path, PathBuf};

use edgerag_config::EdgeRagConfig;
use edgerag_core::error::EdgeRagError;
use tracing::info;

/// Locates the embedding model, its vocabulary, and the store snapshot.
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    vocab_path: PathBuf,
    store_path: Option<PathBuf>,
}

impl ModelManager {
    /// Resolves configured paths against `app.data_dir`.
    pub fn from_config(config: &EdgeRagConfig) -> Self {
        Self {
            model_path: config.resolve_path(&config.embedding.model_path),
            vocab_path: config.resolve_path(&config.embedding.vocab_path),
            store_path: config
                .memory
                .store_path
                .as_deref()
                .map(|p| config.resolve_path(p)),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn vocab_path(&self) -> &Path {
        &self.vocab_path
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// Paths that are required but absent.
    pub fn missing(&self) -> Vec<&Path> {
        [self.model_path.as_path(), self.vocab_path.as_path()]
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }

    /// Returns true if both model and vocabulary files exist.
    pub fn is_model_available(&self) -> bool {
        self.missing().is_empty()
    }

    /// Fails with an initialization error naming every missing file.
    pub fn ensure_available(&self) -> Result<(), EdgeRagError> {
        let missing = self.missing();
        if missing.is_empty() {
            info!(
                model = %self.model_path.display(),
                vocab = %self.vocab_path.display(),
                "embedding model files present"
            );
            return Ok(());
        }
        Err(EdgeRagError::Initialization {
            component: "embedding model".to_string(),
            message: format!(
                "missing {}",
                missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }

    /// Creates the snapshot's parent directory if needed.
    pub async fn prepare_store_dir(&self) -> Result<(), EdgeRagError> {
        if let Some(parent) = self.store_path.as_deref().and_then(Path::parent) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EdgeRagError::Storage {
                    source: Box::new(e),
                }
            })?;
        }
        Ok(())
    }
}
