//! Block-hash similarity against a reference corpus.
//!
//! Every reference file is cut into fixed-size blocks and the SHA-256 of
//! each block is stored. A target's similarity to a reference is the share of
//! the target's blocks that also occur somewhere in the reference.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use litterbox_core::record::FuzzyMatch;

use crate::error::EngineError;

/// The on-disk database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyDb {
    pub block_size: usize,
    /// Reference path (relative to the corpus root) -> block hashes.
    pub references: BTreeMap<String, Vec<String>>,
}

impl FuzzyDb {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            references: BTreeMap::new(),
        }
    }

    /// Hash every regular file under `dir`, recursively.
    pub async fn build(dir: &Path, block_size: usize) -> Result<Self, EngineError> {
        if block_size == 0 {
            return Err(db_error(dir, "block size must be greater than zero"));
        }
        let mut db = Self::new(block_size);
        let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let data = tokio::fs::read(&path).await?;
                    let key = path
                        .strip_prefix(dir)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    debug!(reference = %key, bytes = data.len(), "hashing reference");
                    db.references.insert(key, block_hashes(&data, block_size));
                }
            }
        }

        info!(references = db.references.len(), block_size, "fuzzy database built");
        Ok(db)
    }

    pub async fn load(path: &Path) -> Result<Self, EngineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| db_error(path, e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| db_error(path, format!("corrupt database: {e}")))
    }

    /// Write the database next to `path` and rename it into place.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_vec(self).map_err(|e| db_error(path, e.to_string()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".litterbox-fuzzy-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// References sharing at least `threshold` percent of `data`'s blocks,
    /// most similar first.
    pub fn analyze(&self, data: &[u8], threshold: f64) -> Vec<FuzzyMatch> {
        let target = block_hashes(data, self.block_size);
        if target.is_empty() {
            return Vec::new();
        }
        let total = target.len();

        let mut matches: Vec<FuzzyMatch> = self
            .references
            .iter()
            .filter_map(|(reference, blocks)| {
                let known: HashSet<&str> = blocks.iter().map(String::as_str).collect();
                let matching = target.iter().filter(|h| known.contains(h.as_str())).count();
                let similarity = round2(matching as f64 * 100.0 / total as f64);
                (matching > 0 && similarity >= threshold).then(|| FuzzyMatch {
                    reference: reference.clone(),
                    similarity,
                    matching_blocks: matching,
                    total_blocks: total,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        if matches.is_empty() {
            debug!(total_blocks = total, threshold, "no fuzzy matches");
        }
        matches
    }
}

fn db_error(path: &Path, reason: impl Into<String>) -> EngineError {
    EngineError::FuzzyDb {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// SHA-256 of each `block_size` chunk; the last chunk may be short.
pub fn block_hashes(data: &[u8], block_size: usize) -> Vec<String> {
    data.chunks(block_size.max(1))
        .map(|block| hex::encode(Sha256::digest(block)))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
