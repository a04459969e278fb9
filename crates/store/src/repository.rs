//! Record persistence backends.
//!
//! [`RecordRepository`] stores whole [`TargetRecord`]s by target id. It does
//! no locking of its own; [`ResultStore`](crate::ResultStore) serializes
//! read-modify-write cycles on top of it.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use litterbox_core::record::TargetRecord;
use litterbox_core::types::TargetId;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;

const RECORD_EXT: &str = "json";

/// Storage for per-target records.
pub trait RecordRepository: Send + Sync + 'static {
    /// Load the record for `id`, or `None` when there is none.
    fn get(
        &self,
        id: &TargetId,
    ) -> impl Future<Output = Result<Option<TargetRecord>, StoreError>> + Send;

    /// Replace the record for `record.target.id`. Readers observe either the
    /// previous record or this one, never a mix.
    fn put(&self, record: &TargetRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the record for `id`. Returns whether one existed.
    fn delete(&self, id: &TargetId) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Every stored record, in no particular order.
    fn list(&self) -> impl Future<Output = Result<Vec<TargetRecord>, StoreError>> + Send;
}

/// One JSON document per target in a directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the record, so a crash mid-write leaves the old record intact.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Open (creating if needed) a repository rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &TargetId) -> Result<PathBuf, StoreError> {
        if !id.is_path_safe() {
            return Err(StoreError::read(id.as_str(), "id is not a safe file name"));
        }
        Ok(self.dir.join(format!("{id}.{RECORD_EXT}")))
    }
}

impl RecordRepository for JsonFileRepository {
    async fn get(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::read(id.as_str(), e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::corrupt(id.as_str(), e))
    }

    async fn put(&self, record: &TargetRecord) -> Result<(), StoreError> {
        let id = &record.target.id;
        let path = self.path_for(id).map_err(|e| StoreError::write(id.as_str(), e))?;
        let json = serde_json::to_vec_pretty(record).map_err(|e| StoreError::write(id.as_str(), e))?;

        let dir = self.dir.clone();
        let key = id.to_string();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &json))
            .await
            .map_err(|e| StoreError::write(&key, e))?
            .map_err(|e| StoreError::write(&key, e))?;
        debug!(target_id = %id, "record written");
        Ok(())
    }

    async fn delete(&self, id: &TargetId) -> Result<bool, StoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::write(id.as_str(), e)),
        }
    }

    async fn list(&self) -> Result<Vec<TargetRecord>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.get(&TargetId::new(stem)).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}

/// Write `bytes` to `path` through a synced temp file in `dir`.
pub(crate) fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".litterbox-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory records, for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    records: Arc<RwLock<BTreeMap<TargetId, TargetRecord>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordRepository for MemoryRepository {
    async fn get(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, record: &TargetRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.target.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &TargetId) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<TargetRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
