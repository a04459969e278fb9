//! Target registration, lookup and deletion.
//!
//! Files are identified by the MD5 of their content, so uploading the same
//! bytes twice (under any name) yields the same target and one stored copy.
//! Live processes are identified by their pid.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use litterbox_core::config::LitterboxConfig;
use litterbox_core::driver::DriverVerdict;
use litterbox_core::metrics as m;
use litterbox_core::record::TargetRecord;
use litterbox_core::target::{AnalysisTarget, FileCategory};
use litterbox_core::types::{AnalysisType, RiskAssessment, RiskLevel, TargetId, TargetKind};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::inspect::{self, filetype};
use crate::repository::{RecordRepository, write_atomic};
use crate::result_store::ResultStore;

const PROCESS_MIME: &str = "application/x-process";

/// Returns whether a pid names a live process.
pub type LivenessCheck = fn(u32) -> bool;

/// Upload rules and the artifact directory.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub upload_dir: PathBuf,
    /// Lower-case, without the dot.
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
}

impl RegistryOptions {
    pub fn from_config(config: &LitterboxConfig) -> Self {
        Self {
            upload_dir: config.upload_dir(),
            allowed_extensions: config
                .storage
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_upload_bytes: config.storage.max_upload_bytes,
        }
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub target: AnalysisTarget,
    /// `false` when the target already existed.
    pub created: bool,
}

/// One line of the target overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub id: TargetId,
    pub kind: TargetKind,
    pub name: String,
    pub category: FileCategory,
    pub created_at: DateTime<Utc>,
    /// Analysis types with stored results.
    pub analyses: Vec<AnalysisType>,
    /// Level of the most recently finished static or dynamic assessment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_verdict: Option<DriverVerdict>,
}

impl TargetSummary {
    fn of(record: &TargetRecord) -> Self {
        let risk = latest_risk(record);
        Self {
            id: record.target.id.clone(),
            kind: record.target.kind,
            name: record.target.name.clone(),
            category: record.target.category,
            created_at: record.target.created_at,
            analyses: record.completed_types(),
            risk_level: risk.map(|r| r.level),
            risk_score: risk.map(|r| r.score),
            driver_verdict: record.holygrail.as_ref().map(|h| h.assessment.verdict),
        }
    }
}

fn latest_risk(record: &TargetRecord) -> Option<&RiskAssessment> {
    let finished = |job_id| record.job(job_id).and_then(|j| j.finished_at);
    let static_risk = record
        .static_analysis
        .as_ref()
        .map(|s| (finished(s.job_id), &s.risk_assessment));
    let dynamic_risk = record
        .dynamic
        .as_ref()
        .map(|d| (finished(d.job_id), &d.risk_assessment));
    [static_risk, dynamic_risk]
        .into_iter()
        .flatten()
        .max_by_key(|(at, _)| *at)
        .map(|(_, risk)| risk)
}

pub struct TargetRegistry<R: RecordRepository> {
    store: Arc<ResultStore<R>>,
    options: RegistryOptions,
    liveness: LivenessCheck,
}

impl<R: RecordRepository> TargetRegistry<R> {
    /// Create the registry, making sure the upload directory exists.
    pub async fn open(
        store: Arc<ResultStore<R>>,
        options: RegistryOptions,
        liveness: LivenessCheck,
    ) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&options.upload_dir).await?;
        Ok(Self {
            store,
            options,
            liveness,
        })
    }

    pub fn store(&self) -> &Arc<ResultStore<R>> {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.options.upload_dir
    }

    /// Where the artifact of a file target is stored.
    pub fn artifact_path(&self, target: &AnalysisTarget) -> Option<PathBuf> {
        target
            .stored_name
            .as_ref()
            .map(|name| self.options.upload_dir.join(name))
    }

    fn validate(&self, filename: &str, data: &[u8]) -> Result<(), StoreError> {
        if filename.trim().is_empty() {
            return Err(StoreError::InvalidArtifact("missing file name".to_owned()));
        }
        if data.is_empty() {
            return Err(StoreError::InvalidArtifact("file is empty".to_owned()));
        }
        let ext = filetype::extension(filename);
        if ext.is_empty() || !self.options.allowed_extensions.contains(&ext) {
            return Err(StoreError::InvalidArtifact(format!(
                "file type '{}' is not allowed",
                if ext.is_empty() { "(none)" } else { ext.as_str() }
            )));
        }
        let size = data.len() as u64;
        if size > self.options.max_upload_bytes {
            return Err(StoreError::InvalidArtifact(format!(
                "file is {size} bytes, over the {} byte limit",
                self.options.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Register an uploaded artifact.
    ///
    /// Identical content returns the existing target without storing a
    /// second copy.
    pub async fn register(&self, filename: &str, data: &[u8]) -> Result<Registration, StoreError> {
        if let Err(e) = self.validate(filename, data) {
            counter!(m::UPLOADS_REJECTED_TOTAL).increment(1);
            warn!(filename, error = %e, "upload rejected");
            return Err(e);
        }

        let md5 = inspect::md5_hex(data);
        let id = TargetId::new(&md5);
        if let Some(existing) = self.store.get(&id).await? {
            info!(target_id = %id, filename, "duplicate upload, reusing target");
            return Ok(Registration {
                target: existing.target,
                created: false,
            });
        }

        let inspection = inspect::inspect(data, filename);
        let stored_name = format!("{md5}_{}", sanitize_filename(filename));
        let path = self.options.upload_dir.join(&stored_name);
        let dir = self.options.upload_dir.clone();
        let bytes = data.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &bytes))
            .await
            .map_err(|e| StoreError::write(&stored_name, e))?
            .map_err(|e| StoreError::write(&stored_name, e))?;

        let target = AnalysisTarget {
            id,
            kind: if inspection.is_driver() {
                TargetKind::Driver
            } else {
                TargetKind::File
            },
            name: filename.to_owned(),
            size: data.len() as u64,
            mime: inspection.mime.to_owned(),
            category: inspection.category,
            md5: Some(inspection.md5),
            sha256: Some(inspection.sha256),
            entropy: Some(inspection.entropy),
            pe_info: inspection.pe_info,
            stored_name: Some(stored_name),
            pid: None,
            created_at: Utc::now(),
        };

        let (record, created) = self.store.insert_if_absent(TargetRecord::new(target)).await?;
        if created {
            counter!(m::TARGETS_REGISTERED_TOTAL).increment(1);
            info!(
                target_id = %record.target.id,
                kind = %record.target.kind,
                category = %record.target.category,
                size = record.target.size,
                "target registered"
            );
        }
        Ok(Registration {
            target: record.target,
            created,
        })
    }

    /// Read `path` and register it under its file name.
    pub async fn register_path(&self, path: &Path) -> Result<Registration, StoreError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidArtifact(format!("no file name in {}", path.display())))?
            .to_owned();
        let data = tokio::fs::read(path).await?;
        self.register(&filename, &data).await
    }

    /// Register a live process by pid.
    pub async fn register_process(&self, pid: u32) -> Result<Registration, StoreError> {
        if !(self.liveness)(pid) {
            return Err(StoreError::TargetNotFound(format!("process {pid} is not running")));
        }

        let id = TargetId::from_pid(pid);
        let target = AnalysisTarget {
            id,
            kind: TargetKind::Process,
            name: process_name(pid).await,
            size: 0,
            mime: PROCESS_MIME.to_owned(),
            category: FileCategory::Unknown,
            md5: None,
            sha256: None,
            entropy: None,
            pe_info: None,
            stored_name: None,
            pid: Some(pid),
            created_at: Utc::now(),
        };

        let (record, created) = self.store.insert_if_absent(TargetRecord::new(target)).await?;
        if created {
            counter!(m::TARGETS_REGISTERED_TOTAL).increment(1);
            info!(pid, name = %record.target.name, "process registered");
        }
        Ok(Registration {
            target: record.target,
            created,
        })
    }

    pub async fn get(&self, id: &TargetId) -> Result<AnalysisTarget, StoreError> {
        self.record(id).await.map(|r| r.target)
    }

    /// The full record for `id`.
    pub async fn record(&self, id: &TargetId) -> Result<TargetRecord, StoreError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::TargetNotFound(id.to_string()))
    }

    /// Every target, oldest first.
    pub async fn list(&self) -> Result<Vec<AnalysisTarget>, StoreError> {
        let mut targets: Vec<AnalysisTarget> =
            self.store.list().await?.into_iter().map(|r| r.target).collect();
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(targets)
    }

    /// Per-target overview, oldest first.
    pub async fn summary(&self) -> Result<Vec<TargetSummary>, StoreError> {
        let mut summaries: Vec<TargetSummary> =
            self.store.list().await?.iter().map(TargetSummary::of).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    /// Remove a target's record and stored artifact.
    ///
    /// Returns whether the target existed; deleting twice is not an error.
    pub async fn delete(&self, id: &TargetId) -> Result<bool, StoreError> {
        let Some(record) = self.store.delete(id).await? else {
            debug!(target_id = %id, "delete of unknown target ignored");
            return Ok(false);
        };
        if let Some(path) = self.artifact_path(&record.target) {
            remove_if_exists(&path).await?;
        }
        counter!(m::TARGETS_DELETED_TOTAL).increment(1);
        info!(target_id = %id, name = %record.target.name, "target deleted");
        Ok(true)
    }

    /// Delete every target and any stray file left in the upload directory.
    ///
    /// Returns how many targets were deleted.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for target in self.list().await? {
            if self.delete(&target.id).await? {
                deleted += 1;
            }
        }

        let mut entries = tokio::fs::read_dir(&self.options.upload_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                remove_if_exists(&entry.path()).await?;
            }
        }
        info!(deleted, "cleanup finished");
        Ok(deleted)
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Image name of a running process, or `pid_<n>` when it cannot be read.
async fn process_name(pid: u32) -> String {
    match read_comm(pid).await {
        Some(name) => name,
        None => format!("pid_{pid}"),
    }
}

#[cfg(target_os = "linux")]
async fn read_comm(pid: u32) -> Option<String> {
    let comm = tokio::fs::read_to_string(format!("/proc/{pid}/comm")).await.ok()?;
    let comm = comm.trim();
    (!comm.is_empty()).then(|| comm.to_owned())
}

#[cfg(not(target_os = "linux"))]
async fn read_comm(_pid: u32) -> Option<String> {
    None
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`; whitespace becomes `_`
/// and everything else is dropped. Never returns an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "artifact".to_owned()
    } else {
        trimmed.chars().take(200).collect()
    }
}
