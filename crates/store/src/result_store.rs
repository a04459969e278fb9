//! Per-target result store.
//!
//! Every mutation is a read-modify-write of the whole [`TargetRecord`] under
//! a lock keyed by target id. Two analysis types finishing on the same target
//! therefore merge their sections instead of one overwriting the other, and
//! the "at most one active job per (target, type)" check in
//! [`ResultStore::begin_job`] cannot race with another caller.

use std::collections::HashMap;
use std::sync::Arc;

use litterbox_core::error::ConflictError;
use litterbox_core::record::{AnalysisJob, TargetRecord};
use litterbox_core::types::{AnalysisType, JobStatus, TargetId};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::repository::RecordRepository;

/// Message recorded on jobs found non-terminal when the store is opened.
pub const ORPHANED_JOB_MESSAGE: &str = "interrupted: engine stopped before the job finished";

pub struct ResultStore<R: RecordRepository> {
    repo: R,
    locks: Mutex<HashMap<TargetId, Arc<Mutex<()>>>>,
}

impl<R: RecordRepository> ResultStore<R> {
    /// Wrap `repo`, failing any job a previous process left running.
    pub async fn open(repo: R) -> Result<Self, StoreError> {
        let store = Self {
            repo,
            locks: Mutex::new(HashMap::new()),
        };
        let recovered = store.recover_orphaned_jobs().await?;
        if recovered > 0 {
            warn!(jobs = recovered, "marked orphaned jobs as failed");
        }
        Ok(store)
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    async fn recover_orphaned_jobs(&self) -> Result<usize, StoreError> {
        let mut total = 0;
        for mut record in self.repo.list().await? {
            let changed = record.fail_orphaned_jobs(ORPHANED_JOB_MESSAGE);
            if changed > 0 {
                debug!(target_id = %record.target.id, jobs = changed, "recovering record");
                self.repo.put(&record).await?;
                total += changed;
            }
        }
        Ok(total)
    }

    async fn lock(&self, id: &TargetId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    pub async fn get(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        self.repo.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<TargetRecord>, StoreError> {
        self.repo.list().await
    }

    /// Store `record` unless one already exists for its id.
    ///
    /// Returns the stored record and whether it was newly created.
    pub async fn insert_if_absent(
        &self,
        record: TargetRecord,
    ) -> Result<(TargetRecord, bool), StoreError> {
        let _guard = self.lock(&record.target.id).await;
        if let Some(existing) = self.repo.get(&record.target.id).await? {
            return Ok((existing, false));
        }
        self.repo.put(&record).await?;
        Ok((record, true))
    }

    /// Locked read-modify-write of one record.
    ///
    /// `f` sees the current record; the result is written back only if it
    /// returns `Ok`.
    pub async fn update<T, F>(&self, id: &TargetId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut TargetRecord) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let _guard = self.lock(id).await;
        let mut record = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| StoreError::TargetNotFound(id.to_string()))?;
        let out = f(&mut record)?;
        self.repo.put(&record).await?;
        Ok(out)
    }

    /// Record a new running job for `(id, analysis_type)`.
    ///
    /// Fails with [`ConflictError::JobInFlight`] if that pair already has a
    /// non-terminal job.
    pub async fn begin_job(
        &self,
        id: &TargetId,
        analysis_type: AnalysisType,
    ) -> Result<AnalysisJob, StoreError> {
        let job = self
            .update(id, |record| {
                if record.active_job(analysis_type).is_some() {
                    return Err(ConflictError::JobInFlight {
                        target_id: id.to_string(),
                        analysis_type,
                    }
                    .into());
                }
                let mut job = AnalysisJob::new(id.clone(), analysis_type);
                job.transition(JobStatus::Running)
                    .map_err(|_| StoreError::InvalidTransition {
                        from: JobStatus::Pending,
                        to: JobStatus::Running,
                    })?;
                record.jobs.push(job.clone());
                Ok(job)
            })
            .await?;
        info!(target_id = %id, job_id = %job.id, analysis = %analysis_type, "job started");
        Ok(job)
    }

    /// Move a job to its terminal `status` and apply `write` to the record
    /// in the same locked update.
    ///
    /// Returns the record as persisted.
    pub async fn finish_job<F>(
        &self,
        id: &TargetId,
        job_id: Uuid,
        status: JobStatus,
        message: Option<String>,
        write: F,
    ) -> Result<TargetRecord, StoreError>
    where
        F: FnOnce(&mut TargetRecord) + Send,
    {
        let record = self
            .update(id, |record| {
                let job = record.job_mut(job_id).ok_or_else(|| StoreError::JobNotFound {
                    target_id: id.to_string(),
                    job_id: job_id.to_string(),
                })?;
                let from = job.status;
                job.transition(status)
                    .map_err(|_| StoreError::InvalidTransition { from, to: status })?;
                job.message = message;
                write(record);
                Ok(record.clone())
            })
            .await?;
        info!(target_id = %id, %job_id, status = %status, "job finished");
        Ok(record)
    }

    /// Remove the record for `id`, returning it if it existed.
    pub async fn delete(&self, id: &TargetId) -> Result<Option<TargetRecord>, StoreError> {
        let removed = {
            let _guard = self.lock(id).await;
            let existing = self.repo.get(id).await?;
            if existing.is_some() {
                self.repo.delete(id).await?;
            }
            existing
        };
        self.locks.lock().await.remove(id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::record;
    use crate::repository::{JsonFileRepository, MemoryRepository};
    use litterbox_core::record::StaticSection;
    use litterbox_core::types::RiskAssessment;
    use std::collections::BTreeMap;

    async fn store_with(id: &str) -> ResultStore<MemoryRepository> {
        let store = ResultStore::open(MemoryRepository::new()).await.unwrap();
        store.insert_if_absent(record(id)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn insert_if_absent_keeps_first_record() {
        let store = ResultStore::open(MemoryRepository::new()).await.unwrap();
        let (_, created) = store.insert_if_absent(record("a1")).await.unwrap();
        assert!(created);

        let mut other = record("a1");
        other.target.name = "renamed.exe".to_owned();
        let (kept, created) = store.insert_if_absent(other).await.unwrap();
        assert!(!created, "second insert should not replace the record");
        assert_eq!(kept.target.name, "a1.exe");
    }

    #[tokio::test]
    async fn begin_job_rejects_second_active_job() {
        // Given: a target with a running static job
        let store = store_with("t1").await;
        let id = TargetId::new("t1");
        let job = store.begin_job(&id, AnalysisType::Static).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);

        // When: a second static job is requested
        let err = store.begin_job(&id, AnalysisType::Static).await.unwrap_err();

        // Then: it is a conflict and only one job is recorded
        assert!(matches!(err, StoreError::Conflict(ConflictError::JobInFlight { .. })));
        let rec = store.get(&id).await.unwrap().unwrap();
        assert_eq!(rec.jobs.len(), 1);

        // A different analysis type is independent
        store.begin_job(&id, AnalysisType::Dynamic).await.unwrap();
    }

    #[tokio::test]
    async fn finish_job_releases_the_pair() {
        let store = store_with("t2").await;
        let id = TargetId::new("t2");
        let job = store.begin_job(&id, AnalysisType::Static).await.unwrap();

        let rec = store
            .finish_job(&id, job.id, JobStatus::Completed, None, |record| {
                record.static_analysis = Some(StaticSection {
                    job_id: job.id,
                    results: BTreeMap::new(),
                    risk_assessment: RiskAssessment::new(12, Vec::new()),
                });
            })
            .await
            .unwrap();

        assert!(rec.static_analysis.is_some());
        assert_eq!(rec.job(job.id).unwrap().status, JobStatus::Completed);
        assert!(
            store.begin_job(&id, AnalysisType::Static).await.is_ok(),
            "a finished job should not block the next one"
        );
    }

    #[tokio::test]
    async fn finish_job_rejects_backwards_transition() {
        let store = store_with("t3").await;
        let id = TargetId::new("t3");
        let job = store.begin_job(&id, AnalysisType::Static).await.unwrap();
        store
            .finish_job(&id, job.id, JobStatus::Failed, Some("boom".into()), |_| {})
            .await
            .unwrap();

        let err = store
            .finish_job(&id, job.id, JobStatus::Completed, None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn concurrent_sections_merge() {
        // Given: static and dynamic jobs running on the same target
        let store = Arc::new(store_with("t4").await);
        let id = TargetId::new("t4");
        let s = store.begin_job(&id, AnalysisType::Static).await.unwrap();
        let h = store.begin_job(&id, AnalysisType::HolyGrail).await.unwrap();

        // When: both finish at the same time
        let a = {
            let store = Arc::clone(&store);
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .finish_job(&id, s.id, JobStatus::Completed, None, |r| {
                        r.static_analysis = Some(StaticSection {
                            job_id: s.id,
                            results: BTreeMap::new(),
                            risk_assessment: RiskAssessment::new(30, Vec::new()),
                        });
                    })
                    .await
            })
        };
        let b = {
            let store = Arc::clone(&store);
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .finish_job(&id, h.id, JobStatus::Failed, Some("x".into()), |_| {})
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Then: neither update was lost
        let rec = store.get(&id).await.unwrap().unwrap();
        assert!(rec.static_analysis.is_some());
        assert!(rec.jobs.iter().all(|j| j.status.is_terminal()));
    }

    #[tokio::test]
    async fn update_unknown_target_is_not_found() {
        let store = ResultStore::open(MemoryRepository::new()).await.unwrap();
        let err = store
            .begin_job(&TargetId::new("missing"), AnalysisType::Static)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TargetNotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = store_with("t5").await;
        let id = TargetId::new("t5");
        assert!(store.delete(&id).await.unwrap().is_some());
        assert!(store.delete(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopening_fails_orphaned_jobs() {
        // Given: a job left running in a file-backed store
        let dir = tempfile::tempdir().unwrap();
        let id = TargetId::new("t6");
        {
            let repo = JsonFileRepository::open(dir.path()).await.unwrap();
            let store = ResultStore::open(repo).await.unwrap();
            store.insert_if_absent(record("t6")).await.unwrap();
            store.begin_job(&id, AnalysisType::Dynamic).await.unwrap();
        }

        // When: the store is opened again
        let repo = JsonFileRepository::open(dir.path()).await.unwrap();
        let store = ResultStore::open(repo).await.unwrap();

        // Then: the job is failed and the pair can run again
        let rec = store.get(&id).await.unwrap().unwrap();
        assert_eq!(rec.jobs[0].status, JobStatus::Failed);
        assert_eq!(rec.jobs[0].message.as_deref(), Some(ORPHANED_JOB_MESSAGE));
        assert!(store.begin_job(&id, AnalysisType::Dynamic).await.is_ok());
    }
}
