//! Job orchestration.
//!
//! The [`Orchestrator`] is the single entry point of the engine. It owns the
//! target registry, the result store, the execution slot and the static
//! worker pool, and drives each analysis job through
//! `pending -> running -> terminal`.
//!
//! # Job lifecycle
//!
//! 1. Resolve what the job runs against; reject unsupported requests.
//! 2. Dynamic only: take the execution slot (rejected if busy).
//! 3. Record the running job (rejected if one is already in flight).
//! 4. Run the pipeline under the job deadline and a cancellation token.
//! 5. Write the terminal status and the results section in one update.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use litterbox_core::config::LitterboxConfig;
use litterbox_core::error::ConflictError;
use litterbox_core::metrics as m;
use litterbox_core::record::{
    AnalysisJob, DynamicSection, FuzzySection, HolyGrailSection, StaticSection, TargetRecord,
};
use litterbox_core::target::{AnalysisTarget, FileCategory};
use litterbox_core::types::{AnalysisType, JobStatus, RiskAssessment, TargetId};
use litterbox_scanners::is_process_alive;
use litterbox_store::{
    JsonFileRepository, LivenessCheck, RecordRepository, Registration, RegistryOptions,
    ResultStore, StoreError, TargetRegistry, TargetSummary,
};

use crate::error::EngineError;
use crate::fuzzy::FuzzyDb;
use crate::health::{self, EngineHealth};
use crate::holygrail::{self, DriverReferences};
use crate::jobs::{self, JobOutcome, JobOutput, Launch, Plan};
use crate::slot::ExecutionSlot;

/// Per-request knobs for [`Orchestrator::analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Arguments passed to the payload of a dynamic run.
    pub cmd_args: Vec<String>,
}

/// A job currently executing in this process.
struct ActiveJob {
    target_id: TargetId,
    analysis_type: AnalysisType,
    cancel: CancellationToken,
}

pub struct Orchestrator<R: RecordRepository = JsonFileRepository> {
    config: Arc<LitterboxConfig>,
    registry: TargetRegistry<R>,
    slot: ExecutionSlot,
    /// Bounds concurrent static scanner processes across all jobs.
    workers: Arc<Semaphore>,
    active: Mutex<HashMap<Uuid, ActiveJob>>,
}

/// Assembles an [`Orchestrator`].
///
/// Tests inject a shared [`ExecutionSlot`], a liveness check and an
/// in-memory repository; production uses the defaults.
pub struct OrchestratorBuilder {
    config: LitterboxConfig,
    slot: Option<ExecutionSlot>,
    liveness: LivenessCheck,
}

impl OrchestratorBuilder {
    pub fn new(config: LitterboxConfig) -> Self {
        Self {
            config,
            slot: None,
            liveness: is_process_alive,
        }
    }

    /// Share an execution slot instead of creating a fresh one.
    pub fn execution_slot(mut self, slot: ExecutionSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Replace the pid liveness check used by `register_process`.
    pub fn liveness(mut self, liveness: LivenessCheck) -> Self {
        self.liveness = liveness;
        self
    }

    /// Build over JSON records in the configured result directory.
    pub async fn build(self) -> Result<Orchestrator<JsonFileRepository>, EngineError> {
        let repo = JsonFileRepository::open(self.config.result_dir()).await?;
        self.build_with(repo).await
    }

    /// Build over any record backend.
    pub async fn build_with<R: RecordRepository>(
        self,
        repo: R,
    ) -> Result<Orchestrator<R>, EngineError> {
        self.config.validate()?;
        let store = Arc::new(ResultStore::open(repo).await?);
        let registry = TargetRegistry::open(
            store,
            RegistryOptions::from_config(&self.config),
            self.liveness,
        )
        .await?;

        m::describe_all();
        info!(
            data_dir = %self.config.general.data_dir,
            max_parallel_scanners = self.config.analysis.max_parallel_scanners,
            "orchestrator ready"
        );

        Ok(Orchestrator {
            workers: Arc::new(Semaphore::new(self.config.analysis.max_parallel_scanners)),
            config: Arc::new(self.config),
            registry,
            slot: self.slot.unwrap_or_default(),
            active: Mutex::new(HashMap::new()),
        })
    }
}

impl Orchestrator<JsonFileRepository> {
    /// Load `litterbox.toml` and open the file-backed store.
    pub async fn open(config_path: &Path) -> Result<Self, EngineError> {
        let config = LitterboxConfig::load(config_path).await?;
        OrchestratorBuilder::new(config).build().await
    }
}

impl<R: RecordRepository> Orchestrator<R> {
    pub fn config(&self) -> &LitterboxConfig {
        &self.config
    }

    pub fn registry(&self) -> &TargetRegistry<R> {
        &self.registry
    }

    pub fn execution_slot(&self) -> &ExecutionSlot {
        &self.slot
    }

    /// Register uploaded bytes as a file target.
    pub async fn upload(&self, filename: &str, data: &[u8]) -> Result<Registration, EngineError> {
        Ok(self.registry.register(filename, data).await?)
    }

    /// Register a file from disk as a file target.
    pub async fn upload_path(&self, path: &Path) -> Result<Registration, EngineError> {
        Ok(self.registry.register_path(path).await?)
    }

    pub async fn register_process(&self, pid: u32) -> Result<Registration, EngineError> {
        Ok(self.registry.register_process(pid).await?)
    }

    pub async fn target(&self, id: &TargetId) -> Result<AnalysisTarget, EngineError> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn list(&self) -> Result<Vec<AnalysisTarget>, EngineError> {
        Ok(self.registry.list().await?)
    }

    pub async fn summary(&self) -> Result<Vec<TargetSummary>, EngineError> {
        Ok(self.registry.summary().await?)
    }

    /// The full record of a target: jobs plus every results section.
    pub async fn results(&self, id: &TargetId) -> Result<TargetRecord, EngineError> {
        Ok(self.registry.record(id).await?)
    }

    /// Delete a target's artifact and record. Deleting an unknown or
    /// already-deleted target returns `false`.
    ///
    /// Refused while one of the target's jobs is running here.
    pub async fn delete(&self, id: &TargetId) -> Result<bool, EngineError> {
        if let Some(analysis_type) = self
            .active
            .lock()
            .await
            .values()
            .find(|job| &job.target_id == id)
            .map(|job| job.analysis_type)
        {
            return Err(ConflictError::JobInFlight {
                target_id: id.to_string(),
                analysis_type,
            }
            .into());
        }
        Ok(self.registry.delete(id).await?)
    }

    /// Delete every target. Refused while a dynamic run holds the slot; the
    /// slot is held for the duration so none can start meanwhile.
    pub async fn cleanup(&self) -> Result<usize, EngineError> {
        let _slot = self.slot.try_acquire()?;
        if let Some(job) = self.active.lock().await.values().next() {
            return Err(ConflictError::JobInFlight {
                target_id: job.target_id.to_string(),
                analysis_type: job.analysis_type,
            }
            .into());
        }
        Ok(self.registry.cleanup().await?)
    }

    /// Request cancellation of the running `(id, analysis_type)` job.
    ///
    /// Returns whether such a job was running here.
    pub async fn cancel(&self, id: &TargetId, analysis_type: AnalysisType) -> bool {
        let active = self.active.lock().await;
        let found = active
            .values()
            .find(|job| &job.target_id == id && job.analysis_type == analysis_type);
        if let Some(job) = found {
            info!(target_id = %id, analysis = %analysis_type, "cancellation requested");
            job.cancel.cancel();
        }
        found.is_some()
    }

    /// Cancel every running job. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let active = self.active.lock().await;
        for job in active.values() {
            job.cancel.cancel();
        }
        active.len()
    }

    pub fn health(&self) -> EngineHealth {
        health::check(&self.config)
    }

    /// Hash the reference corpus under `dir` and store the fuzzy database.
    pub async fn build_fuzzy_db(&self, dir: &Path) -> Result<FuzzyDb, EngineError> {
        let db = FuzzyDb::build(dir, self.config.fuzzy.block_size).await?;
        let path = self.config.fuzzy_db_path();
        db.save(&path)?;
        info!(path = %path.display(), references = db.references.len(), "fuzzy database saved");
        Ok(db)
    }

    /// Run one analysis of `id` to completion and return the finished job.
    ///
    /// Scanner failures are part of the job's outcome, not errors. Errors are
    /// reserved for unknown targets, unsupported requests, concurrency
    /// conflicts and storage failures.
    pub async fn analyze(
        &self,
        id: &TargetId,
        analysis_type: AnalysisType,
        options: AnalysisOptions,
    ) -> Result<AnalysisJob, EngineError> {
        let analysis = analysis_type.as_str();
        let record = self.registry.record(id).await?;
        let plan = self.plan(&record.target, analysis_type)?;

        let slot_guard = match plan {
            Plan::Dynamic { .. } => match self.slot.try_acquire() {
                Ok(guard) => Some(guard),
                Err(e) => {
                    metrics::counter!(m::JOBS_REJECTED_TOTAL, m::LABEL_ANALYSIS => analysis)
                        .increment(1);
                    warn!(target_id = %id, analysis, "execution slot busy");
                    return Err(e.into());
                }
            },
            _ => None,
        };

        let job = match self.registry.store().begin_job(id, analysis_type).await {
            Ok(job) => job,
            Err(e) => {
                if matches!(e, StoreError::Conflict(_)) {
                    metrics::counter!(m::JOBS_REJECTED_TOTAL, m::LABEL_ANALYSIS => analysis)
                        .increment(1);
                    warn!(target_id = %id, analysis, "job already in flight");
                }
                return Err(e.into());
            }
        };
        metrics::counter!(m::JOBS_STARTED_TOTAL, m::LABEL_ANALYSIS => analysis).increment(1);
        metrics::gauge!(m::JOBS_ACTIVE).increment(1.0);

        let cancel = CancellationToken::new();
        self.active.lock().await.insert(
            job.id,
            ActiveJob {
                target_id: id.clone(),
                analysis_type,
                cancel: cancel.clone(),
            },
        );

        let job_timeout = self.config.analysis.job_timeout_secs;
        let timed_out = CancellationToken::new();
        let deadline = {
            let cancel = cancel.clone();
            let timed_out = timed_out.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(job_timeout)).await;
                timed_out.cancel();
                cancel.cancel();
            })
        };

        let started = Instant::now();
        let mut outcome = self.execute(&record.target, plan, &options, &cancel).await;
        deadline.abort();
        self.active.lock().await.remove(&job.id);
        drop(slot_guard);

        if timed_out.is_cancelled() {
            warn!(target_id = %id, analysis, job_timeout, "job timed out");
            outcome.status = JobStatus::Failed;
            outcome.message = Some(format!("job exceeded its {job_timeout}s time limit"));
        } else if cancel.is_cancelled() {
            info!(target_id = %id, analysis, "job cancelled");
            outcome = JobOutcome {
                status: JobStatus::Cancelled,
                message: Some("cancelled by request".to_owned()),
                output: None,
            };
        }

        let finished = self.finish(id, job.id, outcome).await;

        metrics::gauge!(m::JOBS_ACTIVE).decrement(1.0);
        metrics::histogram!(m::JOB_DURATION_SECONDS, m::LABEL_ANALYSIS => analysis)
            .record(started.elapsed().as_secs_f64());
        if let Ok(job) = &finished {
            metrics::counter!(
                m::JOBS_FINISHED_TOTAL,
                m::LABEL_ANALYSIS => analysis,
                m::LABEL_STATUS => job.status.to_string()
            )
            .increment(1);
        }
        finished
    }

    /// Decide what a job would run against, or why it cannot run.
    fn plan(&self, target: &AnalysisTarget, analysis_type: AnalysisType) -> Result<Plan, EngineError> {
        let artifact = || {
            if target.is_process() {
                return Err(EngineError::Unsupported(format!(
                    "{analysis_type} analysis needs a file target, {} is a process",
                    target.name
                )));
            }
            self.registry.artifact_path(target).ok_or_else(|| {
                EngineError::Unsupported(format!("{} has no stored artifact", target.id))
            })
        };

        match analysis_type {
            AnalysisType::Static => Ok(Plan::Static { path: artifact()? }),
            AnalysisType::Dynamic => {
                let launch = match target.pid {
                    Some(pid) if target.is_process() => Launch::Attach { pid },
                    _ => Launch::Payload { path: artifact()? },
                };
                Ok(Plan::Dynamic { launch })
            }
            AnalysisType::HolyGrail => {
                if !self.config.holygrail.enabled {
                    return Err(EngineError::Unsupported(
                        "holygrail analysis is disabled in configuration".to_owned(),
                    ));
                }
                if target.category != FileCategory::Driver {
                    return Err(EngineError::Unsupported(format!(
                        "holygrail analysis needs a kernel driver, {} is a {}",
                        target.name, target.category
                    )));
                }
                let pe = target.pe_info.clone().ok_or_else(|| {
                    EngineError::Unsupported(format!(
                        "{} looks like a driver but its PE headers could not be parsed",
                        target.name
                    ))
                })?;
                Ok(Plan::HolyGrail { pe: Box::new(pe) })
            }
            AnalysisType::Fuzzy => Ok(Plan::Fuzzy { path: artifact()? }),
            AnalysisType::Blender => Err(EngineError::Unsupported(
                "blender analysis is not supported".to_owned(),
            )),
        }
    }

    async fn execute(
        &self,
        target: &AnalysisTarget,
        plan: Plan,
        options: &AnalysisOptions,
        cancel: &CancellationToken,
    ) -> JobOutcome {
        match plan {
            Plan::Static { path } => {
                let results = jobs::static_scan::run(
                    &self.config.scanners,
                    &self.workers,
                    target,
                    &path,
                    cancel,
                )
                .await;
                JobOutcome::scanned(&results).with_output(JobOutput::Static(results))
            }
            Plan::Dynamic { launch } => {
                let run =
                    jobs::dynamic::run(&self.config, target, launch, &options.cmd_args, cancel)
                        .await;
                let mut outcome = JobOutcome::scanned(&run.results);
                if let Some(note) = &run.metadata.termination_note {
                    outcome.message = Some(match outcome.message.take() {
                        Some(message) => format!("{note}; {message}"),
                        None => note.clone(),
                    });
                }
                outcome.with_output(JobOutput::Dynamic(Box::new(run)))
            }
            Plan::HolyGrail { pe } => {
                match DriverReferences::load(&self.config.holygrail).await {
                    Ok(references) => {
                        let (assessment, imports) = holygrail::assess(
                            target,
                            &pe,
                            &references,
                            &self.config.holygrail.dangerous_imports,
                        );
                        info!(
                            target_id = %target.id,
                            score = assessment.score,
                            verdict = %assessment.verdict,
                            "driver assessed"
                        );
                        JobOutcome::completed(JobOutput::HolyGrail {
                            assessment,
                            imports,
                        })
                    }
                    Err(e) => {
                        error!(target_id = %target.id, error = %e, "driver references unavailable");
                        JobOutcome::failed(e.to_string())
                    }
                }
            }
            Plan::Fuzzy { path } => self.fuzzy(target, &path).await,
        }
    }

    async fn fuzzy(&self, target: &AnalysisTarget, path: &Path) -> JobOutcome {
        let db = match FuzzyDb::load(&self.config.fuzzy_db_path()).await {
            Ok(db) => db,
            Err(e) => {
                error!(target_id = %target.id, error = %e, "fuzzy database unavailable");
                return JobOutcome::failed(format!(
                    "{e} (build it with `litterbox fuzzy-db build <dir>`)"
                ));
            }
        };
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => return JobOutcome::failed(format!("failed to read artifact: {e}")),
        };
        let threshold = self.config.fuzzy.threshold;
        let matches = db.analyze(&data, threshold);
        info!(target_id = %target.id, matches = matches.len(), "fuzzy analysis finished");
        JobOutcome::completed(JobOutput::Fuzzy { threshold, matches })
    }

    /// Persist the terminal status and results together. If that write
    /// fails, try once more to at least mark the job failed.
    async fn finish(
        &self,
        id: &TargetId,
        job_id: Uuid,
        outcome: JobOutcome,
    ) -> Result<AnalysisJob, EngineError> {
        let store = self.registry.store();
        let JobOutcome {
            status,
            message,
            output,
        } = outcome;

        let written = store
            .finish_job(id, job_id, status, message, move |record| {
                if let Some(output) = output {
                    write_section(record, job_id, output);
                }
            })
            .await;

        match written {
            Ok(record) => record.job(job_id).cloned().ok_or_else(|| {
                EngineError::from(StoreError::JobNotFound {
                    target_id: id.to_string(),
                    job_id: job_id.to_string(),
                })
            }),
            Err(e) => {
                error!(target_id = %id, %job_id, error = %e, "failed to store job results");
                let reason = format!("failed to store results: {e}");
                if let Err(mark) = store
                    .finish_job(id, job_id, JobStatus::Failed, Some(reason), |_| {})
                    .await
                {
                    warn!(target_id = %id, %job_id, error = %mark, "could not mark job failed");
                }
                Err(e.into())
            }
        }
    }
}

/// Write a pipeline's output into its section of the record. Static and
/// dynamic risk combine with whatever the other section already holds.
fn write_section(record: &mut TargetRecord, job_id: Uuid, output: JobOutput) {
    match output {
        JobOutput::Static(results) => {
            let dynamic = record.dynamic.as_ref().map(|d| &d.results);
            let risk_assessment = litterbox_risk::assess(&record.target, Some(&results), dynamic);
            count_assessment(&risk_assessment);
            record.static_analysis = Some(StaticSection {
                job_id,
                results,
                risk_assessment,
            });
        }
        JobOutput::Dynamic(run) => {
            let run = *run;
            let static_results = record.static_analysis.as_ref().map(|s| &s.results);
            let risk_assessment =
                litterbox_risk::assess(&record.target, static_results, Some(&run.results));
            count_assessment(&risk_assessment);
            record.dynamic = Some(DynamicSection {
                job_id,
                results: run.results,
                risk_assessment,
                process_output: run.process_output,
                metadata: run.metadata,
            });
        }
        JobOutput::HolyGrail {
            assessment,
            imports,
        } => {
            record.holygrail = Some(HolyGrailSection {
                job_id,
                assessment,
                imports,
            });
        }
        JobOutput::Fuzzy { threshold, matches } => {
            record.fuzzy = Some(FuzzySection {
                job_id,
                threshold,
                matches,
            });
        }
    }
}

fn count_assessment(assessment: &RiskAssessment) {
    metrics::counter!(m::RISK_ASSESSMENTS_TOTAL, m::LABEL_LEVEL => assessment.level.to_string())
        .increment(1);
}
