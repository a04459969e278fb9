//! Error taxonomy shared by every LitterBox crate.
//!
//! [`LitterboxError`] is the top-level type returned across crate boundaries.
//! Crate-local errors (`StoreError`, the engine's job errors) convert into it
//! through `From` impls so `?` propagates naturally.
//!
//! # Categories
//!
//! - **Configuration**: [`ConfigError`]
//! - **Scanner execution**: [`ScannerError`] (invocation, timeout, parse, cancel)
//! - **Concurrency**: [`ConflictError`] (duplicate in-flight job, busy execution slot)
//! - **Persistence**: [`PersistenceError`]
//! - **Targets**: `TargetNotFound`, `InvalidArtifact`

use crate::types::{AnalysisType, JobStatus};

/// Top-level LitterBox error.
#[derive(Debug, thiserror::Error)]
pub enum LitterboxError {
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A scanner failed in a way the caller must see.
    #[error("scanner error: {0}")]
    Scanner(#[from] ScannerError),

    /// Rejected because a conflicting analysis is already running.
    #[error("concurrency conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// The result store could not be read or written.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// No target is registered under this id.
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// The uploaded artifact was rejected.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// The requested analysis type cannot run on this target.
    #[error("unsupported analysis: {0}")]
    UnsupportedAnalysis(String),

    /// The job was cancelled before it finished.
    #[error("analysis cancelled: {0}")]
    Cancelled(String),

    /// A job status change that would move backwards.
    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LitterboxError {
    /// Whether the error came from a concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether the error is an unknown-target lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound(_))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds a value outside its allowed range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Scanner execution errors.
///
/// Adapters never return these to the orchestrator directly; they are folded
/// into a non-success `ScannerResult`. The variants are kept so the message
/// recorded in the result is uniform.
#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    /// The tool binary is missing or could not be started.
    #[error("{scanner}: failed to start: {reason}")]
    Invocation { scanner: String, reason: String },

    /// The tool exceeded its wall-clock budget.
    #[error("{scanner}: timed out after {timeout_secs}s")]
    Timeout { scanner: String, timeout_secs: u64 },

    /// The tool produced output that could not be interpreted.
    #[error("{scanner}: unparsable output: {reason}")]
    Parse { scanner: String, reason: String },

    /// The surrounding job was cancelled while the tool was running.
    #[error("{scanner}: cancelled")]
    Cancelled { scanner: String },
}

/// Concurrency conflicts. Callers are rejected, never queued.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// A non-terminal job already exists for this target and analysis type.
    #[error("{analysis_type} analysis already in progress for target {target_id}")]
    JobInFlight {
        target_id: String,
        analysis_type: AnalysisType,
    },

    /// Another dynamic analysis holds the execution slot.
    #[error("execution slot is held by another dynamic analysis")]
    ExecutionSlotBusy,
}

/// Result store errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Reading a record failed.
    #[error("failed to read record {key}: {reason}")]
    Read { key: String, reason: String },

    /// Writing a record failed.
    #[error("failed to write record {key}: {reason}")]
    Write { key: String, reason: String },

    /// A stored record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}
