//! Engine error types.
//!
//! [`EngineError`] is what the orchestrator returns. Scanner failures never
//! show up here: they are folded into the job's results. What does show up is
//! everything the caller has to act on (unknown targets, conflicts,
//! unsupported requests, storage failures).

use litterbox_core::error::{ConfigError, ConflictError, LitterboxError, PersistenceError};
use litterbox_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// The analysis type cannot run on this target.
    #[error("unsupported analysis: {0}")]
    Unsupported(String),

    /// A HolyGrail reference file is missing or malformed.
    #[error("reference data {path}: {reason}")]
    References { path: String, reason: String },

    /// The fuzzy block-hash database is missing or malformed.
    #[error("fuzzy database {path}: {reason}")]
    FuzzyDb { path: String, reason: String },

    /// Configuration or other shared-layer failure.
    #[error(transparent)]
    Core(#[from] LitterboxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) | Self::Store(StoreError::Conflict(_)) => true,
            Self::Core(e) => e.is_conflict(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(StoreError::TargetNotFound(_) | StoreError::JobNotFound { .. }) => true,
            Self::Core(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<EngineError> for LitterboxError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Store(e) => e.into(),
            EngineError::Conflict(e) => LitterboxError::Conflict(e),
            EngineError::Unsupported(reason) => LitterboxError::UnsupportedAnalysis(reason),
            EngineError::References { path, reason } => ConfigError::InvalidValue {
                field: "holygrail".to_owned(),
                reason: format!("{path}: {reason}"),
            }
            .into(),
            EngineError::FuzzyDb { path, reason } => {
                PersistenceError::Read { key: path, reason }.into()
            }
            EngineError::Core(e) => e,
            EngineError::Io(e) => LitterboxError::Io(e),
        }
    }
}
