//! Store error types.
//!
//! [`StoreError`] covers the registry and the result store. It converts into
//! [`LitterboxError`] so callers can propagate it with `?`.

use litterbox_core::error::{ConflictError, LitterboxError, PersistenceError};
use litterbox_core::types::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading a record failed.
    #[error("failed to read record {key}: {reason}")]
    Read { key: String, reason: String },

    /// Writing a record failed.
    #[error("failed to write record {key}: {reason}")]
    Write { key: String, reason: String },

    /// A stored record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// An uploaded artifact was rejected.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("target not found: {0}")]
    TargetNotFound(String),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// The job is not part of the target's record.
    #[error("job {job_id} not found for target {target_id}")]
    JobNotFound { target_id: String, job_id: String },

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn read(key: &str, reason: impl ToString) -> Self {
        Self::Read {
            key: key.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(key: &str, reason: impl ToString) -> Self {
        Self::Write {
            key: key.to_owned(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(key: &str, reason: impl ToString) -> Self {
        Self::Corrupt {
            key: key.to_owned(),
            reason: reason.to_string(),
        }
    }
}

impl From<StoreError> for LitterboxError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Read { key, reason } => {
                LitterboxError::Persistence(PersistenceError::Read { key, reason })
            }
            StoreError::Write { key, reason } => {
                LitterboxError::Persistence(PersistenceError::Write { key, reason })
            }
            StoreError::Corrupt { key, reason } => {
                LitterboxError::Persistence(PersistenceError::Corrupt { key, reason })
            }
            StoreError::InvalidArtifact(reason) => LitterboxError::InvalidArtifact(reason),
            StoreError::TargetNotFound(id) => LitterboxError::TargetNotFound(id),
            StoreError::Conflict(e) => LitterboxError::Conflict(e),
            StoreError::JobNotFound { target_id, job_id } => {
                LitterboxError::TargetNotFound(format!("{target_id} (job {job_id})"))
            }
            StoreError::InvalidTransition { from, to } => {
                LitterboxError::InvalidTransition { from, to }
            }
            StoreError::Io(e) => LitterboxError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litterbox_core::types::AnalysisType;

    #[test]
    fn write_error_becomes_persistence_error() {
        let err: LitterboxError = StoreError::write("abc", "disk full").into();
        assert!(matches!(
            err,
            LitterboxError::Persistence(PersistenceError::Write { .. })
        ));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn not_found_and_conflict_keep_their_kind() {
        let err: LitterboxError = StoreError::TargetNotFound("4242".to_owned()).into();
        assert!(err.is_not_found());

        let err: LitterboxError = StoreError::from(ConflictError::JobInFlight {
            target_id: "abc".to_owned(),
            analysis_type: AnalysisType::Static,
        })
        .into();
        assert!(err.is_conflict());
    }

    #[test]
    fn invalid_artifact_display() {
        let err = StoreError::InvalidArtifact("file type .txt not allowed".to_owned());
        assert_eq!(err.to_string(), "invalid artifact: file type .txt not allowed");
    }
}
