//! CLI-specific error types and exit code mapping

use litterbox_core::error::LitterboxError;
use litterbox_core::types::RiskLevel;
use litterbox_engine::EngineError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Unknown target id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A job for the same target and type is running, or the execution
    /// slot is held.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The analysis finished but its risk reached the `--fail-on` level.
    #[error("risk level {level} (score {score}) reached --fail-on {threshold}")]
    RiskyVerdict {
        score: u8,
        level: RiskLevel,
        threshold: RiskLevel,
    },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other domain error.
    #[error("{0}")]
    Core(LitterboxError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | General / command error          |
    /// | 2    | Configuration error              |
    /// | 3    | Target not found                 |
    /// | 4    | Concurrency conflict             |
    /// | 5    | Risk reached the `--fail-on` level |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::NotFound(_) => 3,
            Self::Conflict(_) => 4,
            Self::RiskyVerdict { .. } => 5,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<LitterboxError> for CliError {
    fn from(e: LitterboxError) -> Self {
        match e {
            LitterboxError::Config(e) => Self::Config(e.to_string()),
            LitterboxError::TargetNotFound(id) => Self::NotFound(id),
            LitterboxError::Conflict(e) => Self::Conflict(e.to_string()),
            LitterboxError::Io(e) => Self::Io(e),
            other => Self::Core(other),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        LitterboxError::from(e).into()
    }
}
