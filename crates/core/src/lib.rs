#![doc = include_str!("../README.md")]

pub mod config;
pub mod driver;
pub mod error;
pub mod findings;
pub mod metrics;
pub mod record;
pub mod target;
pub mod types;

// errors
pub use error::{ConfigError, ConflictError, LitterboxError, PersistenceError, ScannerError};

// config
pub use config::{LitterboxConfig, ToolConfig};

// domain types
pub use driver::{ByovdAssessment, ByovdFindings, ByovdLabel, DriverVerdict};
pub use findings::ScanFindings;
pub use record::{AnalysisJob, TargetRecord};
pub use target::{AnalysisTarget, FileCategory, PeInfo};
pub use types::{
    AnalysisType, Detection, HealthStatus, JobStatus, RawOutput, RiskAssessment, RiskLevel,
    ScannerResult, ScannerStatus, Severity, TargetId, TargetKind,
};
