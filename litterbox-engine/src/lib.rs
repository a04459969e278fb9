//! LitterBox analysis engine.
//!
//! Ties the target registry, the scanner adapters and the risk engine
//! together: [`Orchestrator`] runs static, dynamic, driver (HolyGrail) and
//! fuzzy-similarity jobs and persists their results per target.

pub mod error;
pub mod fuzzy;
pub mod health;
pub mod holygrail;
mod jobs;
pub mod logging;
pub mod orchestrator;
pub mod slot;

pub use error::EngineError;
pub use fuzzy::FuzzyDb;
pub use health::{ComponentHealth, EngineHealth, aggregate_status};
pub use orchestrator::{AnalysisOptions, Orchestrator, OrchestratorBuilder};
pub use slot::{ExecutionSlot, SlotGuard};
