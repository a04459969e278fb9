#![doc = include_str!("../README.md")]

pub mod error;
pub mod inspect;
pub mod registry;
pub mod repository;
pub mod result_store;

pub use error::StoreError;
pub use inspect::{Inspection, inspect};
pub use registry::{LivenessCheck, Registration, RegistryOptions, TargetRegistry, TargetSummary, sanitize_filename};
pub use repository::{JsonFileRepository, MemoryRepository, RecordRepository};
pub use result_store::{ORPHANED_JOB_MESSAGE, ResultStore};
