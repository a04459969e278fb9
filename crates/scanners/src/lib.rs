#![doc = include_str!("../README.md")]

pub mod adapter;
pub mod collector;
pub mod command;
pub mod kind;
pub mod parser;
pub mod process;
pub mod runner;

pub use adapter::{ScanTarget, ScannerAdapter};
pub use collector::{Collector, RunningCollector};
pub use command::{CommandLine, Placeholders, TemplateError};
pub use kind::ScannerKind;
pub use parser::{ParseError, Parsed};
pub use process::{is_process_alive, kill_process_tree};
pub use runner::{RunOutcome, ToolRun, run_command};
