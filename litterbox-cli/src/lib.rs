//! `litterbox` command-line front end.
//!
//! The binary in `main.rs` only parses arguments, sets up logging and maps
//! errors to exit codes; everything else lives here so it can be tested.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
