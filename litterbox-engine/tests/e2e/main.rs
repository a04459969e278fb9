//! End-to-end tests for the analysis engine.
//!
//! Fake scanner tools are `sh` scripts, so the scenarios run on unix only.
//!
//! # Test Structure
//!
//! - `helpers/` -- config builder, fake tools and artifact fixtures
//! - `scenarios/` -- one file per area (static, dynamic, concurrency, ...)
//!
//! # Running
//!
//! ```bash
//! cargo test -p litterbox-engine --test e2e
//! ```

#![cfg(unix)]

mod helpers;
mod scenarios;
