//! Shared utilities for the pg-bootstrap binaries
//!
//! This crate provides the ambient pieces every binary needs:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Command execution utilities
//! - Event reporting

pub mod command;
pub mod config;
pub mod logging;
pub mod telemetry;

pub use command::{clear_libpq_env, run, run_checked, run_with_input, sudo, CommandOutput};
pub use config::ConfigExt;
pub use logging::init_logging;
pub use telemetry::{Telemetry, TelemetryEvent};
