//! Shared utilities for the etcd member lifecycle agent
//!
//! This crate provides common functionality that does not vary from one
//! agent invocation to the next:
//! - Structured logging initialization
//! - Environment variable parsing helpers
//! - Command execution utilities

pub mod command;
pub mod config;
pub mod logging;

pub use command::{run, run_checked, CommandOutput};
pub use config::ConfigExt;
pub use logging::init_logging;
