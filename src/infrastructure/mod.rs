//! Infrastructure layer module
//!
//! Process-level concerns around the orchestration core:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;
