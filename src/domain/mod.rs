//! Domain layer for the stepwise orchestration core
//!
//! This module contains the task/step data model, the control context,
//! decisions, reports and the ports external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult};
