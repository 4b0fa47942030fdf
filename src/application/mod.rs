//! Application layer: the execution runner.

pub mod engine;

pub use engine::{Engine, EngineEvent};
