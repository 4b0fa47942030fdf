//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that collaborators implement:
//! - Resource: text-generation backends registered per tier
//! - Tool: named capabilities invoked on a step's resource output
//!
//! These traits keep the orchestration core independent of any specific
//! provider.

pub mod resource;
pub mod tool;

pub use resource::Resource;
pub use tool::{Tool, ToolInput};
