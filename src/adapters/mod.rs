//! In-process implementations of the collaborator ports.

pub mod function;
pub mod mock;

pub use function::{FnResource, FnTool};
pub use mock::{MockResource, MockResponse, MockTool};
