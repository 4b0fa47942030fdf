//! Resource port - interface for text-generation backends.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;

/// A text-generation capability registered under a resource tier.
///
/// Implementations receive the structured step input assembled by the
/// engine and return a text or JSON response. Any error is recorded as a
/// failed attempt of the step that invoked the resource.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Generate a response for the given prompt.
    async fn invoke(&self, prompt: Value) -> DomainResult<Value>;
}
