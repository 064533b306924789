//! Generative text backend access.
//!
//! `TextBackend` is the seam every generator and validator prompts through;
//! production uses the HTTP client, tests substitute scripted fakes.

mod client;
mod retry;

pub use client::{BackendConfig, HttpBackend};
pub use retry::RetryPolicy;

use async_trait::async_trait;

use crate::error::LlmError;

/// A generative text backend.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Requests a free-text completion.
    async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError>;

    /// Requests a completion constrained to a JSON object where the backend
    /// supports it; callers still run extraction on the result.
    async fn complete_json(&self, prompt: &str, system: Option<&str>) -> Result<String, LlmError>;
}
