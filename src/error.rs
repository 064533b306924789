//! Error types for webforge operations.
//!
//! Defines error types for all major subsystems:
//! - Generative backend interactions
//! - Sandboxed script execution
//! - Browser automation
//! - Ephemeral static file serving
//! - Pipeline orchestration

use thiserror::Error;

/// Errors that can occur while talking to the generative text backend.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: WEBFORGE_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: WEBFORGE_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse backend response: {0}")]
    ParseError(String),

    #[error("Backend returned an empty completion")]
    EmptyCompletion,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Whether the error is worth retrying with backoff.
    ///
    /// Network hiccups, rate limits and server-side failures are transient;
    /// malformed payloads and missing configuration are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RequestFailed(_) | LlmError::RateLimited(_) => true,
            LlmError::ApiError { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

/// Errors that can occur while executing a generated script in the sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Script runner '{0}' not found on this host")]
    RunnerMissing(String),

    #[error("Script execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to spawn script runner: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while driving the headless browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch headless browser: {0}")]
    LaunchFailed(String),

    #[error("Navigation to '{url}' failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Browser operation timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("DevTools protocol error: {0}")]
    Protocol(String),
}

/// Errors that can occur while serving generated pages over HTTP.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind ephemeral port: {0}")]
    Bind(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during pipeline execution.
///
/// Expected validation failures never travel through this type; they are
/// reported as `ValidationOutcome` values. `PipelineError` is reserved for
/// environment faults, malformed backend payloads and phase-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Malformed backend payload for {0}")]
    SpecDefect(String),

    #[error("Environment fault: {0}")]
    Environment(String),

    #[error("Task '{id}' failed verification after {attempts} attempts")]
    TaskFailed { id: String, attempts: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the error must abort the whole run instead of downgrading to
    /// a failed task.
    ///
    /// Missing interpreters and unlaunchable browsers cannot be repaired by
    /// regenerating code; everything else is scoped to the current task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::Environment(_)
                | PipelineError::Sandbox(SandboxError::RunnerMissing(_))
                | PipelineError::Browser(BrowserError::LaunchFailed(_))
                | PipelineError::Planning(_)
                | PipelineError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_llm_errors() {
        assert!(LlmError::RequestFailed("reset".into()).is_transient());
        assert!(LlmError::RateLimited("slow down".into()).is_transient());
        assert!(LlmError::ApiError {
            code: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!LlmError::ApiError {
            code: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!LlmError::ParseError("garbage".into()).is_transient());
        assert!(!LlmError::MissingApiKey.is_transient());
    }

    #[test]
    fn fatal_pipeline_errors() {
        assert!(PipelineError::Environment("no browser".into()).is_fatal());
        assert!(PipelineError::Sandbox(SandboxError::RunnerMissing("node".into())).is_fatal());
        assert!(!PipelineError::TaskFailed {
            id: "t1".into(),
            attempts: 3
        }
        .is_fatal());
        assert!(!PipelineError::SpecDefect("tasks".into()).is_fatal());
    }
}
