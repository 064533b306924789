//! Autonomous repair agent.
//!
//! Given a problem statement and the failing error text, the agent runs a
//! bounded tool loop (read file, write file, run command, finish) confined
//! to the output directory. Its effect is file edits; the return value only
//! reports whether it believes the defect is fixed.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::utils::extract_json;

/// Maximum tool-loop steps before the agent gives up.
const MAX_STEPS: usize = 12;

/// Wall-clock limit for one agent-issued command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters of file/command output echoed back into the transcript.
const OBSERVATION_LIMIT: usize = 2000;

const AGENT_SYSTEM_PROMPT: &str = "You are a repair agent for a generated \
static website. You fix defects by editing files in the working directory. \
Respond with exactly one JSON tool call per turn:\n\
{\"action\": \"read_file\", \"path\": \"logic.js\"}\n\
{\"action\": \"write_file\", \"path\": \"logic.js\", \"content\": \"...\"}\n\
{\"action\": \"run_command\", \"command\": \"node backend_tests.js\"}\n\
{\"action\": \"finish\", \"success\": true}";

/// An actor granted file-system and command access to repair a defect.
#[async_trait]
pub trait RepairAgent: Send + Sync {
    /// Attempts a repair in `output_dir`; returns whether the agent
    /// believes it succeeded.
    async fn resolve(
        &self,
        problem: &str,
        error: &str,
        spec_summary: &str,
        output_dir: &Path,
    ) -> Result<bool, PipelineError>;
}

/// One parsed tool call from the agent.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ToolCall {
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    RunCommand { command: String },
    Finish { success: bool },
}

/// Resolves a relative path inside `root`, rejecting absolute paths and
/// any traversal outside the directory.
fn confined_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return None;
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return None,
        }
    }
    Some(root.join(candidate))
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(max_chars).collect();
        format!("{clipped}\n[... output clipped]")
    }
}

/// LLM-driven tool-loop implementation of [`RepairAgent`].
pub struct ToolRepairAgent {
    backend: Arc<dyn TextBackend>,
    retry: RetryPolicy,
    max_steps: usize,
}

impl ToolRepairAgent {
    /// Creates an agent over the given backend.
    pub fn new(backend: Arc<dyn TextBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            max_steps: MAX_STEPS,
        }
    }

    async fn run_command(&self, command: &str, output_dir: &Path) -> String {
        let mut process = tokio::process::Command::new("sh");
        process
            .arg("-c")
            .arg(command)
            .current_dir(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawned = match process.spawn() {
            Ok(child) => child,
            Err(err) => return format!("failed to spawn: {err}"),
        };

        match tokio::time::timeout(COMMAND_TIMEOUT, spawned.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                format!(
                    "exit code {}\nstdout:\n{}\nstderr:\n{}",
                    output.status.code().unwrap_or(-1),
                    clip(&stdout, OBSERVATION_LIMIT / 2),
                    clip(&stderr, OBSERVATION_LIMIT / 2),
                )
            }
            Ok(Err(err)) => format!("command failed: {err}"),
            Err(_) => format!("command timed out after {}s", COMMAND_TIMEOUT.as_secs()),
        }
    }
}

#[async_trait]
impl RepairAgent for ToolRepairAgent {
    async fn resolve(
        &self,
        problem: &str,
        error: &str,
        spec_summary: &str,
        output_dir: &Path,
    ) -> Result<bool, PipelineError> {
        let mut transcript = String::new();

        for step in 0..self.max_steps {
            let prompt = format!(
                "Task being repaired: {problem}\n\n\
                 Failing error:\n{error}\n\n\
                 Website specification summary:\n{spec_summary}\n\n\
                 Transcript of your previous tool calls and their results:\n{transcript}\n\
                 Issue your next tool call.",
            );

            let raw = self
                .retry
                .run(|| self.backend.complete_json(&prompt, Some(AGENT_SYSTEM_PROMPT)))
                .await?;

            let call = extract_json(&raw)
                .and_then(|json| serde_json::from_str::<ToolCall>(&json).ok());

            let Some(call) = call else {
                transcript.push_str("-> your last response was not a valid tool call\n");
                continue;
            };

            match call {
                ToolCall::ReadFile { path } => {
                    let observation = match confined_path(output_dir, &path) {
                        Some(full) => match std::fs::read_to_string(&full) {
                            Ok(content) => clip(&content, OBSERVATION_LIMIT),
                            Err(err) => format!("read failed: {err}"),
                        },
                        None => "path escapes the working directory".to_string(),
                    };
                    transcript.push_str(&format!("read_file {path}\n{observation}\n"));
                }
                ToolCall::WriteFile { path, content } => {
                    let observation = match confined_path(output_dir, &path) {
                        Some(full) => match std::fs::write(&full, &content) {
                            Ok(()) => format!("wrote {} bytes", content.len()),
                            Err(err) => format!("write failed: {err}"),
                        },
                        None => "path escapes the working directory".to_string(),
                    };
                    transcript.push_str(&format!("write_file {path}\n{observation}\n"));
                }
                ToolCall::RunCommand { command } => {
                    let observation = self.run_command(&command, output_dir).await;
                    transcript.push_str(&format!("run_command {command}\n{observation}\n"));
                }
                ToolCall::Finish { success } => {
                    tracing::info!(step, success, "Repair agent finished");
                    return Ok(success);
                }
            }
        }

        tracing::warn!(max_steps = self.max_steps, "Repair agent exhausted its step budget");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confinement_rejects_escapes() {
        let root = Path::new("/srv/site");
        assert!(confined_path(root, "logic.js").is_some());
        assert!(confined_path(root, "./pages/index.html").is_some());
        assert!(confined_path(root, "../other/logic.js").is_none());
        assert!(confined_path(root, "/etc/passwd").is_none());
        assert!(confined_path(root, "a/../../b").is_none());
    }

    #[test]
    fn tool_calls_parse_from_tagged_json() {
        let call: ToolCall =
            serde_json::from_str(r#"{"action":"write_file","path":"logic.js","content":"x"}"#)
                .expect("parses");
        assert!(matches!(call, ToolCall::WriteFile { .. }));

        let call: ToolCall =
            serde_json::from_str(r#"{"action":"finish","success":true}"#).expect("parses");
        assert!(matches!(call, ToolCall::Finish { success: true }));

        assert!(serde_json::from_str::<ToolCall>(r#"{"action":"format_disk"}"#).is_err());
    }

    #[test]
    fn clip_bounds_observations() {
        let long = "x".repeat(5000);
        let clipped = clip(&long, 100);
        assert!(clipped.len() < 200);
        assert!(clipped.ends_with("[... output clipped]"));
    }
}
