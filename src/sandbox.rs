//! Sandboxed execution of generated scripts.
//!
//! Generated business logic and its tests run as isolated Node.js processes
//! with a hard wall-clock timeout. The trait seam lets validators be tested
//! without an interpreter on the host.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::SandboxError;

/// Default wall-clock limit for one script execution.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Wall-clock limit for a syntax-only check.
const SYNTAX_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the process exited cleanly.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// A bounded tail of stderr (or stdout when stderr is empty), suitable
    /// for error details fed back into repair prompts.
    pub fn tail(&self, max_chars: usize) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let text = text.trim();
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let skip = text.chars().count() - max_chars;
        text.chars().skip(skip).collect()
    }
}

/// Executes a script file in an isolated process.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs `script` with `args`, working directory `cwd`.
    ///
    /// A timeout is reported as [`SandboxError::Timeout`]; callers treat it
    /// as a normal failing outcome, not a fault.
    async fn run(&self, script: &Path, args: &[String], cwd: &Path)
        -> Result<ExecOutput, SandboxError>;

    /// Checks the syntax of `code` without executing it.
    async fn check_syntax(&self, code: &str) -> Result<ExecOutput, SandboxError>;
}

/// Node.js-backed script runner.
pub struct NodeRunner {
    program: String,
    timeout: Duration,
}

impl NodeRunner {
    /// Creates a runner using `node` from `PATH`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("node", timeout)
    }

    /// Creates a runner with an explicit interpreter binary.
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    async fn execute(
        &self,
        args: Vec<String>,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<ExecOutput, SandboxError> {
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SandboxError::RunnerMissing(self.program.clone())
            } else {
                SandboxError::SpawnFailed(e.to_string())
            }
        })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout {
                seconds: timeout.as_secs(),
            })?
            .map_err(SandboxError::Io)?;

        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl Default for NodeRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ScriptRunner for NodeRunner {
    async fn run(
        &self,
        script: &Path,
        args: &[String],
        cwd: &Path,
    ) -> Result<ExecOutput, SandboxError> {
        let mut full_args = vec![script.to_string_lossy().into_owned()];
        full_args.extend(args.iter().cloned());
        tracing::debug!(script = %script.display(), "Running script in sandbox");
        self.execute(full_args, Some(cwd), self.timeout).await
    }

    async fn check_syntax(&self, code: &str) -> Result<ExecOutput, SandboxError> {
        let dir = tempfile::tempdir().map_err(SandboxError::Io)?;
        let path = dir.path().join("check.js");
        let mut file = tokio::fs::File::create(&path).await.map_err(SandboxError::Io)?;
        file.write_all(code.as_bytes()).await.map_err(SandboxError::Io)?;
        file.flush().await.map_err(SandboxError::Io)?;

        self.execute(
            vec!["--check".to_string(), path.to_string_lossy().into_owned()],
            None,
            SYNTAX_CHECK_TIMEOUT,
        )
        .await
    }
}
