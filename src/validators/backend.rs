//! Backend validation: run the task tests against the business logic.
//!
//! Tests execute in a real Node process rather than through static
//! analysis, so runtime logic errors surface, not only syntax errors.

use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, SandboxError};
use crate::pipeline::config::FileNames;
use crate::sandbox::ScriptRunner;

use super::{ErrorCategory, ValidationOutcome};

/// Characters of process output kept as failure detail.
const DETAIL_TAIL_CHARS: usize = 500;

/// Validates the generated business logic by executing its tests.
pub struct BackendValidator {
    runner: Arc<dyn ScriptRunner>,
}

impl BackendValidator {
    /// Creates a validator over the given script runner.
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { runner }
    }

    /// Copies a task's test file into the canonical test location, then
    /// validates. Generators write per-task test files; the logic script
    /// expects a single well-known sibling.
    pub async fn validate_task(
        &self,
        output_dir: &Path,
        task_id: &str,
    ) -> Result<ValidationOutcome, PipelineError> {
        let task_tests = output_dir.join(FileNames::task_tests(task_id));
        if !task_tests.exists() {
            return Ok(ValidationOutcome::fail(
                ErrorCategory::Backend,
                format!("Missing {}", FileNames::task_tests(task_id)),
            ));
        }
        std::fs::copy(&task_tests, output_dir.join(FileNames::BACKEND_TESTS))?;
        self.validate(output_dir).await
    }

    /// Runs `backend_tests.js` against `logic.js` in `output_dir`.
    ///
    /// Success is exit code zero. Timeouts are normal failing outcomes; a
    /// missing interpreter is an environment fault.
    pub async fn validate(&self, output_dir: &Path) -> Result<ValidationOutcome, PipelineError> {
        let logic = output_dir.join(FileNames::LOGIC);
        if !logic.exists() {
            return Ok(ValidationOutcome::fail(
                ErrorCategory::Backend,
                format!("Missing {}", FileNames::LOGIC),
            ));
        }
        let tests = output_dir.join(FileNames::BACKEND_TESTS);
        if !tests.exists() {
            return Ok(ValidationOutcome::fail(
                ErrorCategory::Backend,
                format!("Missing {}", FileNames::BACKEND_TESTS),
            ));
        }

        match self.runner.run(&tests, &[], output_dir).await {
            Ok(output) if output.success() => Ok(ValidationOutcome::pass()),
            Ok(output) => Ok(ValidationOutcome::fail(
                ErrorCategory::Backend,
                format!("Test failed: {}", output.tail(DETAIL_TAIL_CHARS)),
            )),
            Err(SandboxError::Timeout { seconds }) => Ok(ValidationOutcome::fail(
                ErrorCategory::Backend,
                format!("Test timeout exceeded after {seconds}s"),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExecOutput;
    use async_trait::async_trait;

    /// Runner returning a fixed result, for validator tests without Node.
    struct FixedRunner {
        result: Result<ExecOutput, fn() -> SandboxError>,
    }

    impl FixedRunner {
        fn exits(exit_code: i32, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(ExecOutput {
                    exit_code,
                    stdout: String::new(),
                    stderr: stderr.to_string(),
                }),
            })
        }

        fn fails(make: fn() -> SandboxError) -> Arc<Self> {
            Arc::new(Self { result: Err(make) })
        }
    }

    #[async_trait]
    impl ScriptRunner for FixedRunner {
        async fn run(
            &self,
            _script: &Path,
            _args: &[String],
            _cwd: &Path,
        ) -> Result<ExecOutput, SandboxError> {
            match &self.result {
                Ok(output) => Ok(output.clone()),
                Err(make) => Err(make()),
            }
        }

        async fn check_syntax(&self, _code: &str) -> Result<ExecOutput, SandboxError> {
            Ok(ExecOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn seeded_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(FileNames::LOGIC), "class L {}").expect("write");
        std::fs::write(dir.path().join(FileNames::BACKEND_TESTS), "// tests").expect("write");
        dir
    }

    #[tokio::test]
    async fn repeated_validation_yields_identical_outcomes() {
        let dir = seeded_dir();
        let validator = BackendValidator::new(FixedRunner::exits(1, "AssertionError: nope"));

        let first = validator.validate(dir.path()).await.expect("outcome");
        let second = validator.validate(dir.path()).await.expect("outcome");

        assert!(!first.success);
        assert_eq!(first.error_text(), second.error_text());
        assert!(first.error_text().contains("AssertionError"));
    }

    #[tokio::test]
    async fn exit_zero_passes() {
        let dir = seeded_dir();
        let validator = BackendValidator::new(FixedRunner::exits(0, ""));
        let outcome = validator.validate(dir.path()).await.expect("outcome");
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn missing_logic_fails_without_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let validator = BackendValidator::new(FixedRunner::exits(0, ""));
        let outcome = validator.validate(dir.path()).await.expect("outcome");
        assert!(!outcome.success);
        assert!(outcome.error_text().contains("logic.js"));
    }

    #[tokio::test]
    async fn timeout_is_a_failing_outcome_not_an_error() {
        let dir = seeded_dir();
        let validator =
            BackendValidator::new(FixedRunner::fails(|| SandboxError::Timeout { seconds: 300 }));
        let outcome = validator.validate(dir.path()).await.expect("outcome");
        assert!(!outcome.success);
        assert!(outcome.error_text().contains("timeout"));
    }

    #[tokio::test]
    async fn missing_runner_is_an_error() {
        let dir = seeded_dir();
        let validator = BackendValidator::new(FixedRunner::fails(|| {
            SandboxError::RunnerMissing("node".into())
        }));
        let result = validator.validate(dir.path()).await;
        assert!(matches!(result, Err(ref e) if e.is_fatal()));
    }

    #[tokio::test]
    async fn validate_task_stages_the_task_tests() {
        let dir = seeded_dir();
        std::fs::remove_file(dir.path().join(FileNames::BACKEND_TESTS)).expect("remove");
        std::fs::write(dir.path().join(FileNames::task_tests("t1")), "// t1 tests")
            .expect("write");

        let validator = BackendValidator::new(FixedRunner::exits(0, ""));
        let outcome = validator.validate_task(dir.path(), "t1").await.expect("outcome");

        assert!(outcome.success);
        let staged =
            std::fs::read_to_string(dir.path().join(FileNames::BACKEND_TESTS)).expect("read");
        assert_eq!(staged, "// t1 tests");
    }
}
