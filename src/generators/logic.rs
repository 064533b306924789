//! Business-logic generators: task tests, implementation plans, the shared
//! logic script and its targeted fixes.
//!
//! The logic script is one shared module; implementation always regenerates
//! the whole file so global consistency is the backend's problem, not a
//! patch-merge problem.

use std::sync::Arc;

use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::model::{Task, WebsiteSpec};

use super::{code_call, truncate_chars};

/// Name the logic object is published under on the page.
pub const LOGIC_NAMESPACE: &str = "AppLogic";

/// Minimum plausible size of a regenerated logic script.
const MIN_LOGIC_CHARS: usize = 100;

/// Characters of the current script embedded in prompts.
const LOGIC_CONTEXT_CHARS: usize = 12000;

const LOGIC_SYSTEM_PROMPT: &str = "You write plain-JavaScript business logic \
for static websites. No frameworks, no network calls; persist state in \
localStorage. Respond with a single JavaScript code block.";

/// Structural gate applied before a regenerated or repaired script is
/// accepted: a clearly truncated file, or one that no longer publishes the
/// logic object, must never replace a working script.
pub fn passes_sanity(code: &str) -> bool {
    let trimmed = code.trim();
    trimmed.len() >= MIN_LOGIC_CHARS
        && trimmed.contains("class")
        && trimmed.contains("window.")
        && trimmed.contains(LOGIC_NAMESPACE)
}

/// Minimal starting script, replaced by the first implementation pass.
pub fn base_logic() -> String {
    format!(
        "class BusinessLogic {{\n    constructor() {{\n        this._initData();\n    }}\n\n    _initData() {{\n        // populated by generated implementations\n    }}\n}}\n\nif (typeof window !== 'undefined') {{\n    window.{LOGIC_NAMESPACE} = new BusinessLogic();\n}}\nif (typeof module !== 'undefined') {{\n    module.exports = BusinessLogic;\n}}\n"
    )
}

/// Generators for the per-task logic loop.
pub struct LogicGenerator {
    backend: Arc<dyn TextBackend>,
    retry: RetryPolicy,
}

impl LogicGenerator {
    /// Creates the logic generators.
    pub fn new(backend: Arc<dyn TextBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Generates a task-scoped test file that exercises the logic script.
    pub async fn generate_task_tests(
        &self,
        task: &Task,
        spec: &WebsiteSpec,
        seed_data_json: &str,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "Write a Node.js test file for this user task on a '{topic}' website.\n\
             Task: {description}\nSteps:\n{steps}\n\
             Available interfaces:\n{interfaces}\n\
             Seed data:\n{data}\n\n\
             The tests must `require('./logic.js')`, instantiate the exported class, \
             call its methods, assert with `assert`, and exit non-zero on any failure. \
             No browser APIs.",
            topic = spec.topic,
            description = task.description,
            steps = serde_json::to_string_pretty(&task.steps)?,
            interfaces = serde_json::to_string_pretty(&spec.interfaces)?,
            data = truncate_chars(seed_data_json, 4000),
        );
        code_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            LOGIC_SYSTEM_PROMPT,
            "js",
            "task tests",
        )
        .await
    }

    /// Generates a short implementation plan for making the tests pass.
    pub async fn generate_task_plan(
        &self,
        task: &Task,
        tests: &str,
        current_logic: &str,
        spec: &WebsiteSpec,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "Plan the changes to the business logic of a '{topic}' website so the new \
             tests pass while everything that already works keeps working.\n\
             Task: {description}\n\nNew tests:\n{tests}\n\n\
             Current logic script:\n{logic}\n\n\
             Respond with a short markdown plan: methods to add or change, state to keep.",
            topic = spec.topic,
            description = task.description,
            tests = truncate_chars(tests, 6000),
            logic = truncate_chars(current_logic, LOGIC_CONTEXT_CHARS),
        );
        let plan = self
            .retry
            .run(|| self.backend.complete(&prompt, Some(LOGIC_SYSTEM_PROMPT)))
            .await?;
        if plan.trim().is_empty() {
            return Err(PipelineError::SpecDefect("task plan: empty completion".into()));
        }
        Ok(plan.trim().to_string())
    }

    /// Regenerates the entire logic script so the new tests pass.
    pub async fn implement_task_logic(
        &self,
        task: &Task,
        tests: &str,
        current_logic: &str,
        spec: &WebsiteSpec,
        plan: &str,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "Rewrite the COMPLETE business-logic script for a '{topic}' website so the \
             new tests pass. Preserve every existing capability; output the whole file, \
             not a diff.\n\
             Task: {description}\nPlan:\n{plan}\n\nNew tests:\n{tests}\n\n\
             Current script:\n{logic}\n\n\
             The file must define the logic in a class, attach an instance to \
             `window.{namespace}` when `window` exists, and `module.exports` the class \
             for Node.",
            topic = spec.topic,
            description = task.description,
            plan = truncate_chars(plan, 3000),
            tests = truncate_chars(tests, 6000),
            logic = truncate_chars(current_logic, LOGIC_CONTEXT_CHARS),
            namespace = LOGIC_NAMESPACE,
        );
        code_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            LOGIC_SYSTEM_PROMPT,
            "js",
            "logic implementation",
        )
        .await
    }

    /// Regenerates the logic script to clear a specific failure.
    pub async fn implement_task_fix(
        &self,
        task: &Task,
        tests: &str,
        error: &str,
        current_logic: &str,
        spec: &WebsiteSpec,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "The business-logic script of a '{topic}' website fails its tests.\n\
             Task: {description}\n\nFailure:\n{error}\n\nTests:\n{tests}\n\n\
             Current script:\n{logic}\n\n\
             Output the corrected COMPLETE script. Keep the `window.{namespace}` \
             attachment and the `module.exports`.",
            topic = spec.topic,
            description = task.description,
            error = truncate_chars(error, 2000),
            tests = truncate_chars(tests, 6000),
            logic = truncate_chars(current_logic, LOGIC_CONTEXT_CHARS),
            namespace = LOGIC_NAMESPACE,
        );
        code_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            LOGIC_SYSTEM_PROMPT,
            "js",
            "logic fix",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_logic_passes_its_own_gate() {
        assert!(passes_sanity(&base_logic()));
    }

    #[test]
    fn sanity_rejects_truncated_output() {
        assert!(!passes_sanity(""));
        assert!(!passes_sanity("class X {}"));
        assert!(!passes_sanity(
            "// sorry, here is a partial answer\nwindow.AppLogic ="
        ));
    }

    #[test]
    fn sanity_requires_the_namespace_attachment() {
        let detached = "class BusinessLogic { constructor() { this.items = []; } }\n\
                        module.exports = BusinessLogic;\n// plenty of padding to clear the length gate\n"
            .repeat(2);
        assert!(!passes_sanity(&detached));

        let attached = format!("{detached}\nwindow.{LOGIC_NAMESPACE} = new BusinessLogic();");
        assert!(passes_sanity(&attached));
    }
}
