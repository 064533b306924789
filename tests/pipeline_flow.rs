//! End-to-end pipeline tests over scripted collaborators.
//!
//! The generative backend, task verifier, script runner and repair agent
//! are substituted with scripted fakes, so the whole orchestration flow
//! runs without network access, Node or a browser.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use webforge::contracts::ContractRegistry;
use webforge::error::{LlmError, PipelineError, SandboxError};
use webforge::llm::{RetryPolicy, TextBackend};
use webforge::model::{Task, TaskStatus};
use webforge::pipeline::{FileNames, GenerationState, Orchestrator, PipelineConfig, TaskVerifier};
use webforge::repair::RepairAgent;
use webforge::sandbox::{ExecOutput, ScriptRunner};
use webforge::validators::{ErrorCategory, ValidationOutcome};

/// A logic script that clears the structural sanity gate.
const LOGIC_SCRIPT: &str = "class BusinessLogic {\n    constructor() { this.cart = []; }\n    addToCart(id) { this.cart.push(id); return this.cart.length; }\n    cartContents() { return this.cart.slice(); }\n}\n\nif (typeof window !== 'undefined') {\n    window.AppLogic = new BusinessLogic();\n}\nif (typeof module !== 'undefined') {\n    module.exports = BusinessLogic;\n}";

/// Backend answering every pipeline prompt with a fixed, valid payload.
struct ScriptedBackend {
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn asked_for(&self, fragment: &str) -> bool {
        self.prompts
            .lock()
            .expect("prompt log")
            .iter()
            .any(|p| p.contains(fragment))
    }

    fn respond(prompt: &str) -> String {
        if prompt.contains("Invent between") {
            r#"{"tasks": [{"id": "t1", "name": "Add to cart", "description": "Put item 1 in the cart", "steps": ["open home page", "click add-to-cart on item 1", "view cart"]}]}"#.to_string()
        } else if prompt.contains("Design the static pages") {
            r#"{"pages": [{"name": "Home", "filename": "index.html", "description": "Entry page", "interfaces": ["addToCart"], "incoming_params": [], "outgoing_params": []}]}"#.to_string()
        } else if prompt.contains("Design the business-logic operations") {
            r#"{"interfaces": [{"name": "addToCart", "description": "Add an item to the cart", "parameters": [{"name": "id", "type": "string"}], "returns": "number", "related_tasks": ["t1"]}]}"#.to_string()
        } else if prompt.contains("Suggest a visual direction") {
            r##"{"palette": ["#223344"], "typography": "sans-serif", "tone": "clean"}"##.to_string()
        } else if prompt.contains("Generate realistic seed data") {
            r#"{"items": [{"id": "i1", "name": "Widget", "price": 4.5}]}"#.to_string()
        } else if prompt.contains("Write a Node.js test file") {
            "```js\nconst assert = require('assert');\nconst Logic = require('./logic.js');\nassert.strictEqual(new Logic().addToCart('i1'), 1);\n```".to_string()
        } else if prompt.contains("Plan the changes") {
            "## Plan\nAdd addToCart and cartContents; keep existing state.".to_string()
        } else if prompt.contains("Rewrite the COMPLETE business-logic") {
            format!("```js\n{LOGIC_SCRIPT}\n```")
        } else if prompt.contains("Write `evaluator.js`") {
            "```js\nclass Evaluator {\n    evaluate(taskId) { return { passed: true, reason: taskId }; }\n}\n```".to_string()
        } else if prompt.contains("Produce the static pages") {
            r#"{"index.html": "<html><body><button id=\"btn-add-item\">Add</button><a href=\"cart.html\">Cart</a></body></html>"}"#.to_string()
        } else if prompt.contains("Write `app.js`")
            || prompt.contains("Output the corrected COMPLETE `app.js`")
        {
            "```js\ndocument.addEventListener('DOMContentLoaded', () => {\n    document.getElementById('btn-add-item').addEventListener('click', () => window.AppLogic.addToCart('i1'));\n});\n```".to_string()
        } else {
            format!("```js\n{LOGIC_SCRIPT}\n```")
        }
    }

    fn answer(&self, prompt: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompt log")
            .push(prompt.to_string());
        Self::respond(prompt)
    }
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, _system: Option<&str>) -> Result<String, LlmError> {
        Ok(self.answer(prompt))
    }

    async fn complete_json(&self, prompt: &str, _system: Option<&str>) -> Result<String, LlmError> {
        Ok(self.answer(prompt))
    }
}

/// Verifier popping scripted outcomes; an empty script always passes.
struct ScriptedVerifier {
    outcomes: Mutex<VecDeque<ValidationOutcome>>,
    calls: AtomicU32,
}

impl ScriptedVerifier {
    fn passing() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    fn failing_with(category: ErrorCategory, detail: &str, times: usize) -> Arc<Self> {
        let outcomes = (0..times)
            .map(|_| ValidationOutcome::fail(category, detail))
            .collect();
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _state: &GenerationState,
        _task: &Task,
        _registry: &ContractRegistry,
    ) -> Result<ValidationOutcome, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .outcomes
            .lock()
            .expect("outcomes")
            .pop_front()
            .unwrap_or_else(ValidationOutcome::pass))
    }

    async fn backend_only(
        &self,
        _state: &GenerationState,
        _task: &Task,
    ) -> Result<ValidationOutcome, PipelineError> {
        Ok(ValidationOutcome::pass())
    }
}

/// Runner whose executions and syntax checks always succeed.
struct CleanRunner;

#[async_trait]
impl ScriptRunner for CleanRunner {
    async fn run(
        &self,
        _script: &Path,
        _args: &[String],
        _cwd: &Path,
    ) -> Result<ExecOutput, SandboxError> {
        Ok(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn check_syntax(&self, _code: &str) -> Result<ExecOutput, SandboxError> {
        Ok(ExecOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Agent that is never supposed to run.
struct NoopAgent;

#[async_trait]
impl RepairAgent for NoopAgent {
    async fn resolve(
        &self,
        _problem: &str,
        _error: &str,
        _spec_summary: &str,
        _output_dir: &Path,
    ) -> Result<bool, PipelineError> {
        Ok(true)
    }
}

/// Agent that replaces the logic script with structurally unsound output
/// and claims success anyway.
struct SabotagingAgent {
    calls: AtomicU32,
}

#[async_trait]
impl RepairAgent for SabotagingAgent {
    async fn resolve(
        &self,
        _problem: &str,
        _error: &str,
        _spec_summary: &str,
        output_dir: &Path,
    ) -> Result<bool, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::write(output_dir.join(FileNames::LOGIC), "agent garbage")?;
        Ok(true)
    }
}

fn orchestrator(
    backend: Arc<ScriptedBackend>,
    verifier: Arc<ScriptedVerifier>,
    agent: Arc<dyn RepairAgent>,
    config: PipelineConfig,
) -> Orchestrator {
    Orchestrator::new(
        backend,
        Arc::new(CleanRunner),
        verifier,
        agent,
        RetryPolicy::new(0, Duration::from_millis(1)),
        config,
    )
}

#[tokio::test]
async fn full_run_completes_every_task_and_persists_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = ScriptedBackend::new();
    let verifier = ScriptedVerifier::passing();

    let state = orchestrator(
        Arc::clone(&backend),
        Arc::clone(&verifier),
        Arc::new(NoopAgent),
        PipelineConfig::default(),
    )
    .run("online store", dir.path())
    .await
    .expect("run succeeds");

    assert_eq!(state.statuses.get("t1"), Some(&TaskStatus::Done));
    let summary = state.summary.as_ref().expect("summary");
    assert!(summary.overall);
    assert_eq!(summary.tasks.get("t1"), Some(&true));

    for artifact in [
        "intermediates/01_tasks.json",
        "intermediates/02_initial_architecture.json",
        "intermediates/03_interfaces.json",
        "intermediates/04_final_architecture.json",
        "intermediates/05_design_analysis.json",
        "intermediates/06_generated_data.json",
        "logic.js",
        "app.js",
        "evaluator.js",
        "tests_t1.js",
        "plan_t1.md",
        "index.html",
        "specs.json",
        "verification.json",
    ] {
        assert!(
            dir.path().join(artifact).is_file(),
            "missing artifact {artifact}"
        );
    }

    // Generation verified once, final verification once.
    assert_eq!(verifier.calls(), 2);
}

#[tokio::test]
async fn rerun_on_a_completed_directory_makes_no_backend_calls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first_backend = ScriptedBackend::new();
    orchestrator(
        Arc::clone(&first_backend),
        ScriptedVerifier::passing(),
        Arc::new(NoopAgent),
        PipelineConfig::default(),
    )
    .run("online store", dir.path())
    .await
    .expect("first run succeeds");
    assert!(first_backend.calls() > 0);

    let second_backend = ScriptedBackend::new();
    let second_verifier = ScriptedVerifier::passing();
    let state = orchestrator(
        Arc::clone(&second_backend),
        Arc::clone(&second_verifier),
        Arc::new(NoopAgent),
        PipelineConfig::default(),
    )
    .run("online store", dir.path())
    .await
    .expect("resumed run succeeds");

    assert_eq!(second_backend.calls(), 0);
    assert_eq!(second_verifier.calls(), 0);
    assert_eq!(state.statuses.get("t1"), Some(&TaskStatus::Done));
}

#[tokio::test]
async fn planning_resumes_after_the_last_persisted_intermediate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let intermediates = dir.path().join("intermediates");
    std::fs::create_dir_all(&intermediates).expect("mkdir");
    std::fs::write(
        intermediates.join("01_tasks.json"),
        r#"[{"id": "t1", "name": "Add to cart", "description": "Put item 1 in the cart", "steps": ["open home page"]}]"#,
    )
    .expect("seed tasks");

    let backend = ScriptedBackend::new();
    orchestrator(
        Arc::clone(&backend),
        ScriptedVerifier::passing(),
        Arc::new(NoopAgent),
        PipelineConfig::default(),
    )
    .run("online store", dir.path())
    .await
    .expect("run succeeds");

    // Tasks came from disk; every later planning step still ran.
    assert!(!backend.asked_for("Invent between"));
    assert!(backend.asked_for("Design the static pages"));
    assert!(backend.asked_for("Design the business-logic operations"));
}

#[tokio::test]
async fn failed_agent_repair_restores_the_backed_up_script() {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = ScriptedBackend::new();
    // Every verification attempt fails, forcing the full fix ladder:
    // targeted controller repair, then the agent, then the final attempt.
    let verifier =
        ScriptedVerifier::failing_with(ErrorCategory::GoldenPath, "Element not found: #x", 10);
    let agent = Arc::new(SabotagingAgent {
        calls: AtomicU32::new(0),
    });

    let state = orchestrator(
        Arc::clone(&backend),
        Arc::clone(&verifier),
        Arc::clone(&agent) as Arc<dyn RepairAgent>,
        PipelineConfig::default(),
    )
    .run("online store", dir.path())
    .await
    .expect("run still succeeds with a failed task");

    assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.statuses.get("t1"), Some(&TaskStatus::Failed));
    assert_eq!(state.summary.as_ref().expect("summary").tasks.get("t1"), Some(&false));

    // The agent's garbage failed the sanity gate, so the on-disk script is
    // byte-identical to the pre-attempt backup.
    let logic = std::fs::read_to_string(dir.path().join(FileNames::LOGIC)).expect("logic");
    assert_eq!(logic, LOGIC_SCRIPT);
    assert!(dir.path().join("_backup_t1").is_dir());
}
