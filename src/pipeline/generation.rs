//! Generation phase: the per-task generate/test/fix loop.
//!
//! Tasks run strictly sequentially because they share one mutable
//! business-logic script. Each task moves through
//! tests → plan → implementation → markup/controller → verification, with
//! tiered failure recovery and a fixed fix budget; exhausting the budget
//! fails the task and the loop moves on.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::contracts::ContractRegistry;
use crate::error::{PipelineError, SandboxError};
use crate::generators::{
    base_logic, passes_sanity, FrontendGenerator, LogicGenerator, PlanGenerator,
};
use crate::llm::{RetryPolicy, TextBackend};
use crate::model::{Task, TaskStatus};
use crate::repair::{classify, Backup, FixTier, RepairAgent};
use crate::sandbox::ScriptRunner;
use crate::validators::{
    BackendValidator, GoldenPathValidator, IntegrationValidator, ValidationOutcome,
};

use super::config::{FileNames, IntermediateFiles, PipelineConfig};
use super::context::GenerationState;

/// Scripts shorter than this are assumed to still be the base template and
/// not worth a verify-before-skip check.
const MIN_ESTABLISHED_LOGIC_CHARS: usize = 200;

/// Progress of one task through the generation loop. Recorded for logging;
/// the terminal states also land in [`GenerationState::statuses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    AwaitingTests,
    AwaitingPlan,
    AwaitingImplementation,
    Verifying,
    Fixing(FixTier),
    Done,
    Failed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::AwaitingTests => write!(f, "awaiting_tests"),
            TaskState::AwaitingPlan => write!(f, "awaiting_plan"),
            TaskState::AwaitingImplementation => write!(f, "awaiting_implementation"),
            TaskState::Verifying => write!(f, "verifying"),
            TaskState::Fixing(FixTier::Targeted) => write!(f, "fixing_targeted"),
            TaskState::Fixing(FixTier::Agent) => write!(f, "fixing_agent"),
            TaskState::Done => write!(f, "done"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Verification seam of the generation loop.
///
/// Production composes the three validators; tests substitute scripted
/// outcomes so the loop can be exercised without Node or a browser.
#[async_trait]
pub trait TaskVerifier: Send + Sync {
    /// Full layered verification: backend, then integration, then golden
    /// path, short-circuiting on the first failure.
    async fn verify(
        &self,
        state: &GenerationState,
        task: &Task,
        registry: &ContractRegistry,
    ) -> Result<ValidationOutcome, PipelineError>;

    /// Backend layer only; used by verify-before-skip, which must not
    /// spend backend calls or a browser session.
    async fn backend_only(
        &self,
        state: &GenerationState,
        task: &Task,
    ) -> Result<ValidationOutcome, PipelineError>;
}

/// Picks the page a task's golden path starts on: the first page whose
/// name appears in a task step, else the entry page.
pub fn start_page_for(task: &Task, pages: &[String]) -> String {
    for step in &task.steps {
        let step = step.to_lowercase();
        for page in pages {
            let stem = page.trim_end_matches(".html").to_lowercase();
            if !stem.is_empty() && step.contains(&stem) {
                return page.clone();
            }
        }
    }
    "index.html".to_string()
}

/// Production [`TaskVerifier`] composing the three validators.
pub struct LayeredVerifier {
    backend_validator: BackendValidator,
    integration: IntegrationValidator,
    golden_path: GoldenPathValidator,
    enable_golden_path: bool,
}

impl LayeredVerifier {
    /// Wires the validators from the shared collaborators.
    pub fn new(
        backend: Arc<dyn TextBackend>,
        runner: Arc<dyn ScriptRunner>,
        retry: RetryPolicy,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            backend_validator: BackendValidator::new(runner),
            integration: IntegrationValidator::new(config.nav_timeout),
            golden_path: GoldenPathValidator::new(
                backend,
                retry,
                config.max_selectors,
                config.html_truncate_chars,
                config.logic_truncate_chars,
                config.nav_timeout,
            ),
            enable_golden_path: config.enable_golden_path,
        }
    }
}

#[async_trait]
impl TaskVerifier for LayeredVerifier {
    async fn verify(
        &self,
        state: &GenerationState,
        task: &Task,
        registry: &ContractRegistry,
    ) -> Result<ValidationOutcome, PipelineError> {
        let outcome = self
            .backend_validator
            .validate_task(&state.output_dir, &task.id)
            .await?;
        if !outcome.success {
            return Ok(outcome);
        }

        let pages = state.page_files();
        let outcome = self
            .integration
            .validate_all_pages(&state.output_dir, &pages)
            .await?;
        if !outcome.success {
            return Ok(outcome);
        }

        if !self.enable_golden_path {
            return Ok(ValidationOutcome::pass());
        }

        let start_page = start_page_for(task, &pages);
        let markup = state
            .pages
            .get(&start_page)
            .cloned()
            .or_else(|| state.load_file(&start_page));
        let Some(markup) = markup else {
            return Ok(ValidationOutcome::fail(
                crate::validators::ErrorCategory::GoldenPath,
                format!("Start page not found: {start_page}"),
            ));
        };

        self.golden_path
            .validate(
                task,
                &state.output_dir,
                &start_page,
                &markup,
                &state.logic,
                &state.evaluator,
                registry,
            )
            .await
    }

    async fn backend_only(
        &self,
        state: &GenerationState,
        task: &Task,
    ) -> Result<ValidationOutcome, PipelineError> {
        self.backend_validator
            .validate_task(&state.output_dir, &task.id)
            .await
    }
}

/// The per-task generate/test/fix loop.
pub struct GenerationPhase {
    plan_gen: PlanGenerator,
    logic_gen: LogicGenerator,
    frontend_gen: FrontendGenerator,
    verifier: Arc<dyn TaskVerifier>,
    repair_agent: Arc<dyn RepairAgent>,
    runner: Arc<dyn ScriptRunner>,
    limiter: Arc<Semaphore>,
    config: PipelineConfig,
}

impl GenerationPhase {
    /// Creates the phase over the shared collaborators.
    pub fn new(
        backend: Arc<dyn TextBackend>,
        runner: Arc<dyn ScriptRunner>,
        verifier: Arc<dyn TaskVerifier>,
        repair_agent: Arc<dyn RepairAgent>,
        retry: RetryPolicy,
        config: PipelineConfig,
    ) -> Self {
        Self {
            plan_gen: PlanGenerator::new(Arc::clone(&backend), retry.clone()),
            logic_gen: LogicGenerator::new(Arc::clone(&backend), retry.clone()),
            frontend_gen: FrontendGenerator::new(backend, retry),
            verifier,
            repair_agent,
            runner,
            limiter: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    /// Fast syntax gate on repaired logic, before the structural check.
    ///
    /// A missing interpreter is fatal; any other checker hiccup falls back
    /// to the structural gate alone.
    async fn syntax_ok(&self, code: &str) -> Result<bool, PipelineError> {
        match self.runner.check_syntax(code).await {
            Ok(output) if output.success() => Ok(true),
            Ok(output) => {
                tracing::warn!(detail = %output.tail(500), "Repaired logic failed the syntax check");
                Ok(false)
            }
            Err(err @ SandboxError::RunnerMissing(_)) => Err(err.into()),
            Err(err) => {
                tracing::warn!(error = %err, "Syntax check unavailable, using structural gate only");
                Ok(true)
            }
        }
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>, PipelineError> {
        self.limiter
            .acquire()
            .await
            .map_err(|e| PipelineError::Environment(format!("concurrency limiter closed: {e}")))
    }

    /// Runs the loop over every task. Per-task failures downgrade to a
    /// failed status; only environment faults abort the phase.
    pub async fn execute(
        &self,
        state: &mut GenerationState,
        registry: &ContractRegistry,
    ) -> Result<(), PipelineError> {
        if state.seed_data.is_none() {
            tracing::info!("Generating seed data");
            let _permit = self.permit().await?;
            let data = self.plan_gen.generate_seed_data(&state.spec).await?;
            state.save_intermediate(IntermediateFiles::GENERATED_DATA, &data)?;
            state.seed_data = Some(data);
        }

        if state.logic.is_empty() {
            state.logic = base_logic();
        }

        let tasks = state.spec.tasks.clone();
        let total = tasks.len();
        for (index, task) in tasks.iter().enumerate() {
            if state.statuses.get(&task.id) == Some(&TaskStatus::Done) {
                tracing::info!(task = %task.id, "Skipping task (already done)");
                continue;
            }

            tracing::info!(task = %task.id, index = index + 1, total, "Processing task");
            match self.process_task(state, task, registry).await {
                Ok(()) => {
                    state.statuses.insert(task.id.clone(), TaskStatus::Done);
                    tracing::info!(task = %task.id, "Task completed");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::error!(task = %task.id, error = %err, "Task failed");
                    state.statuses.insert(task.id.clone(), TaskStatus::Failed);
                }
            }
        }
        Ok(())
    }

    async fn process_task(
        &self,
        state: &mut GenerationState,
        task: &Task,
        registry: &ContractRegistry,
    ) -> Result<(), PipelineError> {
        let seed_json = state
            .seed_data
            .as_ref()
            .map(|data| data.to_json())
            .unwrap_or_else(|| "{}".to_string());

        tracing::debug!(task = %task.id, state = %TaskState::AwaitingTests, "Task state");
        let tests_file = FileNames::task_tests(&task.id);
        let tests = match state.load_file(&tests_file) {
            Some(existing) => {
                tracing::info!(task = %task.id, "Skipping test generation (found existing)");
                existing
            }
            None => {
                let _permit = self.permit().await?;
                let tests = self
                    .logic_gen
                    .generate_task_tests(task, &state.spec, &seed_json)
                    .await?;
                state.save_file(&tests_file, &tests)?;
                tests
            }
        };

        tracing::debug!(task = %task.id, state = %TaskState::AwaitingPlan, "Task state");
        let plan_file = FileNames::task_plan(&task.id);
        let existing_plan = state.load_file(&plan_file);
        let plan = match &existing_plan {
            Some(plan) => {
                tracing::info!(task = %task.id, "Skipping planning (found existing)");
                plan.clone()
            }
            None => {
                let _permit = self.permit().await?;
                let plan = self
                    .logic_gen
                    .generate_task_plan(task, &tests, &state.logic, &state.spec)
                    .await?;
                state.save_file(&plan_file, &plan)?;
                plan
            }
        };
        state.task_plans.insert(task.id.clone(), plan.clone());

        // A stale plan is never trusted blindly: skipping is only allowed
        // once the current script demonstrably passes this task's tests and
        // the downstream artifacts exist.
        if existing_plan.is_some()
            && state.logic.trim().len() >= MIN_ESTABLISHED_LOGIC_CHARS
            && state.has_file(FileNames::CONTROLLER)
            && !state.pages.is_empty()
        {
            match self.verifier.backend_only(state, task).await {
                Ok(outcome) if outcome.success => {
                    tracing::info!(task = %task.id,
                        "Skipping implementation (existing code verified)");
                    return Ok(());
                }
                Ok(outcome) => {
                    tracing::warn!(task = %task.id, detail = %outcome.error_text(),
                        "Existing code failed re-verification, regenerating");
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err,
                        "Re-verification errored, regenerating");
                }
            }
        }

        tracing::debug!(task = %task.id, state = %TaskState::AwaitingImplementation, "Task state");
        {
            let _permit = self.permit().await?;
            let new_logic = self
                .logic_gen
                .implement_task_logic(task, &tests, &state.logic, &state.spec, &plan)
                .await?;
            if passes_sanity(&new_logic) {
                state.logic = new_logic;
            } else {
                tracing::warn!(task = %task.id,
                    "Discarding structurally unsound logic, keeping previous script");
                if state.logic.trim().len() < MIN_ESTABLISHED_LOGIC_CHARS {
                    state.logic = base_logic();
                }
            }
            state.save_file(FileNames::LOGIC, &state.logic)?;
        }

        {
            let _permit = self.permit().await?;
            match self
                .frontend_gen
                .generate_evaluator(&state.spec, &state.logic)
                .await
            {
                Ok(evaluator) => {
                    state.evaluator = evaluator;
                    state.save_file(FileNames::EVALUATOR, &state.evaluator)?;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err,
                        "Evaluator generation failed, keeping previous evaluator");
                }
            }
        }

        {
            let _permit = self.permit().await?;
            let new_pages = self
                .frontend_gen
                .generate_pages(task, &state.spec, registry, &state.pages)
                .await?;
            for (name, markup) in new_pages {
                let missing = registry.validate_markup(&markup, &name);
                if !missing.is_empty() {
                    tracing::warn!(page = %name, ?missing,
                        "Generated markup is missing contract ids");
                }
                state.save_file(&name, &markup)?;
                state.pages.insert(name, markup);
            }
        }

        {
            let _permit = self.permit().await?;
            let controller = self
                .frontend_gen
                .generate_controller(task, &state.pages, &state.logic, &state.spec, registry)
                .await?;
            state.save_file(FileNames::CONTROLLER, &controller)?;
        }

        self.verify_with_fixes(state, task, &tests, registry).await
    }

    async fn verify_with_fixes(
        &self,
        state: &mut GenerationState,
        task: &Task,
        tests: &str,
        registry: &ContractRegistry,
    ) -> Result<(), PipelineError> {
        for attempt in 0..self.config.max_fix_attempts {
            tracing::debug!(task = %task.id, state = %TaskState::Verifying,
                attempt = attempt + 1, "Task state");
            let outcome = self.verifier.verify(state, task, registry).await?;
            if outcome.success {
                return Ok(());
            }

            let error_text = outcome.error_text();
            tracing::warn!(task = %task.id, attempt = attempt + 1, detail = %error_text,
                "Verification failed");

            if attempt + 1 < self.config.max_fix_attempts {
                self.apply_fix(state, task, tests, &error_text, attempt, registry)
                    .await?;
            }
        }

        Err(PipelineError::TaskFailed {
            id: task.id.clone(),
            attempts: self.config.max_fix_attempts,
        })
    }

    /// Routes a failure to its repair tier.
    ///
    /// Targeted failures always get the cheap single-layer repair; agent
    /// failures get one targeted attempt first (a browser-level symptom is
    /// often still a one-layer defect), then escalate.
    async fn apply_fix(
        &self,
        state: &mut GenerationState,
        task: &Task,
        tests: &str,
        error: &str,
        attempt: u32,
        registry: &ContractRegistry,
    ) -> Result<(), PipelineError> {
        let tier = classify(error);
        let use_targeted = tier == FixTier::Targeted || attempt == 0;
        tracing::debug!(task = %task.id,
            state = %TaskState::Fixing(if use_targeted { FixTier::Targeted } else { FixTier::Agent }),
            "Task state");

        if !use_targeted {
            return self.agent_fix(state, task, error).await;
        }

        if error.starts_with("Backend") || tier == FixTier::Targeted {
            let _permit = self.permit().await?;
            match self
                .logic_gen
                .implement_task_fix(task, tests, error, &state.logic, &state.spec)
                .await
            {
                Ok(new_logic) => {
                    if passes_sanity(&new_logic) && self.syntax_ok(&new_logic).await? {
                        state.logic = new_logic;
                        state.save_file(FileNames::LOGIC, &state.logic)?;
                    } else {
                        tracing::warn!(task = %task.id,
                            "Targeted fix produced unsound logic, keeping previous script");
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err, "Targeted logic fix failed");
                }
            }
        } else if error.contains("Element not found")
            || error.contains("CSS")
            || error.contains("Timeout")
        {
            // The controller is the glue layer; repair it before markup.
            let current = state.load_file(FileNames::CONTROLLER).unwrap_or_default();
            let _permit = self.permit().await?;
            match self
                .frontend_gen
                .fix_controller(
                    task,
                    &state.pages,
                    &current,
                    &state.logic,
                    &state.spec,
                    error,
                    registry,
                )
                .await
            {
                Ok(controller) => state.save_file(FileNames::CONTROLLER, &controller)?,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err, "Controller fix failed");
                }
            }
        } else {
            let _permit = self.permit().await?;
            match self
                .frontend_gen
                .fix_pages(task, &state.spec, error, &state.pages, registry)
                .await
            {
                Ok(pages) => {
                    for (name, markup) in pages {
                        state.save_file(&name, &markup)?;
                        state.pages.insert(name, markup);
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err, "Markup fix failed");
                }
            }
        }
        Ok(())
    }

    /// Runs the autonomous repair agent bracketed by backup/restore and the
    /// structural sanity gate.
    async fn agent_fix(
        &self,
        state: &mut GenerationState,
        task: &Task,
        error: &str,
    ) -> Result<(), PipelineError> {
        let mut files: Vec<String> = [FileNames::LOGIC, FileNames::CONTROLLER, FileNames::EVALUATOR]
            .iter()
            .map(|s| s.to_string())
            .collect();
        files.extend(state.pages.keys().cloned());
        let backup = Backup::capture(&state.output_dir, &task.id, &files)?;

        let spec_summary = serde_json::to_string(&state.spec)?;
        tracing::info!(task = %task.id, "Escalating to the repair agent");
        let agent_result = self
            .repair_agent
            .resolve(&task.description, error, &spec_summary, &state.output_dir)
            .await;

        match agent_result {
            Err(err) if err.is_fatal() => {
                backup.restore(&state.output_dir)?;
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(task = %task.id, error = %err, "Agent repair errored");
                backup.restore(&state.output_dir)?;
                return Ok(());
            }
            Ok(claimed_success) => {
                tracing::info!(task = %task.id, claimed_success, "Agent repair finished");
            }
        }

        // The sanity gate applies regardless of what the agent claims.
        let on_disk = state.load_file(FileNames::LOGIC).unwrap_or_default();
        if passes_sanity(&on_disk) {
            state.logic = on_disk;
            for name in state.pages.keys().cloned().collect::<Vec<_>>() {
                if let Some(content) = state.load_file(&name) {
                    state.pages.insert(name, content);
                }
            }
            if let Some(evaluator) = state.load_file(FileNames::EVALUATOR) {
                state.evaluator = evaluator;
            }
        } else {
            tracing::warn!(task = %task.id,
                "Agent produced structurally unsound logic, restoring backup");
            backup.restore(&state.output_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_steps(steps: &[&str]) -> Task {
        Task {
            id: "t1".into(),
            name: "t1".into(),
            description: "desc".into(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn start_page_matches_step_wording() {
        let pages = vec!["index.html".to_string(), "cart.html".to_string()];
        let task = task_with_steps(&["open home page", "view cart"]);
        assert_eq!(start_page_for(&task, &pages), "cart.html");
    }

    #[test]
    fn start_page_defaults_to_index() {
        let pages = vec!["index.html".to_string(), "about.html".to_string()];
        let task = task_with_steps(&["do something unrelated"]);
        assert_eq!(start_page_for(&task, &pages), "index.html");
    }

    #[test]
    fn task_state_labels_are_stable() {
        assert_eq!(TaskState::AwaitingTests.to_string(), "awaiting_tests");
        assert_eq!(
            TaskState::Fixing(FixTier::Agent).to_string(),
            "fixing_agent"
        );
        assert_eq!(TaskState::Done.to_string(), "done");
    }
}
