//! Run orchestration: restore, plan, generate, verify.

use std::path::Path;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::model::TaskStatus;
use crate::repair::{RepairAgent, ToolRepairAgent};
use crate::sandbox::{NodeRunner, ScriptRunner};

use super::config::PipelineConfig;
use super::context::GenerationState;
use super::generation::{GenerationPhase, LayeredVerifier, TaskVerifier};
use super::planning::PlanningPhase;
use super::verification::VerificationPhase;

/// Sequences the phases of one run and owns its state.
pub struct Orchestrator {
    backend: Arc<dyn TextBackend>,
    runner: Arc<dyn ScriptRunner>,
    verifier: Arc<dyn TaskVerifier>,
    repair_agent: Arc<dyn RepairAgent>,
    retry: RetryPolicy,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Creates an orchestrator with explicit collaborators. Tests use this
    /// to substitute scripted seams.
    pub fn new(
        backend: Arc<dyn TextBackend>,
        runner: Arc<dyn ScriptRunner>,
        verifier: Arc<dyn TaskVerifier>,
        repair_agent: Arc<dyn RepairAgent>,
        retry: RetryPolicy,
        config: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            runner,
            verifier,
            repair_agent,
            retry,
            config,
        }
    }

    /// Creates the production wiring: Node sandbox, layered validators and
    /// the tool-loop repair agent, all sharing one backend.
    pub fn with_defaults(backend: Arc<dyn TextBackend>, config: PipelineConfig) -> Self {
        let retry = RetryPolicy::default();
        let runner: Arc<dyn ScriptRunner> = Arc::new(NodeRunner::new(config.script_timeout));
        let verifier: Arc<dyn TaskVerifier> = Arc::new(LayeredVerifier::new(
            Arc::clone(&backend),
            Arc::clone(&runner),
            retry.clone(),
            &config,
        ));
        let repair_agent: Arc<dyn RepairAgent> =
            Arc::new(ToolRepairAgent::new(Arc::clone(&backend), retry.clone()));
        Self::new(backend, runner, verifier, repair_agent, retry, config)
    }

    /// Runs the full pipeline for a topic.
    ///
    /// Restores any prior progress from `output_dir` first; re-running on a
    /// partially completed directory skips finished work. Partial success
    /// is a valid terminal state: per-task failures are recorded, not
    /// raised. The returned state carries every artifact and status.
    pub async fn run(
        &self,
        topic: &str,
        output_dir: &Path,
    ) -> Result<GenerationState, PipelineError> {
        self.config.validate()?;

        let mut state = GenerationState::new(topic, output_dir)?;
        state.restore()?;
        tracing::info!(topic, output_dir = %state.output_dir.display(), "Starting run");

        let planning = PlanningPhase::new(
            Arc::clone(&self.backend),
            self.retry.clone(),
            self.config.clone(),
        );
        let registry = planning.execute(&mut state).await?;

        let generation = GenerationPhase::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.runner),
            Arc::clone(&self.verifier),
            Arc::clone(&self.repair_agent),
            self.retry.clone(),
            self.config.clone(),
        );
        generation.execute(&mut state, &registry).await?;

        let verification = VerificationPhase::new(Arc::clone(&self.verifier));
        verification.execute(&mut state, &registry).await?;

        let done = state
            .statuses
            .values()
            .filter(|s| **s == TaskStatus::Done)
            .count();
        tracing::info!(
            done,
            total = state.spec.tasks.len(),
            "Run finished"
        );
        Ok(state)
    }
}
