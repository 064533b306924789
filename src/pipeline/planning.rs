//! Planning phase: tasks, architecture, interfaces and styling notes.
//!
//! Each sub-step persists a numbered intermediate before the next one
//! starts, so a restarted run resumes at the first missing file. Planning
//! failures are fatal to the run; there is nothing to generate without a
//! plan.

use std::sync::Arc;

use crate::contracts::ContractRegistry;
use crate::error::PipelineError;
use crate::generators::{Architecture, PlanGenerator};
use crate::llm::{RetryPolicy, TextBackend};

use super::config::{IntermediateFiles, PipelineConfig};
use super::context::GenerationState;

/// Produces the website plan and the element-contract registry.
pub struct PlanningPhase {
    generator: PlanGenerator,
    config: PipelineConfig,
}

impl PlanningPhase {
    /// Creates the phase.
    pub fn new(backend: Arc<dyn TextBackend>, retry: RetryPolicy, config: PipelineConfig) -> Self {
        Self {
            generator: PlanGenerator::new(backend, retry),
            config,
        }
    }

    /// Runs every planning sub-step still missing, then derives the
    /// contract registry. The registry derivation is pure and free: it runs
    /// on every call, including fully-resumed ones.
    pub async fn execute(
        &self,
        state: &mut GenerationState,
    ) -> Result<ContractRegistry, PipelineError> {
        if state.spec.is_complete() {
            tracing::info!("Skipping planning phase (already completed)");
            return Ok(Self::build_registry(state));
        }

        if state.spec.tasks.is_empty() {
            tracing::info!("Generating user tasks");
            let tasks = self
                .generator
                .generate_tasks(
                    &state.topic,
                    self.config.task_count_min,
                    self.config.task_count_max,
                )
                .await?;
            state.save_intermediate(IntermediateFiles::TASKS, &tasks)?;
            tracing::info!(count = tasks.len(), "Generated tasks");
            state.spec.tasks = tasks;
        }

        if state.spec.pages.is_empty() {
            // The first-pass architecture exists to give interface design
            // concrete pages; interfaces then reshape it below.
            if let Some(architecture) =
                state.load_intermediate::<Architecture>(IntermediateFiles::INITIAL_ARCH)
            {
                tracing::info!("Loaded initial architecture from intermediates");
                state.spec.pages = architecture.pages;
            } else {
                tracing::info!("Designing initial architecture");
                let architecture = self.generator.design_architecture(&state.spec).await?;
                state.save_intermediate(IntermediateFiles::INITIAL_ARCH, &architecture)?;
                state.spec.pages = architecture.pages;
            }
        }

        if state.spec.interfaces.is_empty() {
            tracing::info!("Designing interfaces");
            let interfaces = self.generator.design_interfaces(&state.spec).await?;
            state.save_intermediate(IntermediateFiles::INTERFACES, &interfaces)?;
            tracing::info!(count = interfaces.len(), "Designed interfaces");
            state.spec.interfaces = interfaces;
        }

        if !state.has_intermediate(IntermediateFiles::FINAL_ARCH) {
            tracing::info!("Finalizing architecture");
            let architecture = self.generator.design_architecture(&state.spec).await?;
            state.save_intermediate(IntermediateFiles::FINAL_ARCH, &architecture)?;
            state.spec.pages = architecture.pages;
            tracing::info!(pages = state.spec.pages.len(), "Architecture finalized");
        }

        if !state.has_intermediate(IntermediateFiles::DESIGN_ANALYSIS) {
            tracing::info!("Running design analysis");
            let notes = self.generator.analyze_design(&state.topic).await?;
            state.save_intermediate(IntermediateFiles::DESIGN_ANALYSIS, &notes)?;
        }

        state.save_spec_snapshot()?;
        Ok(Self::build_registry(state))
    }

    fn build_registry(state: &GenerationState) -> ContractRegistry {
        let registry = ContractRegistry::from_plan(&state.spec.tasks, &state.spec.interfaces);
        tracing::info!(contracts = registry.len(), "Built element-contract registry");
        registry
    }
}
