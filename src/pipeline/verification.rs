//! Final verification phase.
//!
//! After generation, every task is checked once more through the full
//! validator stack and the results are persisted. A restarted run that
//! finds the summary on disk skips this phase entirely.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::ContractRegistry;
use crate::error::PipelineError;
use crate::model::TaskStatus;

use super::config::FileNames;
use super::context::GenerationState;
use super::generation::TaskVerifier;

/// Persisted result of the final verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Per-task pass/fail.
    pub tasks: BTreeMap<String, bool>,
    /// Whether every task passed.
    pub overall: bool,
    /// When the pass finished.
    pub verified_at: DateTime<Utc>,
}

/// Runs the final verification pass and writes `verification.json`.
pub struct VerificationPhase {
    verifier: Arc<dyn TaskVerifier>,
}

impl VerificationPhase {
    /// Creates the phase.
    pub fn new(verifier: Arc<dyn TaskVerifier>) -> Self {
        Self { verifier }
    }

    /// Verifies every task and persists the summary. Tasks already marked
    /// failed are recorded without re-running their validators.
    pub async fn execute(
        &self,
        state: &mut GenerationState,
        registry: &ContractRegistry,
    ) -> Result<(), PipelineError> {
        if state.summary.is_some() {
            tracing::info!("Skipping final verification (summary already on disk)");
            return Ok(());
        }

        let mut tasks = BTreeMap::new();
        for task in state.spec.tasks.clone() {
            if state.statuses.get(&task.id) == Some(&TaskStatus::Failed) {
                tasks.insert(task.id.clone(), false);
                continue;
            }

            let passed = match self.verifier.verify(state, &task, registry).await {
                Ok(outcome) => {
                    if !outcome.success {
                        tracing::warn!(task = %task.id, detail = %outcome.error_text(),
                            "Final verification failed");
                    }
                    outcome.success
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(task = %task.id, error = %err,
                        "Final verification errored");
                    false
                }
            };
            tasks.insert(task.id.clone(), passed);
        }

        let overall = !tasks.is_empty() && tasks.values().all(|passed| *passed);
        let summary = VerificationSummary {
            tasks,
            overall,
            verified_at: Utc::now(),
        };

        let passed = summary.tasks.values().filter(|p| **p).count();
        tracing::info!(
            passed,
            total = summary.tasks.len(),
            overall,
            "Verification summary"
        );

        state.save_file(FileNames::VERIFICATION, &serde_json::to_string_pretty(&summary)?)?;
        state.summary = Some(summary);
        Ok(())
    }
}
