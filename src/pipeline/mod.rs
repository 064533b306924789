//! The generation pipeline: planning, per-task generation and final
//! verification, coordinated over one resumable state.

pub mod config;
pub mod context;
pub mod generation;
pub mod orchestrator;
pub mod planning;
pub mod verification;

pub use config::{FileNames, IntermediateFiles, Limits, PipelineConfig};
pub use context::GenerationState;
pub use generation::{start_page_for, GenerationPhase, LayeredVerifier, TaskState, TaskVerifier};
pub use orchestrator::Orchestrator;
pub use planning::PlanningPhase;
pub use verification::{VerificationPhase, VerificationSummary};
