//! Layered validators gating task completion.
//!
//! Ordered cheapest to most expensive: sandboxed script execution, browser
//! page loading, then the golden-path UI walk. The generation loop
//! short-circuits on the first failing layer.

mod backend;
mod golden_path;
mod integration;
mod outcome;

pub use backend::BackendValidator;
pub use golden_path::{
    extract_selectors, is_navigation_to_current, repair_steps, GoldenPath, GoldenPathValidator,
    PathStep,
};
pub use integration::{is_benign, IntegrationValidator};
pub use outcome::{ErrorCategory, ValidationOutcome};
