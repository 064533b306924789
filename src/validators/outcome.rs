//! Validation outcomes.
//!
//! Expected failures are values, not errors: every validator returns a
//! `ValidationOutcome` and reserves `Err` for environment faults.

use serde::{Deserialize, Serialize};

/// Which validation layer produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The business-logic tests failed in the sandbox.
    Backend,
    /// A page raised runtime errors in the browser.
    Integration,
    /// The golden-path action sequence or evaluator failed.
    GoldenPath,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Backend => write!(f, "Backend"),
            ErrorCategory::Integration => write!(f, "Integration"),
            ErrorCategory::GoldenPath => write!(f, "Golden Path"),
        }
    }
}

/// Result of one validator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub success: bool,
    pub category: Option<ErrorCategory>,
    pub detail: Option<String>,
}

impl ValidationOutcome {
    /// A passing outcome.
    pub fn pass() -> Self {
        Self {
            success: true,
            category: None,
            detail: None,
        }
    }

    /// A failing outcome with its layer and detail.
    pub fn fail(category: ErrorCategory, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            category: Some(category),
            detail: Some(detail.into()),
        }
    }

    /// Layer-prefixed error text, the form the fix classifier consumes.
    pub fn error_text(&self) -> String {
        match (&self.category, &self.detail) {
            (Some(category), Some(detail)) => format!("{category}: {detail}"),
            (Some(category), None) => category.to_string(),
            (None, Some(detail)) => detail.clone(),
            (None, None) => String::new(),
        }
    }
}
