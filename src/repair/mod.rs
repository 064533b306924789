//! Tiered failure recovery.
//!
//! Localized syntax-level defects get a cheap targeted repair prompt;
//! behavioral defects that span runtime or cross-file semantics escalate to
//! an autonomous agent bracketed by backup/restore.

mod agent;
mod backup;

pub use agent::{RepairAgent, ToolRepairAgent};
pub use backup::Backup;

/// Which repair mechanism a failure routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixTier {
    /// Single-layer repair prompt scoped to the failing layer.
    Targeted,
    /// Autonomous repair agent with file and command access.
    Agent,
}

/// Failure fragments reliably fixed by a targeted prompt.
const TARGETED_PATTERNS: &[&str] = &["SyntaxError", "ReferenceError", "TypeError", "is not defined"];

/// Failure fragments needing the agent: runtime assertions, browser-level
/// timeouts and cross-layer integration mismatches.
const AGENT_PATTERNS: &[&str] = &["AssertionError", "Timeout", "Golden Path", "Integration"];

/// Classifies failure text into its repair tier.
///
/// Unknown failures default to the agent: a failure we cannot pattern-match
/// is unlikely to be a trivial syntax slip.
pub fn classify(error: &str) -> FixTier {
    if TARGETED_PATTERNS.iter().any(|p| error.contains(p)) {
        return FixTier::Targeted;
    }
    if AGENT_PATTERNS.iter().any(|p| error.contains(p)) {
        return FixTier::Agent;
    }
    FixTier::Agent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_level_failures_route_to_targeted_repair() {
        assert_eq!(classify("SyntaxError: Unexpected token"), FixTier::Targeted);
        assert_eq!(classify("ReferenceError: cart is not defined"), FixTier::Targeted);
        assert_eq!(classify("TypeError: x.map is not a function"), FixTier::Targeted);
    }

    #[test]
    fn behavioral_failures_route_to_the_agent() {
        assert_eq!(classify("Golden Path: Element not found: #x"), FixTier::Agent);
        assert_eq!(classify("Backend: Test timeout exceeded, Timeout"), FixTier::Agent);
        assert_eq!(classify("AssertionError: expected 3 items"), FixTier::Agent);
        assert_eq!(classify("Integration: [index.html] Page error"), FixTier::Agent);
    }

    #[test]
    fn unknown_failures_default_to_the_agent() {
        assert_eq!(classify("something entirely novel"), FixTier::Agent);
    }
}
