//! Golden-path validation: execute a concrete UI-action sequence.
//!
//! The backend proposes an ordered `{selector, action, value}` sequence for
//! a task, constrained to selectors that actually exist. Steps run in a real
//! browser against the shared server, then the generated evaluator judges
//! whether the task succeeded.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::browser::BrowserSession;
use crate::contracts::ContractRegistry;
use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::model::Task;
use crate::server::StaticServer;
use crate::utils::extract_json;

use super::{ErrorCategory, ValidationOutcome};

/// Attempts at producing a parseable action sequence.
const PATH_GENERATION_ATTEMPTS: u32 = 2;

/// Wait after a click, letting handlers and navigation land.
const CLICK_WAIT: Duration = Duration::from_millis(1000);

/// Wait after typing or selecting.
const INPUT_WAIT: Duration = Duration::from_millis(200);

/// Classes too generic to identify an element.
const EXCLUDED_CLASSES: &[&str] = &["btn", "container", "row", "col", "d-flex", "form-control"];

const PATH_SYSTEM_PROMPT: &str = "You plan UI action sequences for automated \
browser tests. Respond with a single JSON object.";

/// One step of a golden path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub value: Option<String>,
}

fn default_action() -> String {
    "click".to_string()
}

/// An ordered action sequence believed sufficient to accomplish one task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoldenPath {
    #[serde(default)]
    pub steps: Vec<PathStep>,
}

/// Extracts interactive-element selectors from markup.
///
/// Ids are the most reliable handle, then `data-testid`, then meaningful
/// class lists. The result is deduplicated, sorted, and capped with id
/// selectors taking priority.
pub fn extract_selectors(markup: &str, cap: usize) -> Vec<String> {
    let tag_re = Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").expect("valid regex");
    let id_re = Regex::new(r#"\bid\s*=\s*["']([^"']+)["']"#).expect("valid regex");
    let testid_re = Regex::new(r#"\bdata-testid\s*=\s*["']([^"']+)["']"#).expect("valid regex");
    let class_re = Regex::new(r#"\bclass\s*=\s*["']([^"']+)["']"#).expect("valid regex");

    let mut selectors = Vec::new();
    for captures in tag_re.captures_iter(markup) {
        let tag = captures[1].to_lowercase();
        let attrs = &captures[0];

        let interactive = matches!(
            tag.as_str(),
            "a" | "button" | "input" | "select" | "textarea"
        ) || attrs.contains("onclick=")
            || attrs.contains(r#"role="button""#)
            || attrs.contains("role='button'");
        if !interactive {
            continue;
        }
        if attrs.contains(r#"type="hidden""#) || attrs.contains("type='hidden'") {
            continue;
        }
        if attrs.contains("display: none") || attrs.contains("display:none") {
            continue;
        }

        if let Some(id) = id_re.captures(attrs) {
            selectors.push(format!("#{}", &id[1]));
            continue;
        }
        if let Some(testid) = testid_re.captures(attrs) {
            selectors.push(format!("[data-testid='{}']", &testid[1]));
            continue;
        }
        if let Some(classes) = class_re.captures(attrs) {
            let meaningful: Vec<&str> = classes[1]
                .split_whitespace()
                .filter(|c| !EXCLUDED_CLASSES.contains(c))
                .take(2)
                .collect();
            if !meaningful.is_empty() {
                selectors.push(format!(".{}", meaningful.join(".")));
            }
        }
    }

    selectors.sort();
    selectors.dedup();

    if selectors.len() > cap {
        let (ids, others): (Vec<_>, Vec<_>) =
            selectors.into_iter().partition(|s| s.starts_with('#'));
        let mut capped: Vec<String> = ids.into_iter().take(cap).collect();
        let remaining = cap.saturating_sub(capped.len());
        capped.extend(others.into_iter().take(remaining));
        return capped;
    }
    selectors
}

/// Repairs hallucinated step selectors against the trusted set.
///
/// A proposed selector absent from the trusted set is substituted when it
/// contains, or is contained by, a trusted selector — but only for
/// id-to-id matches. Class and role guesses are left untouched; if they
/// miss at execution time that is an accepted failure mode.
pub fn repair_steps(mut steps: Vec<PathStep>, trusted: &[String]) -> Vec<PathStep> {
    for step in &mut steps {
        let Some(selector) = step.selector.clone() else {
            continue;
        };
        if trusted.iter().any(|t| *t == selector) {
            continue;
        }
        if !selector.starts_with('#') {
            continue;
        }

        let proposed = selector.trim_start_matches('#');
        let substitute = trusted.iter().find(|t| {
            if !t.starts_with('#') {
                return false;
            }
            let candidate = t.trim_start_matches('#');
            candidate.contains(proposed) || proposed.contains(candidate)
        });
        if let Some(substitute) = substitute {
            tracing::debug!(from = %selector, to = %substitute, "Repaired golden-path selector");
            step.selector = Some(substitute.clone());
        }
    }
    steps
}

/// Href target of an anchor selector like `a[href='cart.html']`.
fn nav_target(selector: &str) -> Option<String> {
    let href_re = Regex::new(r#"a\[href=['"]([^'"]+)['"]\]"#).expect("valid regex");
    href_re
        .captures(selector)
        .map(|c| c[1].to_string())
}

/// Whether a click step targets navigation to the page we are already on.
///
/// Such a step is treated as a no-op rather than a failure: the sequence's
/// intent is already satisfied.
pub fn is_navigation_to_current(selector: &str, current_url: Option<&str>) -> bool {
    let Some(target) = nav_target(selector) else {
        return false;
    };
    let Some(current) = current_url else {
        return false;
    };
    let path = current
        .split(['?', '#'])
        .next()
        .unwrap_or(current);
    path.ends_with(&target) || path.contains(&target)
}

/// Truncates to a character budget, for prompt embedding.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Validates one task end to end through the rendered UI.
pub struct GoldenPathValidator {
    backend: Arc<dyn TextBackend>,
    retry: RetryPolicy,
    max_selectors: usize,
    html_truncate: usize,
    logic_truncate: usize,
    nav_timeout: Duration,
}

impl GoldenPathValidator {
    /// Creates a validator.
    pub fn new(
        backend: Arc<dyn TextBackend>,
        retry: RetryPolicy,
        max_selectors: usize,
        html_truncate: usize,
        logic_truncate: usize,
        nav_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            retry,
            max_selectors,
            html_truncate,
            logic_truncate,
            nav_timeout,
        }
    }

    /// Generates, repairs and executes an action sequence for the task,
    /// then runs the evaluator.
    #[allow(clippy::too_many_arguments)]
    pub async fn validate(
        &self,
        task: &Task,
        output_dir: &Path,
        start_page: &str,
        markup: &str,
        logic: &str,
        evaluator: &str,
        registry: &ContractRegistry,
    ) -> Result<ValidationOutcome, PipelineError> {
        let path = match self.generate_path(task, markup, logic, registry).await {
            Ok(path) => path,
            Err(PipelineError::SpecDefect(_)) => {
                return Ok(ValidationOutcome::fail(
                    ErrorCategory::GoldenPath,
                    "Failed to generate a usable action sequence",
                ));
            }
            Err(err) => return Err(err),
        };

        self.execute(output_dir, start_page, &path.steps, evaluator, &task.id)
            .await
    }

    /// Asks the backend for an action sequence constrained to trusted
    /// selectors, then repairs minor selector drift.
    pub async fn generate_path(
        &self,
        task: &Task,
        markup: &str,
        logic: &str,
        registry: &ContractRegistry,
    ) -> Result<GoldenPath, PipelineError> {
        let mut trusted = extract_selectors(markup, self.max_selectors);
        for selector in registry.all_selectors() {
            if !trusted.contains(&selector) {
                trusted.push(selector);
            }
        }
        trusted.sort();

        let prompt = format!(
            "Plan the exact UI actions that accomplish this task on the page.\n\n\
             Task: {description}\n\
             Steps the user would take:\n{steps}\n\n\
             You may ONLY use selectors from this list; never invent one:\n{selectors}\n\n\
             Agreed element contracts (action -> selector):\n{contracts}\n\n\
             Page markup (truncated):\n{markup}\n\n\
             Business logic (truncated):\n{logic}\n\n\
             Respond with JSON: {{\"steps\": [{{\"selector\": \"#id\", \
             \"action\": \"click|type|select\", \"value\": \"text or null\"}}]}}",
            description = task.description,
            steps = serde_json::to_string_pretty(&task.steps)?,
            selectors = serde_json::to_string_pretty(&trusted)?,
            contracts = registry.to_json(),
            markup = truncate_chars(markup, self.html_truncate),
            logic = truncate_chars(logic, self.logic_truncate),
        );

        let mut last_problem = String::from("no attempts made");
        for attempt in 0..PATH_GENERATION_ATTEMPTS {
            let raw = self
                .retry
                .run(|| self.backend.complete_json(&prompt, Some(PATH_SYSTEM_PROMPT)))
                .await?;

            match extract_json(&raw)
                .ok_or_else(|| "no JSON object in completion".to_string())
                .and_then(|json| {
                    serde_json::from_str::<GoldenPath>(&json).map_err(|e| e.to_string())
                }) {
                Ok(path) if !path.steps.is_empty() => {
                    return Ok(GoldenPath {
                        steps: repair_steps(path.steps, &trusted),
                    });
                }
                Ok(_) => last_problem = "empty step list".to_string(),
                Err(problem) => last_problem = problem,
            }
            tracing::warn!(attempt = attempt + 1, problem = %last_problem,
                "Golden-path generation produced an unusable payload");
        }

        Err(PipelineError::SpecDefect(format!(
            "golden path for task '{}': {last_problem}",
            task.id
        )))
    }

    /// Executes the steps on a freshly served copy of the site.
    pub async fn execute(
        &self,
        output_dir: &Path,
        start_page: &str,
        steps: &[PathStep],
        evaluator: &str,
        task_id: &str,
    ) -> Result<ValidationOutcome, PipelineError> {
        let server = StaticServer::serve(output_dir).await?;
        let session = match BrowserSession::launch().await {
            Ok(session) => session,
            Err(err) => {
                server.shutdown().await;
                return Err(err.into());
            }
        };

        let outcome = self
            .run_steps(&session, &server, start_page, steps, evaluator, task_id)
            .await;

        session.close().await;
        server.shutdown().await;
        outcome
    }

    async fn run_steps(
        &self,
        session: &BrowserSession,
        server: &StaticServer,
        start_page: &str,
        steps: &[PathStep],
        evaluator: &str,
        task_id: &str,
    ) -> Result<ValidationOutcome, PipelineError> {
        let tab = session.open().await?;

        if let Err(err) = tab
            .navigate(&server.url_for(start_page), self.nav_timeout)
            .await
        {
            tab.close().await;
            return Ok(ValidationOutcome::fail(
                ErrorCategory::GoldenPath,
                format!("Navigation error: {err}"),
            ));
        }
        tab.settle(self.nav_timeout).await;

        for step in steps {
            let Some(selector) = step.selector.as_deref() else {
                continue;
            };

            let mut resolved = tab.locate(selector).await.ok().flatten();
            if resolved.is_none() {
                // One grace retry absorbs render timing.
                tokio::time::sleep(CLICK_WAIT).await;
                resolved = tab.locate(selector).await.ok().flatten();
            }

            let Some(resolved) = resolved else {
                let current = tab.current_url().await;
                if step.action == "click"
                    && is_navigation_to_current(selector, current.as_deref())
                {
                    tracing::debug!(selector, "Skipping navigation to current page");
                    continue;
                }
                tab.close().await;
                return Ok(ValidationOutcome::fail(
                    ErrorCategory::GoldenPath,
                    format!(
                        "Element not found: {selector} (current URL: {})",
                        current.unwrap_or_default()
                    ),
                ));
            };

            let action_result = match step.action.as_str() {
                "click" => {
                    let result = tab.click(&resolved).await;
                    tokio::time::sleep(CLICK_WAIT).await;
                    result
                }
                "type" | "fill" => {
                    let result = tab
                        .fill(&resolved, step.value.as_deref().unwrap_or_default())
                        .await;
                    tokio::time::sleep(INPUT_WAIT).await;
                    result
                }
                "select" => {
                    let result = tab
                        .select(&resolved, step.value.as_deref().unwrap_or_default())
                        .await;
                    tokio::time::sleep(INPUT_WAIT).await;
                    result
                }
                other => {
                    tracing::debug!(action = other, "Ignoring unsupported golden-path action");
                    Ok(())
                }
            };

            if let Err(err) = action_result {
                tab.close().await;
                return Ok(ValidationOutcome::fail(
                    ErrorCategory::GoldenPath,
                    format!("Execution error on {selector}: {err}"),
                ));
            }
        }

        if !evaluator.trim().is_empty() {
            let quoted_task = serde_json::to_string(task_id)?;
            let script = format!(
                "(() => {{\n{evaluator}\nconst e = new Evaluator();\nreturn e.evaluate({quoted_task});\n}})()"
            );
            match tab.evaluate_value(&script).await {
                Ok(verdict) => {
                    let passed = verdict
                        .get("passed")
                        .and_then(|p| p.as_bool())
                        .unwrap_or(false);
                    if !passed {
                        tab.close().await;
                        return Ok(ValidationOutcome::fail(
                            ErrorCategory::GoldenPath,
                            format!("Evaluator failed: {verdict}"),
                        ));
                    }
                }
                Err(err) => {
                    tab.close().await;
                    return Ok(ValidationOutcome::fail(
                        ErrorCategory::GoldenPath,
                        format!("Evaluator error: {err}"),
                    ));
                }
            }
        }

        tab.close().await;
        Ok(ValidationOutcome::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKUP: &str = r#"
        <div class="container">
            <a href="index.html" id="link-home">Home</a>
            <button id="btn-add-item" class="btn">Add</button>
            <input id="input-task-title" type="text">
            <input type="hidden" id="csrf-token">
            <button data-testid="submit-order">Order</button>
            <span class="price-tag sale">$5</span>
            <div class="product-card" onclick="open()">Card</div>
            <select><option>a</option></select>
        </div>"#;

    #[test]
    fn extraction_prefers_ids_and_skips_hidden() {
        let selectors = extract_selectors(MARKUP, 50);
        assert!(selectors.contains(&"#link-home".to_string()));
        assert!(selectors.contains(&"#btn-add-item".to_string()));
        assert!(selectors.contains(&"#input-task-title".to_string()));
        assert!(selectors.contains(&"[data-testid='submit-order']".to_string()));
        assert!(selectors.contains(&".product-card".to_string()));
        assert!(!selectors.iter().any(|s| s.contains("csrf")));
        // A non-interactive span never becomes a candidate.
        assert!(!selectors.iter().any(|s| s.contains("price-tag")));
    }

    #[test]
    fn extraction_cap_prioritizes_ids() {
        let selectors = extract_selectors(MARKUP, 3);
        assert_eq!(selectors.len(), 3);
        assert!(selectors.iter().all(|s| s.starts_with('#')));
    }

    fn step(selector: &str) -> PathStep {
        PathStep {
            selector: Some(selector.to_string()),
            action: "click".to_string(),
            value: None,
        }
    }

    #[test]
    fn repairs_id_selector_by_containment() {
        let trusted = vec!["#task-title".to_string(), "#btn-add-item".to_string()];
        let repaired = repair_steps(vec![step("#title")], &trusted);
        assert_eq!(repaired[0].selector.as_deref(), Some("#task-title"));
    }

    #[test]
    fn never_rewrites_class_selectors() {
        let trusted = vec!["#some-class-thing".to_string()];
        let repaired = repair_steps(vec![step(".some-class")], &trusted);
        assert_eq!(repaired[0].selector.as_deref(), Some(".some-class"));
    }

    #[test]
    fn keeps_exact_matches_and_unmatched_ids() {
        let trusted = vec!["#btn-add-item".to_string()];
        let repaired = repair_steps(
            vec![step("#btn-add-item"), step("#wholly-unrelated")],
            &trusted,
        );
        assert_eq!(repaired[0].selector.as_deref(), Some("#btn-add-item"));
        assert_eq!(repaired[1].selector.as_deref(), Some("#wholly-unrelated"));
    }

    #[test]
    fn navigation_to_current_page_is_detected() {
        let current = Some("http://127.0.0.1:4100/cart.html?ref=nav");
        assert!(is_navigation_to_current("a[href='cart.html']", current));
        assert!(!is_navigation_to_current("a[href='index.html']", current));
        assert!(!is_navigation_to_current("#btn-checkout", current));
        assert!(!is_navigation_to_current("a[href='cart.html']", None));
    }

    #[test]
    fn golden_path_parses_from_backend_json() {
        let json = r##"{"steps": [
            {"selector": "#btn-add-item", "action": "click"},
            {"selector": "#input-task-title", "action": "type", "value": "Milk"},
            {"action": "click"}
        ]}"##;
        let path: GoldenPath = serde_json::from_str(json).expect("parses");
        assert_eq!(path.steps.len(), 3);
        assert_eq!(path.steps[1].value.as_deref(), Some("Milk"));
        assert!(path.steps[2].selector.is_none());
    }
}
