//! Frontend generators: page markup, the event-binding controller and the
//! in-page evaluator.
//!
//! Markup never contains inline business logic; the controller is the thin
//! glue binding DOM events to the logic object. Keeping the layers separate
//! keeps them independently fixable.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contracts::ContractRegistry;
use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::model::{Task, WebsiteSpec};

use super::logic::LOGIC_NAMESPACE;
use super::{code_call, truncate_chars, typed_json_call};

const FRONTEND_SYSTEM_PROMPT: &str = "You write static HTML pages and the \
thin JavaScript controllers that wire them to a business-logic object. \
Never inline business logic into markup.";

/// Characters of existing pages embedded into prompts.
const PAGE_CONTEXT_CHARS: usize = 8000;

/// Characters of the logic script embedded into prompts.
const LOGIC_CONTEXT_CHARS: usize = 4000;

fn contract_clause(registry: &ContractRegistry) -> String {
    if registry.is_empty() {
        return String::new();
    }
    format!(
        "\nElement id contracts — use these exact ids for interactive elements, one id \
         per element:\n{}\n",
        registry.to_json()
    )
}

fn pages_context(pages: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (name, markup) in pages {
        out.push_str(&format!(
            "--- {name} ---\n{}\n",
            truncate_chars(markup, PAGE_CONTEXT_CHARS / pages.len().max(1))
        ));
    }
    out
}

/// Generators for markup, controller and evaluator.
pub struct FrontendGenerator {
    backend: Arc<dyn TextBackend>,
    retry: RetryPolicy,
}

impl FrontendGenerator {
    /// Creates the frontend generators.
    pub fn new(backend: Arc<dyn TextBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    async fn request_pages(&self, prompt: String) -> Result<BTreeMap<String, String>, PipelineError> {
        let pages: BTreeMap<String, String> = typed_json_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            FRONTEND_SYSTEM_PROMPT,
            "page markup",
        )
        .await?;

        let pages: BTreeMap<String, String> = pages
            .into_iter()
            .filter(|(name, markup)| name.ends_with(".html") && !markup.trim().is_empty())
            .collect();
        if pages.is_empty() {
            return Err(PipelineError::SpecDefect("page markup: no html pages".into()));
        }
        Ok(pages)
    }

    /// Generates or extends the static markup a task needs.
    pub async fn generate_pages(
        &self,
        task: &Task,
        spec: &WebsiteSpec,
        registry: &ContractRegistry,
        current_pages: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, PipelineError> {
        let prompt = format!(
            "Produce the static pages a '{topic}' website needs for this task, extending \
             the existing pages rather than discarding their content.\n\
             Task: {description}\nSteps:\n{steps}\n\
             Planned pages:\n{planned}\n{contracts}\n\
             Existing pages:\n{existing}\n\
             Every page loads `logic.js` then `app.js` via script tags, and contains NO \
             inline business logic.\n\
             Respond with a JSON object mapping filenames to complete HTML documents.",
            topic = spec.topic,
            description = task.description,
            steps = serde_json::to_string_pretty(&task.steps)?,
            planned = serde_json::to_string_pretty(&spec.pages)?,
            contracts = contract_clause(registry),
            existing = pages_context(current_pages),
        );
        self.request_pages(prompt).await
    }

    /// Regenerates pages to clear a specific failure.
    pub async fn fix_pages(
        &self,
        task: &Task,
        spec: &WebsiteSpec,
        error: &str,
        current_pages: &BTreeMap<String, String>,
        registry: &ContractRegistry,
    ) -> Result<BTreeMap<String, String>, PipelineError> {
        let prompt = format!(
            "The pages of a '{topic}' website fail validation.\n\
             Task: {description}\n\nFailure:\n{error}\n{contracts}\n\
             Current pages:\n{existing}\n\
             Respond with a JSON object mapping filenames to corrected complete HTML \
             documents; include only pages you changed.",
            topic = spec.topic,
            description = task.description,
            error = truncate_chars(error, 2000),
            contracts = contract_clause(registry),
            existing = pages_context(current_pages),
        );
        self.request_pages(prompt).await
    }

    /// Generates the controller binding markup events to the logic object.
    pub async fn generate_controller(
        &self,
        task: &Task,
        pages: &BTreeMap<String, String>,
        logic: &str,
        spec: &WebsiteSpec,
        registry: &ContractRegistry,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "Write `app.js`, the controller for a '{topic}' website. It binds DOM events \
             to `window.{namespace}` and renders results back into the pages. It contains \
             no business logic of its own.\n\
             Task being wired: {description}\n{contracts}\n\
             Pages:\n{pages}\nLogic script:\n{logic}",
            topic = spec.topic,
            namespace = LOGIC_NAMESPACE,
            description = task.description,
            contracts = contract_clause(registry),
            pages = pages_context(pages),
            logic = truncate_chars(logic, LOGIC_CONTEXT_CHARS),
        );
        code_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            FRONTEND_SYSTEM_PROMPT,
            "js",
            "controller",
        )
        .await
    }

    /// Regenerates the controller to clear a specific failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn fix_controller(
        &self,
        task: &Task,
        pages: &BTreeMap<String, String>,
        controller: &str,
        logic: &str,
        spec: &WebsiteSpec,
        error: &str,
        registry: &ContractRegistry,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "The controller of a '{topic}' website fails validation.\n\
             Task: {description}\n\nFailure:\n{error}\n{contracts}\n\
             Current controller:\n{controller}\n\
             Pages:\n{pages}\nLogic script:\n{logic}\n\
             Output the corrected COMPLETE `app.js`.",
            topic = spec.topic,
            description = task.description,
            error = truncate_chars(error, 2000),
            contracts = contract_clause(registry),
            controller = truncate_chars(controller, 6000),
            pages = pages_context(pages),
            logic = truncate_chars(logic, LOGIC_CONTEXT_CHARS),
        );
        code_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            FRONTEND_SYSTEM_PROMPT,
            "js",
            "controller fix",
        )
        .await
    }

    /// Generates the evaluator the golden-path validator injects to judge
    /// task completion.
    pub async fn generate_evaluator(
        &self,
        spec: &WebsiteSpec,
        logic: &str,
    ) -> Result<String, PipelineError> {
        let prompt = format!(
            "Write `evaluator.js` for a '{topic}' website. Define `class Evaluator` with \
             an `evaluate(taskId)` method returning {{passed: boolean, reason: string}}, \
             judging each task by inspecting `window.{namespace}` state and localStorage.\n\
             Tasks:\n{tasks}\nLogic script:\n{logic}",
            topic = spec.topic,
            namespace = LOGIC_NAMESPACE,
            tasks = serde_json::to_string_pretty(&spec.tasks)?,
            logic = truncate_chars(logic, LOGIC_CONTEXT_CHARS),
        );
        code_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            FRONTEND_SYSTEM_PROMPT,
            "js",
            "evaluator",
        )
        .await
    }
}
