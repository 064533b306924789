//! Planning generators: tasks, architecture, interfaces, styling notes and
//! seed data.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::model::{InterfaceDef, PageSpec, Task, WebsiteSpec};

use super::typed_json_call;

const PLANNING_SYSTEM_PROMPT: &str = "You design small static websites. \
Respond with a single JSON object matching the requested shape exactly.";

#[derive(Debug, Deserialize)]
struct TasksPayload {
    tasks: Vec<Task>,
}

/// Page architecture of the site, possibly refined after interface design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Architecture {
    pub pages: Vec<PageSpec>,
}

#[derive(Debug, Deserialize)]
struct InterfacesPayload {
    interfaces: Vec<InterfaceDef>,
}

/// Styling direction for the generated pages. Persisted for page prompts;
/// nothing downstream depends on its exact contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DesignNotes {
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub typography: String,
    #[serde(default)]
    pub tone: String,
}

/// Named seed-data collections (e.g. `products`, `reviews`) the generated
/// logic initializes itself with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeedData(pub serde_json::Map<String, serde_json::Value>);

impl SeedData {
    /// Compact JSON form, embedded into generation prompts.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Generators for the planning phase.
pub struct PlanGenerator {
    backend: Arc<dyn TextBackend>,
    retry: RetryPolicy,
}

impl PlanGenerator {
    /// Creates the planning generators.
    pub fn new(backend: Arc<dyn TextBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Generates the user tasks for a topic.
    pub async fn generate_tasks(
        &self,
        topic: &str,
        min: usize,
        max: usize,
    ) -> Result<Vec<Task>, PipelineError> {
        let prompt = format!(
            "Invent between {min} and {max} realistic user tasks for a '{topic}' website.\n\
             Each task must be accomplishable through the UI alone.\n\
             Respond with JSON: {{\"tasks\": [{{\"id\": \"t1\", \"name\": \"...\", \
             \"description\": \"...\", \"steps\": [\"...\"]}}]}}"
        );
        let payload: TasksPayload = typed_json_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            PLANNING_SYSTEM_PROMPT,
            "tasks",
        )
        .await?;

        if payload.tasks.is_empty() {
            return Err(PipelineError::SpecDefect("tasks: empty task list".into()));
        }

        // Normalize ids so downstream filenames are always well-formed.
        let mut tasks = payload.tasks;
        for (i, task) in tasks.iter_mut().enumerate() {
            if task.id.trim().is_empty() {
                task.id = format!("t{}", i + 1);
            }
        }
        Ok(tasks)
    }

    /// Designs the page architecture. Called twice: once before interface
    /// design (pages are needed to assign interfaces) and once after, to
    /// reconcile pages with the designed interfaces.
    pub async fn design_architecture(
        &self,
        spec: &WebsiteSpec,
    ) -> Result<Architecture, PipelineError> {
        let interfaces_note = if spec.interfaces.is_empty() {
            String::new()
        } else {
            format!(
                "\nAssign these interfaces to the pages that call them:\n{}",
                serde_json::to_string_pretty(&spec.interfaces)?
            )
        };
        let prompt = format!(
            "Design the static pages for a '{topic}' website supporting these tasks:\n{tasks}\n{interfaces_note}\n\
             Respond with JSON: {{\"pages\": [{{\"name\": \"Home\", \"filename\": \"index.html\", \
             \"description\": \"...\", \"interfaces\": [], \"incoming_params\": [], \
             \"outgoing_params\": []}}]}}",
            topic = spec.topic,
            tasks = serde_json::to_string_pretty(&spec.tasks)?,
        );
        let architecture: Architecture = typed_json_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            PLANNING_SYSTEM_PROMPT,
            "architecture",
        )
        .await?;

        if architecture.pages.is_empty() {
            return Err(PipelineError::SpecDefect("architecture: no pages".into()));
        }
        Ok(architecture)
    }

    /// Designs the business-logic interfaces from tasks and pages.
    pub async fn design_interfaces(
        &self,
        spec: &WebsiteSpec,
    ) -> Result<Vec<InterfaceDef>, PipelineError> {
        let prompt = format!(
            "Design the business-logic operations for a '{topic}' website.\n\
             Tasks:\n{tasks}\nPages:\n{pages}\n\
             Respond with JSON: {{\"interfaces\": [{{\"name\": \"searchProducts\", \
             \"description\": \"...\", \"parameters\": [{{\"name\": \"query\", \"type\": \"string\"}}], \
             \"returns\": \"Product[]\", \"related_tasks\": [\"t1\"]}}]}}",
            topic = spec.topic,
            tasks = serde_json::to_string_pretty(&spec.tasks)?,
            pages = serde_json::to_string_pretty(&spec.pages)?,
        );
        let payload: InterfacesPayload = typed_json_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            PLANNING_SYSTEM_PROMPT,
            "interfaces",
        )
        .await?;

        if payload.interfaces.is_empty() {
            return Err(PipelineError::SpecDefect("interfaces: empty list".into()));
        }
        Ok(payload.interfaces)
    }

    /// Produces styling notes for the topic.
    pub async fn analyze_design(&self, topic: &str) -> Result<DesignNotes, PipelineError> {
        let prompt = format!(
            "Suggest a visual direction for a '{topic}' website.\n\
             Respond with JSON: {{\"palette\": [\"#112233\"], \"typography\": \"...\", \
             \"tone\": \"...\"}}"
        );
        typed_json_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            PLANNING_SYSTEM_PROMPT,
            "design analysis",
        )
        .await
    }

    /// Generates the seed-data collections the logic initializes with.
    pub async fn generate_seed_data(&self, spec: &WebsiteSpec) -> Result<SeedData, PipelineError> {
        let prompt = format!(
            "Generate realistic seed data for a '{topic}' website.\n\
             Interfaces the data must support:\n{interfaces}\n\
             Respond with a JSON object mapping collection names to arrays of records, \
             3 to 8 records each.",
            topic = spec.topic,
            interfaces = serde_json::to_string_pretty(&spec.interfaces)?,
        );
        typed_json_call(
            self.backend.as_ref(),
            &self.retry,
            &prompt,
            PLANNING_SYSTEM_PROMPT,
            "seed data",
        )
        .await
    }
}
