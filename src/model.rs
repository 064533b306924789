//! Domain model for generated websites.
//!
//! These types are produced by the planning phase and are read-only for the
//! rest of the run. Everything serializes to JSON so a restarted run can
//! rebuild its state from the intermediates on disk.

use serde::{Deserialize, Serialize};

/// A user-visible task the generated site must support, e.g. "buy a book".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, e.g. `t1`.
    pub id: String,
    /// Short name.
    pub name: String,
    /// Full description handed to generators.
    pub description: String,
    /// Ordered user steps that accomplish the task.
    #[serde(default)]
    pub steps: Vec<String>,
}

/// One named parameter of a business-logic operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

/// External contract of one business-logic operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceDef {
    /// Operation name, e.g. `searchProducts`.
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
    /// Shape of the returned value, free-form (e.g. `Product[]`).
    #[serde(default)]
    pub returns: String,
    /// Tasks that exercise this operation.
    #[serde(default)]
    pub related_tasks: Vec<String>,
}

/// One static page of the generated site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    /// Display name, e.g. "Product Detail".
    pub name: String,
    /// File name, e.g. `product.html`.
    pub filename: String,
    #[serde(default)]
    pub description: String,
    /// Names of interfaces this page calls.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Query parameters the page expects on navigation.
    #[serde(default)]
    pub incoming_params: Vec<String>,
    /// Query parameters the page passes when navigating away.
    #[serde(default)]
    pub outgoing_params: Vec<String>,
}

/// Aggregate of everything planning decided about one website.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebsiteSpec {
    /// Seed topic, e.g. "online bookstore".
    pub topic: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDef>,
    #[serde(default)]
    pub pages: Vec<PageSpec>,
}

impl WebsiteSpec {
    /// Creates an empty spec for a topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Whether planning has filled in all three sections.
    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && !self.interfaces.is_empty() && !self.pages.is_empty()
    }

    /// Page filenames, defaulting to `index.html` when planning produced
    /// none (a site always has an entry page).
    pub fn page_files(&self) -> Vec<String> {
        if self.pages.is_empty() {
            vec!["index.html".to_string()]
        } else {
            self.pages.iter().map(|p| p.filename.clone()).collect()
        }
    }
}

/// Per-task terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// All three validators passed in the same attempt.
    Done,
    /// The fix budget was exhausted.
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_completeness() {
        let mut spec = WebsiteSpec::new("bookstore");
        assert!(!spec.is_complete());

        spec.tasks.push(Task {
            id: "t1".into(),
            name: "Buy".into(),
            description: "Buy a book".into(),
            steps: vec![],
        });
        spec.interfaces.push(InterfaceDef {
            name: "addToCart".into(),
            description: "".into(),
            parameters: vec![],
            returns: "void".into(),
            related_tasks: vec![],
        });
        spec.pages.push(PageSpec {
            name: "Home".into(),
            filename: "index.html".into(),
            description: "".into(),
            interfaces: vec![],
            incoming_params: vec![],
            outgoing_params: vec![],
        });
        assert!(spec.is_complete());
        assert_eq!(spec.page_files(), vec!["index.html".to_string()]);
    }

    #[test]
    fn page_files_default_to_index() {
        let spec = WebsiteSpec::new("empty");
        assert_eq!(spec.page_files(), vec!["index.html".to_string()]);
    }

    #[test]
    fn task_deserializes_without_steps() {
        let task: Task =
            serde_json::from_str(r#"{"id":"t1","name":"n","description":"d"}"#).expect("parses");
        assert!(task.steps.is_empty());
    }
}
