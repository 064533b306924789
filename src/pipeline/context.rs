//! Run state and artifact persistence.
//!
//! `GenerationState` is the single mutable context of a run, owned by the
//! orchestrator and passed by reference through the phases. Every artifact
//! is written as it becomes available, and the whole state is
//! reconstructable from the output directory: resuming is indistinguishable
//! from never having been interrupted.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::generators::SeedData;
use crate::model::{InterfaceDef, Task, TaskStatus, WebsiteSpec};

use super::config::{FileNames, IntermediateFiles};
use super::verification::VerificationSummary;

/// All mutable state of one generation run.
#[derive(Debug)]
pub struct GenerationState {
    pub topic: String,
    pub output_dir: PathBuf,
    intermediates_dir: PathBuf,
    /// Planning output; read-only once planning completes.
    pub spec: WebsiteSpec,
    /// Current business-logic script text, the single piece of cross-step
    /// mutable state.
    pub logic: String,
    /// Current evaluator script text.
    pub evaluator: String,
    /// Seed data the logic initializes with.
    pub seed_data: Option<SeedData>,
    /// Generated markup, filename → document.
    pub pages: BTreeMap<String, String>,
    /// Per-task implementation plans.
    pub task_plans: BTreeMap<String, String>,
    /// Per-task terminal statuses.
    pub statuses: BTreeMap<String, TaskStatus>,
    /// Final verification summary, once produced.
    pub summary: Option<VerificationSummary>,
}

impl GenerationState {
    /// Creates the state for a run, creating the output directory tree.
    pub fn new(topic: &str, output_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(output_dir)?;
        // Absolute paths keep subprocesses and the file server agreeing on
        // the directory regardless of their own working directories.
        let output_dir = output_dir.canonicalize()?;
        let intermediates_dir = output_dir.join(IntermediateFiles::DIR);
        fs::create_dir_all(&intermediates_dir)?;

        Ok(Self {
            topic: topic.to_string(),
            output_dir,
            intermediates_dir,
            spec: WebsiteSpec::new(topic),
            logic: String::new(),
            evaluator: String::new(),
            seed_data: None,
            pages: BTreeMap::new(),
            task_plans: BTreeMap::new(),
            statuses: BTreeMap::new(),
            summary: None,
        })
    }

    /// Writes an artifact into the output directory.
    pub fn save_file(&self, filename: &str, content: &str) -> io::Result<()> {
        fs::write(self.output_dir.join(filename), content)
    }

    /// Reads an artifact, `None` when absent.
    pub fn load_file(&self, filename: &str) -> Option<String> {
        fs::read_to_string(self.output_dir.join(filename)).ok()
    }

    /// Whether an artifact exists.
    pub fn has_file(&self, filename: &str) -> bool {
        self.output_dir.join(filename).is_file()
    }

    /// Persists a planning intermediate as JSON.
    pub fn save_intermediate<T: Serialize>(&self, filename: &str, value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.intermediates_dir.join(filename), json)
    }

    /// Loads a planning intermediate. `None` when absent or unreadable; an
    /// unreadable intermediate just means the step reruns.
    pub fn load_intermediate<T: DeserializeOwned>(&self, filename: &str) -> Option<T> {
        let content = fs::read_to_string(self.intermediates_dir.join(filename)).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(filename, error = %err, "Ignoring unreadable intermediate");
                None
            }
        }
    }

    /// Whether a planning intermediate exists.
    pub fn has_intermediate(&self, filename: &str) -> bool {
        self.intermediates_dir.join(filename).is_file()
    }

    /// Rebuilds in-memory state from whatever the output directory already
    /// contains.
    pub fn restore(&mut self) -> io::Result<()> {
        if let Some(tasks) = self.load_intermediate::<Vec<Task>>(IntermediateFiles::TASKS) {
            self.spec.tasks = tasks;
        }
        if let Some(interfaces) =
            self.load_intermediate::<Vec<InterfaceDef>>(IntermediateFiles::INTERFACES)
        {
            self.spec.interfaces = interfaces;
        }
        if let Some(architecture) = self
            .load_intermediate::<crate::generators::Architecture>(IntermediateFiles::FINAL_ARCH)
        {
            self.spec.pages = architecture.pages;
        }
        if let Some(data) = self.load_intermediate::<SeedData>(IntermediateFiles::GENERATED_DATA) {
            self.seed_data = Some(data);
        }

        if let Some(logic) = self.load_file(FileNames::LOGIC) {
            self.logic = logic;
        }
        if let Some(evaluator) = self.load_file(FileNames::EVALUATOR) {
            self.evaluator = evaluator;
        }

        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".html") && entry.file_type()?.is_file() {
                if let Some(content) = self.load_file(&name) {
                    self.pages.insert(name, content);
                }
            }
        }

        for task in &self.spec.tasks {
            let plan_file = FileNames::task_plan(&task.id);
            if let Some(plan) = self.load_file(&plan_file) {
                self.task_plans.insert(task.id.clone(), plan);
            }
        }

        if let Some(summary) = self
            .load_file(FileNames::VERIFICATION)
            .and_then(|content| serde_json::from_str::<VerificationSummary>(&content).ok())
        {
            for (task_id, passed) in &summary.tasks {
                let status = if *passed {
                    TaskStatus::Done
                } else {
                    TaskStatus::Failed
                };
                self.statuses.insert(task_id.clone(), status);
            }
            self.summary = Some(summary);
        }

        tracing::info!(
            tasks = self.spec.tasks.len(),
            pages = self.pages.len(),
            has_logic = !self.logic.is_empty(),
            "Restored state from output directory"
        );
        Ok(())
    }

    /// Persists the planning snapshot (`specs.json`).
    pub fn save_spec_snapshot(&self) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.spec)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.save_file(FileNames::SPECS, &json)
    }

    /// Page filenames known to the run: generated pages first, falling back
    /// to the planned architecture.
    pub fn page_files(&self) -> Vec<String> {
        if self.pages.is_empty() {
            self.spec.page_files()
        } else {
            self.pages.keys().cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageSpec;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.into(),
            name: id.into(),
            description: format!("task {id}"),
            steps: vec!["open home page".into()],
        }
    }

    #[test]
    fn restore_rebuilds_state_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");

        {
            let state = GenerationState::new("bookstore", dir.path()).expect("state");
            state
                .save_intermediate(IntermediateFiles::TASKS, &vec![sample_task("t1")])
                .expect("save");
            state
                .save_intermediate(
                    IntermediateFiles::FINAL_ARCH,
                    &crate::generators::Architecture {
                        pages: vec![PageSpec {
                            name: "Home".into(),
                            filename: "index.html".into(),
                            description: String::new(),
                            interfaces: vec![],
                            incoming_params: vec![],
                            outgoing_params: vec![],
                        }],
                    },
                )
                .expect("save");
            state.save_file(FileNames::LOGIC, "class L {} window.AppLogic = 1;").expect("save");
            state.save_file("index.html", "<html></html>").expect("save");
            state.save_file(&FileNames::task_plan("t1"), "# plan").expect("save");
        }

        let mut restored = GenerationState::new("bookstore", dir.path()).expect("state");
        restored.restore().expect("restore");

        assert_eq!(restored.spec.tasks.len(), 1);
        assert_eq!(restored.spec.pages.len(), 1);
        assert!(restored.logic.contains("class L"));
        assert_eq!(restored.pages.get("index.html").map(String::as_str), Some("<html></html>"));
        assert_eq!(restored.task_plans.get("t1").map(String::as_str), Some("# plan"));
        assert!(restored.summary.is_none());
    }

    #[test]
    fn restore_of_empty_directory_is_a_clean_slate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut state = GenerationState::new("bookstore", dir.path()).expect("state");
        state.restore().expect("restore");

        assert!(state.spec.tasks.is_empty());
        assert!(state.logic.is_empty());
        assert!(state.pages.is_empty());
    }

    #[test]
    fn unreadable_intermediate_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut state = GenerationState::new("bookstore", dir.path()).expect("state");
        std::fs::write(
            dir.path().join(IntermediateFiles::DIR).join(IntermediateFiles::TASKS),
            "{ not json",
        )
        .expect("write");

        state.restore().expect("restore");
        assert!(state.spec.tasks.is_empty());
    }
}
