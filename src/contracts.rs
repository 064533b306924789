//! Element identifier contracts shared by generators and validators.
//!
//! Generated markup and the golden-path validator must agree on selectors
//! before either exists. The registry derives stable element ids from
//! (element type, action) with a fixed naming convention, so both sides of
//! the pipeline can be prompted with the same identifiers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{InterfaceDef, Task};

/// Page key for contracts that apply to every page.
pub const GLOBAL_PAGE: &str = "global";

/// A stable selector agreed for one (action, page) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ElementContract {
    pub element_type: String,
    pub action: String,
    pub page: String,
    /// Full CSS selector, e.g. `#btn-add-item`.
    pub selector: String,
    pub description: String,
}

/// Central registry of element contracts.
///
/// Registration is idempotent per (action, page); downstream consumers only
/// read. Uses ordered maps so prompt injection and logs are deterministic.
#[derive(Debug, Default, Clone)]
pub struct ContractRegistry {
    by_key: BTreeMap<String, ElementContract>,
    by_page: BTreeMap<String, Vec<String>>,
}

/// Id prefix for each supported element type; unknown types get no prefix.
fn type_prefix(element_type: &str) -> Option<&'static str> {
    match element_type {
        "button" => Some("btn"),
        "input" => Some("input"),
        "filter" => Some("filter"),
        "form" => Some("form"),
        "link" => Some("link"),
        "select" => Some("select"),
        "card" => Some("card"),
        "container" => Some("container"),
        _ => None,
    }
}

/// Lowercases and maps every run of non-alphanumeric characters to a single
/// dash, producing a safe id fragment.
fn sanitize(action: &str) -> String {
    let mut out = String::with_capacity(action.len());
    let mut pending_dash = false;
    for c in action.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

impl ContractRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contract and returns its selector.
    ///
    /// The selector is a pure function of `element_type` and `action`;
    /// re-registering the same (action, page) returns the existing selector
    /// unchanged.
    pub fn register(
        &mut self,
        element_type: &str,
        action: &str,
        page: &str,
        description: &str,
    ) -> String {
        let key = format!("{page}:{action}");
        if let Some(existing) = self.by_key.get(&key) {
            return existing.selector.clone();
        }

        let safe = sanitize(action);
        let id = match type_prefix(element_type) {
            Some(prefix) => format!("{prefix}-{safe}"),
            None => safe,
        };
        let selector = format!("#{id}");

        self.by_key.insert(
            key,
            ElementContract {
                element_type: element_type.to_string(),
                action: action.to_string(),
                page: page.to_string(),
                selector: selector.clone(),
                description: description.to_string(),
            },
        );

        let page_selectors = self.by_page.entry(page.to_string()).or_default();
        if !page_selectors.contains(&selector) {
            page_selectors.push(selector.clone());
        }

        selector
    }

    /// Looks up the selector registered for an action on a page.
    pub fn get(&self, action: &str, page: &str) -> Option<&str> {
        self.by_key
            .get(&format!("{page}:{action}"))
            .map(|c| c.selector.as_str())
    }

    /// All selectors that apply to a page: page-specific plus global.
    pub fn selectors_for_page(&self, page: &str) -> Vec<String> {
        let mut out = self.by_page.get(page).cloned().unwrap_or_default();
        if page != GLOBAL_PAGE {
            if let Some(global) = self.by_page.get(GLOBAL_PAGE) {
                for s in global {
                    if !out.contains(s) {
                        out.push(s.clone());
                    }
                }
            }
        }
        out
    }

    /// Checks that every selector expected on a page appears as an id
    /// attribute in its markup; returns the missing selectors.
    pub fn validate_markup(&self, markup: &str, page: &str) -> Vec<String> {
        self.selectors_for_page(page)
            .into_iter()
            .filter(|selector| {
                let id = selector.trim_start_matches('#');
                !markup.contains(&format!("id=\"{id}\""))
                    && !markup.contains(&format!("id='{id}'"))
            })
            .collect()
    }

    /// Action → selector map, for prompt injection.
    pub fn selector_map(&self) -> BTreeMap<String, String> {
        self.by_key
            .values()
            .map(|c| (c.action.clone(), c.selector.clone()))
            .collect()
    }

    /// JSON form of [`Self::selector_map`], embedded into prompts.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.selector_map()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Every registered selector, across all pages.
    pub fn all_selectors(&self) -> Vec<String> {
        self.by_key.values().map(|c| c.selector.clone()).collect()
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Derives a registry from planning output with keyword heuristics.
    ///
    /// This is a pure function of the tasks and interfaces: interface names
    /// map to the controls that invoke them, task steps map to the generic
    /// controls their wording implies.
    pub fn from_plan(tasks: &[Task], interfaces: &[InterfaceDef]) -> Self {
        let mut registry = Self::new();

        for interface in interfaces {
            let name = interface.name.to_lowercase();
            let action_base = sanitize(&interface.name);
            if name.contains("create") || name.contains("add") {
                registry.register(
                    "button",
                    &format!("submit-{action_base}"),
                    GLOBAL_PAGE,
                    &interface.description,
                );
            } else if name.contains("search") {
                registry.register("input", "search-query", GLOBAL_PAGE, "search text");
                registry.register("button", "search-submit", GLOBAL_PAGE, "run the search");
            } else if name.contains("list") || name.contains("get") {
                registry.register("select", "sort-by", GLOBAL_PAGE, "sort order");
                registry.register("button", "filter-open", GLOBAL_PAGE, "open filters");
            }
        }

        for task in tasks {
            for step in &task.steps {
                let step = step.to_lowercase();
                if step.contains("filter") {
                    registry.register("button", "filter-apply", GLOBAL_PAGE, "apply filters");
                }
                if step.contains("sort") {
                    registry.register("select", "sort-by", GLOBAL_PAGE, "sort order");
                }
                if step.contains("add") || step.contains("create") {
                    registry.register("button", "add-item", GLOBAL_PAGE, "add the item");
                }
                if step.contains("title") || step.contains("task") {
                    registry.register("input", "task-title", GLOBAL_PAGE, "title text");
                }
                if step.contains("due") {
                    registry.register("input", "due-date", GLOBAL_PAGE, "due date");
                }
            }
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, steps: &[&str]) -> Task {
        Task {
            id: id.into(),
            name: id.into(),
            description: format!("task {id}"),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn interface(name: &str) -> InterfaceDef {
        InterfaceDef {
            name: name.into(),
            description: String::new(),
            parameters: vec![],
            returns: String::new(),
            related_tasks: vec![],
        }
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = ContractRegistry::new();
        let first = registry.register("button", "add to cart", "index.html", "");
        let second = registry.register("button", "add to cart", "index.html", "");
        assert_eq!(first, second);
        assert_eq!(first, "#btn-add-to-cart");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sanitizes_actions_to_safe_ids() {
        let mut registry = ContractRegistry::new();
        assert_eq!(
            registry.register("input", "Search 'Query'!", GLOBAL_PAGE, ""),
            "#input-search-query"
        );
        assert_eq!(
            registry.register("card", "product_detail", GLOBAL_PAGE, ""),
            "#card-product-detail"
        );
        assert_eq!(registry.register("widget", "checkout", GLOBAL_PAGE, ""), "#checkout");
    }

    #[test]
    fn page_selectors_include_globals() {
        let mut registry = ContractRegistry::new();
        registry.register("button", "checkout", "cart.html", "");
        registry.register("link", "home", GLOBAL_PAGE, "");

        let selectors = registry.selectors_for_page("cart.html");
        assert!(selectors.contains(&"#btn-checkout".to_string()));
        assert!(selectors.contains(&"#link-home".to_string()));
        assert_eq!(registry.selectors_for_page("other.html"), vec!["#link-home"]);
    }

    #[test]
    fn validate_markup_reports_missing_ids() {
        let mut registry = ContractRegistry::new();
        registry.register("button", "add-item", "index.html", "");
        registry.register("input", "task-title", "index.html", "");

        let markup = r#"<button id="btn-add-item">Add</button>"#;
        let missing = registry.validate_markup(markup, "index.html");
        assert_eq!(missing, vec!["#input-task-title"]);

        let complete = r#"<button id="btn-add-item"></button><input id='input-task-title'>"#;
        assert!(registry.validate_markup(complete, "index.html").is_empty());
    }

    #[test]
    fn derives_contracts_from_plan_keywords() {
        let tasks = vec![task("t1", &["add a task with a title", "sort the list"])];
        let interfaces = vec![interface("searchProducts"), interface("createOrder")];

        let registry = ContractRegistry::from_plan(&tasks, &interfaces);

        assert_eq!(registry.get("search-query", GLOBAL_PAGE), Some("#input-search-query"));
        assert_eq!(registry.get("search-submit", GLOBAL_PAGE), Some("#btn-search-submit"));
        assert_eq!(registry.get("add-item", GLOBAL_PAGE), Some("#btn-add-item"));
        assert_eq!(registry.get("task-title", GLOBAL_PAGE), Some("#input-task-title"));
        assert_eq!(registry.get("sort-by", GLOBAL_PAGE), Some("#select-sort-by"));
        assert!(registry.get("due-date", GLOBAL_PAGE).is_none());
    }

    #[test]
    fn derivation_is_deterministic() {
        let tasks = vec![task("t1", &["filter by price", "sort by rating"])];
        let interfaces = vec![interface("listItems")];
        let a = ContractRegistry::from_plan(&tasks, &interfaces);
        let b = ContractRegistry::from_plan(&tasks, &interfaces);
        assert_eq!(a.to_json(), b.to_json());
    }
}
