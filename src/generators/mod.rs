//! Backend-calling generators.
//!
//! Every generator follows the same discipline: prompt, retry transient
//! failures, extract the payload, parse it into a typed value, and treat
//! anything malformed as a defect to re-prompt — a loosely-typed blob never
//! leaves this module.

mod frontend;
mod logic;
mod planning;

pub use frontend::FrontendGenerator;
pub use logic::{base_logic, passes_sanity, LogicGenerator, LOGIC_NAMESPACE};
pub use planning::{Architecture, DesignNotes, PlanGenerator, SeedData};

use serde::de::DeserializeOwned;

use crate::error::PipelineError;
use crate::llm::{RetryPolicy, TextBackend};
use crate::utils::{extract_code_block, extract_json};

/// Attempts at getting a parseable payload before the phase gives up.
pub(crate) const PAYLOAD_ATTEMPTS: u32 = 3;

/// Requests a JSON payload and parses it into `T`, re-prompting on
/// malformed output up to [`PAYLOAD_ATTEMPTS`] times.
pub(crate) async fn typed_json_call<T: DeserializeOwned>(
    backend: &dyn TextBackend,
    retry: &RetryPolicy,
    prompt: &str,
    system: &str,
    what: &str,
) -> Result<T, PipelineError> {
    let mut last_problem = String::from("no attempts made");
    for attempt in 0..PAYLOAD_ATTEMPTS {
        let raw = retry
            .run(|| backend.complete_json(prompt, Some(system)))
            .await?;

        match extract_json(&raw)
            .ok_or_else(|| "no JSON object in completion".to_string())
            .and_then(|json| serde_json::from_str::<T>(&json).map_err(|e| e.to_string()))
        {
            Ok(value) => return Ok(value),
            Err(problem) => {
                last_problem = problem;
                tracing::warn!(
                    what,
                    attempt = attempt + 1,
                    problem = %last_problem,
                    "Discarding malformed backend payload"
                );
            }
        }
    }
    Err(PipelineError::SpecDefect(format!("{what}: {last_problem}")))
}

/// Requests source text, unwrapping a code fence when present.
pub(crate) async fn code_call(
    backend: &dyn TextBackend,
    retry: &RetryPolicy,
    prompt: &str,
    system: &str,
    lang: &str,
    what: &str,
) -> Result<String, PipelineError> {
    let raw = retry.run(|| backend.complete(prompt, Some(system))).await?;
    let code = extract_code_block(&raw, lang);
    if code.trim().is_empty() {
        return Err(PipelineError::SpecDefect(format!("{what}: empty completion")));
    }
    Ok(code)
}

/// Truncates to a character budget, for prompt embedding.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
