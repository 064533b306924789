//! Shared utilities.

mod json;

pub use json::{extract_code_block, extract_json};
