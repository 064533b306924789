//! Command-line interface for webforge.
//!
//! Provides the generate command that wires the pipeline to a
//! chat-completions backend and an output directory.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
