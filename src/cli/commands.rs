//! CLI command definitions for webforge.
//!
//! One command does the whole job: plan a website for a topic, generate it
//! task by task and verify every increment. Re-running against the same
//! output directory resumes where the previous run stopped.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::llm::{BackendConfig, HttpBackend};
use crate::model::TaskStatus;
use crate::pipeline::{Orchestrator, PipelineConfig};

/// Default model to use for generation.
const DEFAULT_MODEL: &str = "qwen/qwen3-coder-480b";

/// Default output directory for generated sites.
const DEFAULT_OUTPUT_DIR: &str = "./generated-sites";

/// Synthetic website generator with layered verification.
#[derive(Parser)]
#[command(name = "webforge")]
#[command(about = "Generate and verify small synthetic web applications")]
#[command(version)]
#[command(
    long_about = "webforge generates small static web applications task by task via a \
generative text backend, verifying each increment with sandboxed tests, browser \
integration checks and golden-path UI walks.\n\nExample usage:\n  webforge generate \
--topic \"online bookstore\" --output ./generated-sites/bookstore"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate one website for a topic and verify every task.
    #[command(alias = "gen")]
    Generate(GenerateArgs),
}

/// Arguments for `webforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Topic of the generated website (e.g. "online bookstore").
    #[arg(short, long)]
    pub topic: String,

    /// Output directory; a partially completed directory is resumed.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,

    /// Model identifier passed to the chat-completions backend.
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the chat-completions API (can also be set via WEBFORGE_API_BASE).
    #[arg(long, env = "WEBFORGE_API_BASE")]
    pub api_base: String,

    /// API key (can also be set via WEBFORGE_API_KEY).
    #[arg(long, env = "WEBFORGE_API_KEY")]
    pub api_key: Option<String>,

    /// Verification attempts per task before it is marked failed.
    #[arg(long, default_value = "3")]
    pub max_fix_attempts: u32,

    /// Permits for independent work within a single step. 1 keeps logs
    /// deterministic.
    #[arg(long, default_value = "1")]
    pub concurrency: usize,

    /// Skip the golden-path UI validation layer.
    #[arg(long)]
    pub skip_golden_path: bool,

    /// Output the verification summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
    }
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let backend = Arc::new(HttpBackend::new(BackendConfig {
        api_base: args.api_base,
        api_key: args.api_key,
        model: args.model,
    }));

    let config = PipelineConfig {
        max_fix_attempts: args.max_fix_attempts,
        max_concurrency: args.concurrency,
        enable_golden_path: !args.skip_golden_path,
        ..PipelineConfig::default()
    };

    info!("Generating a '{}' website into {}", args.topic, args.output);
    let orchestrator = Orchestrator::with_defaults(backend, config);
    let state = orchestrator.run(&args.topic, Path::new(&args.output)).await?;

    if args.json {
        if let Some(summary) = &state.summary {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        return Ok(());
    }

    println!("\n=== Generation Results ===");
    println!("Topic:  {}", state.topic);
    println!("Output: {}", state.output_dir.display());
    println!("Pages:  {}", state.pages.len());
    for task in &state.spec.tasks {
        let label = match state.statuses.get(&task.id) {
            Some(TaskStatus::Done) => "done",
            Some(TaskStatus::Failed) => "failed",
            None => "skipped",
        };
        println!("  {} [{}] {}", task.id, label, task.name);
    }
    if let Some(summary) = &state.summary {
        let passed = summary.tasks.values().filter(|p| **p).count();
        println!(
            "Verified: {}/{} tasks{}",
            passed,
            summary.tasks.len(),
            if summary.overall { "" } else { " (partial success)" }
        );
    }

    Ok(())
}
