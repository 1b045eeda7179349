//! Agentflow CLI entry point.
//!
//! Binary name: `aflow`
//!
//! Parses CLI arguments, builds the step registry, then dispatches to
//! the appropriate command handler.

mod cli;

use std::sync::Arc;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use agentflow_core::llm::BoxLlmProvider;
use agentflow_core::workflow::StepRegistry;
use agentflow_infra::llm::OpenAiProvider;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,agentflow=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Shell completions don't need a registry
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "aflow", &mut std::io::stdout());
        return Ok(());
    }

    match cli.command {
        Commands::Generate { output } => cli::workflow::handle_generate(&output, cli.json),

        Commands::Validate { workflow } => {
            cli::workflow::handle_validate(&workflow, &registry(), cli.json).await
        }

        Commands::Run {
            workflow,
            input,
            dry_run,
        } => cli::workflow::handle_run(&workflow, &input, dry_run, &registry(), cli.json).await,

        Commands::Steps => cli::steps::handle_steps(&registry(), cli.json),

        Commands::Completions { .. } => unreachable!("handled above"),
    }
}

/// The built-in step registry, backed by the OpenAI-compatible provider
/// configured through the environment.
fn registry() -> StepRegistry {
    let provider = Arc::new(BoxLlmProvider::new(OpenAiProvider::from_env()));
    StepRegistry::builtin(provider)
}
