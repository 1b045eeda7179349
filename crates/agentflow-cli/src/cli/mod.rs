//! CLI command definitions and dispatch for the `aflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod steps;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Define and run declarative LLM workflows.
#[derive(Parser)]
#[command(name = "aflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate an example workflow file.
    Generate {
        /// The output file path.
        #[arg(short, long, default_value = "workflow.yml")]
        output: PathBuf,
    },

    /// Validate a workflow file without running it.
    Validate {
        /// Path to the workflow YAML file.
        workflow: PathBuf,
    },

    /// Run a workflow file.
    Run {
        /// Path to the workflow YAML file.
        workflow: PathBuf,

        /// Workflow input as name=value (repeatable).
        #[arg(short, long, value_name = "NAME=VALUE")]
        input: Vec<String>,

        /// Simulate the run without calling any external service.
        #[arg(long)]
        dry_run: bool,
    },

    /// List the available step types.
    Steps,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
