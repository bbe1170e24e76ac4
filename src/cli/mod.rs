//! Command-line interface

pub mod commands;
pub mod output;
pub mod sim;

use clap::{Parser, Subcommand};
use commands::{ReplayCommand, RunCommand, ValidateCommand};

/// Analysis pipeline orchestration core
#[derive(Debug, Parser, Clone)]
#[command(name = "insightflow")]
#[command(author = "insightflow Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Validate and run analysis pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline plan
    Run(RunCommand),

    /// Validate a pipeline plan
    Validate(ValidateCommand),

    /// Replay a message journal
    Replay(ReplayCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }
}
