//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Run a pipeline plan
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to plan YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Path to schema YAML file for pre-validation
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Maximum concurrent steps (overrides the plan's setting)
    #[arg(short, long)]
    pub parallelism: Option<usize>,

    /// Journal path (defaults to the local data directory)
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Don't journal messages to disk
    #[arg(long)]
    pub no_journal: bool,

    /// Simulate a failure in the named step (repeatable)
    #[arg(long = "fail")]
    pub fail_steps: Vec<String>,
}

/// Validate a pipeline plan
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to plan YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Path to schema YAML file for pre-validation
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Output the parsed plan in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Replay a message journal
#[derive(Debug, Args, Clone)]
pub struct ReplayCommand {
    /// Journal path (defaults to the local data directory)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Show only the last N messages
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output raw JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Default journal location under the platform data directory
pub fn default_journal_path() -> PathBuf {
    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("insightflow").join("events.jsonl")
}
