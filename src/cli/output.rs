//! CLI output formatting

use crate::bus::{Message, MessageKind};
use crate::core::{PipelineStatus, SkipReason, StepStatus};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar sized to the pipeline's step count
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a bus message for display
pub fn format_message(message: &Message) -> String {
    let icon = match message.kind {
        MessageKind::Complete => CHECK,
        MessageKind::Error => CROSS,
        MessageKind::Progress => SPINNER,
        MessageKind::Thinking => INFO,
        MessageKind::Insight => ROCKET,
        MessageKind::DataRequest | MessageKind::DataResponse => INFO,
    };

    let mut line = format!("{}{}", icon, message.content);
    if let Some(detail) = &message.metadata.detail {
        line.push_str(&format!(" {}", style(format!("({})", detail)).dim()));
    }
    if let (Some(completed), Some(total)) = (message.metadata.completed, message.metadata.total) {
        line.push_str(&format!(" {}", style(format!("[{}/{}]", completed, total)).dim()));
    }
    line
}

/// Format a replayed journal line with its timestamp
pub fn format_replayed(message: &Message) -> String {
    format!(
        "{} {} {}",
        style(message.timestamp.format("%H:%M:%S%.3f").to_string()).dim(),
        style(&message.source).cyan(),
        format_message(message)
    )
}

/// Format a step's terminal status for the run summary
pub fn format_step_status(status: &StepStatus) -> String {
    match status {
        StepStatus::Pending => style("PENDING").dim().to_string(),
        StepStatus::Ready => style("READY").dim().to_string(),
        StepStatus::Running => style("RUNNING").yellow().to_string(),
        StepStatus::Completed => style("COMPLETED").green().to_string(),
        StepStatus::Failed => style("FAILED").red().to_string(),
        StepStatus::Skipped { reason } => {
            let why = match reason {
                SkipReason::DependencyFailed { dependency } => {
                    format!("dependency {} failed", dependency)
                }
                SkipReason::Cancelled => "cancelled".to_string(),
            };
            format!("{} ({})", style("SKIPPED").dim(), style(why).dim())
        }
    }
}

/// Format the overall pipeline status
pub fn format_pipeline_status(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Success => style("SUCCESS").green().to_string(),
        PipelineStatus::Partial => style("PARTIAL").yellow().to_string(),
        PipelineStatus::Failed => style("FAILED").red().to_string(),
    }
}
