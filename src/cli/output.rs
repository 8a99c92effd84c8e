//! CLI output formatting

use crate::{
    core::{Outcome, RunConfiguration, TaskSlot, TestMode},
    execution::PipelineEvent,
};
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
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "- ");

/// Create a progress bar over the setup slots
///
/// Every slot reports exactly once, skipped ones included, so the bar
/// always spans all of them.
pub fn create_progress_bar() -> ProgressBar {
    let progress = ProgressBar::new(TaskSlot::ALL.len() as u64);
    if let Ok(template) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(template.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Print a pipeline event above the progress bar and advance it
///
/// Lines go to stdout even when the bar is hidden, as it is without a terminal.
pub fn render_event(progress: &ProgressBar, event: &PipelineEvent) {
    let line = format_pipeline_event(event);
    progress.suspend(|| println!("{}", line));

    match event {
        PipelineEvent::TaskFinished { slot, .. } => {
            progress.inc(1);
            progress.set_message(slot.name());
        }
        PipelineEvent::SetupFinished { .. } => progress.finish_and_clear(),
        _ => {}
    }
}

/// Format a setup outcome for display
pub fn format_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        Outcome::Skipped { reason } => style(format!("SKIPPED ({})", reason)).dim().to_string(),
        Outcome::Failed(failure) => style(format!("FAILED ({})", failure.cause)).red().to_string(),
    }
}

/// One-line summary of a run configuration
pub fn format_configuration(config: &RunConfiguration) -> String {
    let strategy = config
        .deployment_strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "existing cluster".to_string());
    let mode = match &config.test_mode {
        TestMode::Direct { storage_class_file } => format!("storage tests ({})", storage_class_file),
        TestMode::Migration => "migration tests".to_string(),
    };
    format!(
        "{} in {} - {} - focus {}",
        style(strategy).bold(),
        style(&config.zone).cyan(),
        mode,
        style(&config.test_focus).dim()
    )
}

/// Format a pipeline event for display
pub fn format_pipeline_event(event: &PipelineEvent) -> String {
    match event {
        PipelineEvent::RunStarted {
            run_id,
            active_slots,
        } => {
            let slots: Vec<&str> = active_slots.iter().map(|s| s.name()).collect();
            let slots = if slots.is_empty() {
                "nothing to set up".to_string()
            } else {
                slots.join(", ")
            };
            format!(
                "{} Starting run {} ({})",
                ROCKET,
                style(&run_id.to_string()[..8]).dim(),
                slots
            )
        }
        PipelineEvent::TaskStarted { slot } => format!("{} {}", SPINNER, style(slot).cyan()),
        PipelineEvent::TaskFinished { slot, outcome } => {
            let icon = match outcome {
                Outcome::Succeeded { .. } => CHECK,
                Outcome::Skipped { .. } => INFO,
                Outcome::Failed(_) => CROSS,
            };
            format!("{} {}: {}", icon, style(slot).bold(), format_outcome(outcome))
        }
        PipelineEvent::SetupFinished { failure } => match failure {
            None => format!("{} Setup complete", CHECK),
            Some(failure) => format!("{} Setup failed: {}", CROSS, style(failure).red()),
        },
        PipelineEvent::PhaseStarted { phase } => format!("{} {}", SPINNER, style(phase).cyan()),
        PipelineEvent::PhaseFailed { phase, error } => {
            format!("{} {}: {}", CROSS, style(phase).red(), style(error).dim())
        }
        PipelineEvent::TeardownStarted { resources } => {
            format!("{} Tearing down {} resource(s)", BROOM, resources)
        }
        PipelineEvent::ResourceReleased { resource, error } => match error {
            None => format!("{} Released {}", CHECK, style(resource).green()),
            Some(error) => format!(
                "{} Failed to release {}: {}",
                WARN,
                style(resource).yellow(),
                style(error).dim()
            ),
        },
        PipelineEvent::RunFinished { run_id, success } => {
            let status = if *success {
                format!("{} completed", style("successfully").green())
            } else {
                style("failed").red().to_string()
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status
            )
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
