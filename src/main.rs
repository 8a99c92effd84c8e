use k8s_integration::cli::commands::{RunCommand, ValidateCommand};
use k8s_integration::cli::output::*;
use k8s_integration::cli::{Cli, Command};
use k8s_integration::core::Workspace;
use k8s_integration::execution::{PipelineDriver, SetupPlan};
use k8s_integration::external::{ShellOperations, ToolConfig};

use anyhow::{Context, Result};
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run(cmd).await?,
        Command::Validate(cmd) => validate(cmd)?,
    }

    Ok(())
}

async fn run(cmd: &RunCommand) -> Result<()> {
    let config = match cmd.config.resolve() {
        Ok(config) => config,
        Err(e) => {
            println!("{} Invalid configuration: {}", CROSS, style(&e).red());
            std::process::exit(1);
        }
    };
    println!("{} {}", INFO, format_configuration(&config));
    for warning in config.warnings() {
        println!("{} {}", WARN, style(warning).yellow());
    }

    let workspace = Workspace::unique();
    workspace
        .create()
        .await
        .with_context(|| format!("Failed to create workspace {}", workspace.root().display()))?;

    let mut tools = ToolConfig::new(&config.pkg_dir).with_timeout(cmd.command_timeout_secs);
    if let Some(dir) = &cmd.artifacts_dir {
        tools = tools.with_artifacts_dir(dir);
    }

    let progress = create_progress_bar();
    let bar = progress.clone();
    let driver = PipelineDriver::new(ShellOperations::new(tools))
        .with_event_handler(move |event| render_event(&bar, event));

    let report = driver.run(&config, &workspace).await;
    progress.finish_and_clear();

    if let Err(e) = workspace.remove().await {
        warn!("Failed to remove workspace {}: {}", workspace.root().display(), e);
    }

    let elapsed = report.duration().to_std().unwrap_or_default();
    match &report.result {
        Ok(()) => {
            println!(
                "\n{} Integration tests {} in {}",
                CHECK,
                style("passed").green(),
                format_duration(elapsed)
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} Integration tests {} after {}",
                CROSS,
                style("failed").red(),
                format_duration(elapsed)
            );
            error!("Failed to run integration test: {}", e);
            std::process::exit(1);
        }
    }
}

fn validate(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    match cmd.config.resolve() {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  {}", format_configuration(&config));
            let plan = SetupPlan::from_config(&config);
            let slots: Vec<&str> = plan.active_slots().iter().map(|s| s.name()).collect();
            println!("  Setup: {}", style(slots.join(", ")).cyan());
            for warning in config.warnings() {
                println!("{} {}", WARN, style(warning).yellow());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}
