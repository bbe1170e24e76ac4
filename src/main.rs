use anyhow::{Context, Result};
use insightflow::cli::commands::{default_journal_path, ReplayCommand, RunCommand, ValidateCommand};
use insightflow::cli::output::*;
use insightflow::cli::sim::SimulatedRunner;
use insightflow::cli::{Cli, Command};
use insightflow::{
    CancellationFlag, EventBus, ExecutionContext, ExecutorConfig, InMemorySchemaCatalog, Journal,
    Message, MessageKind, PipelineExecutor, PipelineStatus, PlanConfig, SchemaCatalog,
};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_plan(cmd).await?,
        Command::Validate(cmd) => validate_plan(cmd)?,
        Command::Replay(cmd) => replay_journal(cmd)?,
    }

    Ok(())
}

async fn run_plan(cmd: &RunCommand) -> Result<()> {
    let plan = PlanConfig::from_file(&cmd.file).context("Failed to load plan")?;
    println!("{} Loaded plan: {}", INFO, style(&plan.name).bold());

    let catalog = match &cmd.schema {
        Some(path) => Some(InMemorySchemaCatalog::from_file(path)?),
        None => None,
    };

    let graph = match plan.build_graph(catalog.as_ref().map(|c| c as &dyn SchemaCatalog)) {
        Ok(graph) => graph,
        Err(e) => {
            println!("{} Plan rejected:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    };
    println!(
        "{} Plan valid: {} step(s)",
        CHECK,
        style(graph.len()).cyan()
    );

    // Set up the bus, journaling unless asked not to
    let bus = if cmd.no_journal {
        Arc::new(EventBus::new())
    } else {
        let path = cmd.journal.clone().unwrap_or_else(default_journal_path);
        println!(
            "{} Journaling messages to {}",
            INFO,
            style(path.display()).dim()
        );
        Arc::new(EventBus::with_journal(&path).context("Failed to open message journal")?)
    };

    let progress = create_progress_bar(graph.len());
    let bar = progress.clone();
    bus.subscribe(move |message: &Message| {
        if message.kind == MessageKind::Complete && message.metadata.step_id.is_some() {
            bar.inc(1);
        }
        bar.println(format_message(message));
    });
    bus.start();

    let max_parallelism = cmd.parallelism.or(plan.max_parallelism).unwrap_or(2);
    let executor = PipelineExecutor::with_config(
        bus.clone(),
        ExecutorConfig {
            max_parallelism,
            ..Default::default()
        },
    );
    let runner = Arc::new(SimulatedRunner::new().with_failures(cmd.fail_steps.clone()));

    println!();
    let result = executor
        .execute(&graph, ExecutionContext::new(), runner, &CancellationFlag::new())
        .await;

    bus.stop().await;
    progress.finish_and_clear();

    println!();
    for (step_id, status) in &result.statuses {
        println!("  {} - {}", style(step_id).bold(), format_step_status(status));
    }
    for failure in &result.failures {
        println!(
            "  {} {}: {}",
            CROSS,
            style(&failure.step_id).red(),
            style(&failure.message).dim()
        );
    }

    println!(
        "\n{} {} - {} (run {})",
        if result.is_success() { CHECK } else { CROSS },
        style(&plan.name).bold(),
        format_pipeline_status(result.status),
        style(&result.run_id.to_string()[..8]).dim()
    );

    if result.status == PipelineStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

fn validate_plan(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating plan...", INFO);

    let plan = match PlanConfig::from_file(&cmd.file) {
        Ok(plan) => plan,
        Err(e) => {
            println!("{} Could not load plan:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    };

    let catalog = match &cmd.schema {
        Some(path) => Some(InMemorySchemaCatalog::from_file(path)?),
        None => None,
    };

    match plan.build_graph(catalog.as_ref().map(|c| c as &dyn SchemaCatalog)) {
        Ok(graph) => {
            println!("{} Plan is valid!", CHECK);
            println!("  Name: {}", style(&plan.name).bold());
            println!("  Steps: {}", style(graph.len()).cyan());
            if let Some(parallelism) = plan.max_parallelism {
                println!("  Max parallelism: {}", style(parallelism).cyan());
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&plan)?;
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

fn replay_journal(cmd: &ReplayCommand) -> Result<()> {
    let path = cmd.file.clone().unwrap_or_else(default_journal_path);
    let messages = Journal::replay(&path)
        .with_context(|| format!("Failed to replay journal {}", path.display()))?;

    let start = cmd
        .limit
        .map(|limit| messages.len().saturating_sub(limit))
        .unwrap_or(0);

    for message in &messages[start..] {
        if cmd.json {
            println!("{}", serde_json::to_string(message)?);
        } else {
            println!("{}", format_replayed(message));
        }
    }

    println!(
        "\n{} {} message(s) from {}",
        INFO,
        style(messages.len() - start).cyan(),
        style(path.display()).dim()
    );
    Ok(())
}
