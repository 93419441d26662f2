use anyhow::{Context, Result};
use clap::Parser;
use foreman_agent::config::OrchestratorConfig;
use foreman_agent::domain::{UnitRef, WorkItem};
use foreman_agent::events::{EventSink, FanoutSink, JsonlEventSink, OrchestratorEvent};
use foreman_agent::gate::questions::QuestionCoordinator;
use foreman_agent::scheduler::Scheduler;
use foreman_agent::store::{MemoryStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(about = "Pipeline orchestrator driving an external coding agent")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// The work item to intake - what you want built (all arguments are joined)
    #[arg(trailing_var_arg = true, required = true)]
    objective: Vec<String>,

    /// Path to foreman.yaml (defaults to the embedded configuration)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory (defaults to current directory)
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Priority of the intake work item
    #[arg(short, long, default_value = "0")]
    priority: i32,

    /// Create the work item and exit without starting the scheduler
    #[arg(long)]
    intake_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::default_config(),
    };
    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let jsonl = JsonlEventSink::new(&working_dir.join(".foreman"))?;
    tracing::info!("Event log: {}", jsonl.path().display());
    let events: Arc<dyn EventSink> = Arc::new(FanoutSink::new(vec![Arc::new(jsonl)]));

    let objective = cli.objective.join(" ");
    let item = WorkItem::new(&objective, &objective, cli.priority);
    store.save_work_item(&item).await?;
    events.emit(OrchestratorEvent::ItemCreated {
        unit: UnitRef::WorkItem(item.id.clone()),
        title: item.title.clone(),
    });
    tracing::info!("Created work item {}", item.id);

    if cli.intake_only {
        return Ok(());
    }

    let coordinator = Arc::new(QuestionCoordinator::new(
        store.clone(),
        events.clone(),
        config.questions.clone(),
    ));
    let scheduler = Arc::new(
        Scheduler::new(store, events, config, working_dir)
            .with_question_coordinator(coordinator),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down after the current run finishes");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run_loop(shutdown_rx).await;
    Ok(())
}
