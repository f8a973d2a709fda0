//! `workflow-coordinator` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow definition JSON file.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use db::{ExecutionStore, MemoryStore, PgStore};
use engine::{
    CoordinatorConfig, DefinitionStore, DispatchOrder, FailurePropagation, MemoryDefinitions,
    PgDefinitions, Target, TransitionPolicy, WorkflowCoordinator, WorkflowDefinition,
};
use queue::{MemoryQueue, PgTaskQueue, TaskDispatcher};

#[derive(Parser)]
#[command(
    name = "workflow-coordinator",
    about = "Dependency-driven workflow execution coordinator",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve(ServeArgs),
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
        /// Also print the tasks an execution aimed at this target would create.
        #[arg(long)]
        target: Option<String>,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,
    /// Postgres URL. Without one, state lives in memory and is lost on exit,
    /// and dispatched tasks stay in a process-local queue no executor reads.
    /// Only useful for trying the API out.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
    #[arg(long, env = "QUEUE_NAME", default_value = queue::DEFAULT_QUEUE)]
    queue_name: String,
    #[arg(long, value_enum, default_value_t = DispatchOrderArg::AfterCommit)]
    dispatch_order: DispatchOrderArg,
    #[arg(long, value_enum, default_value_t = FailurePropagationArg::TargetOnly)]
    failure_propagation: FailurePropagationArg,
    /// Reject results that skip `RUNNING` or rewrite a finished task.
    #[arg(long)]
    strict_transitions: bool,
    /// Publish before commit and never write a final execution state on the
    /// target. Overrides the other policy flags.
    #[arg(long)]
    reference_mode: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DispatchOrderArg {
    AfterCommit,
    BeforeCommit,
}

#[derive(Clone, Copy, ValueEnum)]
enum FailurePropagationArg {
    TargetOnly,
    Contagious,
}

impl ServeArgs {
    fn coordinator_config(&self) -> CoordinatorConfig {
        if self.reference_mode {
            return CoordinatorConfig::reference();
        }
        CoordinatorConfig {
            dispatch_order: match self.dispatch_order {
                DispatchOrderArg::AfterCommit => DispatchOrder::AfterCommit,
                DispatchOrderArg::BeforeCommit => DispatchOrder::BeforeCommit,
            },
            failure_propagation: match self.failure_propagation {
                FailurePropagationArg::TargetOnly => FailurePropagation::TargetOnly,
                FailurePropagationArg::Contagious => FailurePropagation::Contagious,
            },
            transitions: if self.strict_transitions {
                TransitionPolicy::Strict
            } else {
                TransitionPolicy::Permissive
            },
            ..CoordinatorConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Migrate { database_url } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path, target } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let definition: WorkflowDefinition =
                serde_json::from_str(&content).context("invalid workflow JSON")?;

            if let Err(e) = validate(&definition, target.as_deref()) {
                eprintln!("❌ Validation failed: {e}");
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.coordinator_config();

    let (store, definitions, dispatcher): (
        Arc<dyn ExecutionStore>,
        Arc<dyn DefinitionStore>,
        Arc<dyn TaskDispatcher>,
    ) = match &args.database_url {
        Some(url) => {
            let pool = db::pool::create_pool(url, args.max_connections)
                .await
                .context("failed to connect to database")?;
            (
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgDefinitions::new(pool.clone())),
                Arc::new(PgTaskQueue::new(pool, args.queue_name.as_str())),
            )
        }
        None => {
            warn!(
                "DATABASE_URL not set: using in-memory state; dispatched tasks are \
                 never delivered to executors"
            );
            (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryDefinitions::new()),
                Arc::new(MemoryQueue::new()),
            )
        }
    };

    info!(
        dispatch_order = ?config.dispatch_order,
        failure_propagation = ?config.failure_propagation,
        transitions = ?config.transitions,
        "Starting API server on {}",
        args.bind
    );
    let coordinator = WorkflowCoordinator::new(store, definitions, dispatcher, config);
    api::serve(args.bind, api::AppState::new(Arc::new(coordinator)))
        .await
        .context("API server failed")
}

fn validate(definition: &WorkflowDefinition, target: Option<&str>) -> anyhow::Result<()> {
    let order = engine::validate_definition(definition)?;
    println!("✅ Workflow is valid. Topological order: {order:?}");

    if let Some(target) = target {
        let closure: Vec<&str> = engine::find_workflow_tasks(definition, &Target::from(target))?
            .into_iter()
            .map(|spec| spec.name.as_str())
            .collect();
        println!("Tasks needed for '{target}': {closure:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn serve_args(args: &[&str]) -> ServeArgs {
        let argv = ["workflow-coordinator", "serve"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => args,
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn policy_flags_map_onto_the_coordinator_config() {
        let config = serve_args(&[
            "--dispatch-order",
            "before-commit",
            "--failure-propagation",
            "contagious",
            "--strict-transitions",
        ])
        .coordinator_config();

        assert_eq!(config.dispatch_order, DispatchOrder::BeforeCommit);
        assert_eq!(config.failure_propagation, FailurePropagation::Contagious);
        assert_eq!(config.transitions, TransitionPolicy::Strict);
        assert!(config.finalize_on_target);
    }

    #[test]
    fn reference_mode_overrides_other_flags() {
        let config = serve_args(&["--reference-mode", "--strict-transitions"]).coordinator_config();
        assert_eq!(config, CoordinatorConfig::reference());
    }
}
