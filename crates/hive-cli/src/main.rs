//! `hive` — run and inspect Hive objectives from the command line.

mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::{load_config, HiveConfig};
use hive_core::{ObjectiveStatus, Priority};
use hive_memory::{CoordinationStore, FileStore, Namespace, QueryFilter, Session};
use hive_orchestrator::{Queen, RuleTable, SubmitOptions, TemplatePlanner};
use hive_tools::{CapabilityRouter, HttpTransport, ToolInvoker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hive", about = "Hive — multi-agent objective coordinator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "hive.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an objective to completion
    Run {
        objective: String,
        /// Upper bound on agent roles (overrides config)
        #[arg(long)]
        max_agents: Option<usize>,
        /// Run each batch's agents one at a time
        #[arg(long)]
        sequential: bool,
        /// Role whose failure fails the objective (repeatable)
        #[arg(long = "critical")]
        critical: Vec<String>,
        /// Per-call deadline in milliseconds, for every operation class
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// low, normal, high or critical
        #[arg(long)]
        priority: Option<Priority>,
    },
    /// Show the analysis and batches for an objective without running it
    Plan { objective: String },
    /// Inspect the coordination store
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// List configured capabilities
    Capabilities,
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Print one entry
    Get { namespace: String, key: String },
    /// List entries in a namespace
    Query {
        namespace: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Include child namespaces
        #[arg(short, long)]
        recursive: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete one entry
    Delete { namespace: String, key: String },
    /// Remove expired entries
    Gc,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_queen(config: &HiveConfig, store: Arc<dyn CoordinationStore>) -> Queen {
    let transport = Arc::new(HttpTransport::new(config.transport.clone()));
    let invoker = ToolInvoker::new(transport, config.invoker.clone());
    let router = Arc::new(CapabilityRouter::new(config.registry(), invoker));
    Queen::new(
        store,
        router,
        Arc::new(TemplatePlanner),
        config.catalog(),
        RuleTable::default(),
    )
}

async fn open_store(config: &HiveConfig) -> anyhow::Result<Arc<dyn CoordinationStore>> {
    let store = FileStore::open(config.store_path()).await?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = load_config(&cli.config)?.with_env();

    match cli.command {
        Commands::Run {
            objective,
            max_agents,
            sequential,
            critical,
            timeout_ms,
            priority,
        } => {
            let mut options = config.objective.clone();
            if let Some(n) = max_agents {
                options.max_agents = n;
            }
            if sequential {
                options.allow_parallel = false;
            }
            if !critical.is_empty() {
                options.critical_roles = critical.into_iter().collect();
            }
            if timeout_ms.is_some() {
                options.default_timeout_ms = timeout_ms;
            }
            if let Some(priority) = priority {
                options.priority = priority;
            }
            run_objective(&config, objective, options).await?;
        }
        Commands::Plan { objective } => {
            let store = open_store(&config).await?;
            let queen = build_queen(&config, store.clone());
            let (analysis, plan) = queen.plan(&objective, &config.objective).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "analysis": analysis,
                    "batches": plan,
                }))?
            );
            store.close().await?;
        }
        Commands::Memory { action } => {
            let store = open_store(&config).await?;
            memory_command(store.as_ref(), action).await?;
            store.close().await?;
        }
        Commands::Capabilities => {
            let registry = config.registry();
            let capabilities = registry.list();
            if capabilities.is_empty() {
                println!("No capabilities configured.");
                println!("Declare them in {} under [[capabilities]]", cli.config.display());
            } else {
                println!("Registered capabilities:");
                for cap in &capabilities {
                    let class = cap.class.as_ref().map_or_else(|| "inferred".to_string(), ToString::to_string);
                    println!("  {} [{}] -> {}: {}", cap.name, class, cap.endpoint(), cap.description);
                    if !cap.synonyms.is_empty() {
                        println!("    synonyms: {}", cap.synonyms.join(", "));
                    }
                }
                println!("\nTotal: {} capability(ies)", capabilities.len());
            }
        }
    }

    Ok(())
}

async fn run_objective(
    config: &HiveConfig,
    objective: String,
    options: SubmitOptions,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let session = Session::open(store.clone()).await?;
    let queen = build_queen(config, store);

    let mut events = queen.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{line}");
                    }
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let id = queen.submit(objective, options).await?;
    session.record_objective(id, ObjectiveStatus::Running).await?;

    let canceller = {
        let queen = queen.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(objective_id = %id, "Interrupt received, cancelling");
                queen.cancel(id);
            }
        })
    };

    let report = queen.wait(id).await?;
    canceller.abort();
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer task failed");
    }

    session.record_objective(id, report.status()).await?;
    session.close().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    match report.status() {
        ObjectiveStatus::Completed => Ok(()),
        status => anyhow::bail!("objective {id} finished {status}"),
    }
}

async fn memory_command(store: &dyn CoordinationStore, action: MemoryAction) -> anyhow::Result<()> {
    match action {
        MemoryAction::Get { namespace, key } => {
            let ns = Namespace::parse(&namespace)?;
            match store.get(&ns, &key).await? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                None => println!("No entry {ns}/{key}"),
            }
        }
        MemoryAction::Query {
            namespace,
            prefix,
            tag,
            recursive,
            limit,
        } => {
            let ns = Namespace::parse(&namespace)?;
            let mut filter = QueryFilter::new();
            if let Some(prefix) = prefix {
                filter = filter.key_prefix(prefix);
            }
            if let Some(tag) = tag {
                filter = filter.tag(tag);
            }
            if recursive {
                filter = filter.recursive();
            }
            if let Some(limit) = limit {
                filter = filter.limit(limit);
            }
            let entries = store.query(&ns, &filter).await?;
            for entry in &entries {
                println!("{}", serde_json::to_string(entry)?);
            }
            info!(count = entries.len(), "Query complete");
        }
        MemoryAction::Delete { namespace, key } => {
            let ns = Namespace::parse(&namespace)?;
            if store.delete(&ns, &key).await? {
                println!("Deleted {ns}/{key}");
            } else {
                println!("No entry {ns}/{key}");
            }
        }
        MemoryAction::Gc => {
            let removed = store.purge_expired().await?;
            println!("Removed {removed} expired entr(ies)");
        }
    }
    Ok(())
}
