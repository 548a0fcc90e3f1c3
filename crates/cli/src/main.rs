//! `crm-automation` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `worker`   — poll due delay continuations and resume their runs.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate an automation JSON file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{DbPool, PgStore};
use engine::adapters::{OutboxEmailSender, OutboxWhatsAppSender, PgContactStore, PgListResolver};
use engine::{Automation, AutomationExecutor, ExecutorConfig};
use nodes::http::ReqwestHttpClient;
use nodes::traits::DEFAULT_FROM_ADDRESS;
use nodes::{Node, Services};
use queue::PgScheduler;

#[derive(Parser)]
#[command(
    name = "crm-automation",
    about = "CRM automation execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

#[derive(Args)]
struct EngineArgs {
    /// Sender for email nodes without `from`.
    #[arg(long, env = "DEFAULT_FROM_ADDRESS", default_value = DEFAULT_FROM_ADDRESS)]
    default_from: String,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Resume runs whose delay has elapsed.
    Worker {
        #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1000)]
        poll_interval_ms: u64,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Validate an automation definition JSON file.
    Validate {
        /// Either a node array or an object with a `nodes` field.
        path: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, db: db_args, engine: tuning } => {
            let pool = connect(&db_args).await?;
            let store = Arc::new(PgStore::new(pool.clone()));
            let state = api::AppState {
                automations: store.clone(),
                logs: store,
                executor: build_executor(pool, &tuning),
            };

            info!("Starting API server on {bind}");
            api::serve(&bind, state, shutdown_signal().cancelled_owned())
                .await
                .context("API server failed")?;
        }
        Command::Worker { poll_interval_ms, db: db_args, engine: tuning } => {
            let pool = connect(&db_args).await?;
            let executor = build_executor(pool.clone(), &tuning);
            let cancel = shutdown_signal();
            let (tx, rx) = mpsc::unbounded_channel();

            info!("Starting resume worker");
            let poller = tokio::spawn(queue::poll_due_jobs(
                pool,
                tx,
                Duration::from_millis(poll_interval_ms),
                cancel.clone(),
            ));
            engine::worker::run(executor, rx, cancel.clone()).await;
            cancel.cancel();

            poller
                .await
                .context("job poller panicked")?
                .context("job poller failed")?;
        }
        Command::Migrate { db: db_args } => {
            let pool = connect(&db_args).await?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let automation = parse_definition(&content)?;

            match engine::validate_graph(&automation) {
                Ok(order) => println!("Automation is valid. Topological order: {order:?}"),
                Err(e) => bail!("validation failed: {e}"),
            }
        }
    }

    Ok(())
}

async fn connect(args: &DbArgs) -> Result<DbPool> {
    db::pool::create_pool(&args.database_url, args.max_connections)
        .await
        .context("failed to connect to database")
}

fn build_executor(pool: DbPool, args: &EngineArgs) -> Arc<AutomationExecutor> {
    let config = ExecutorConfig::default().with_default_from(args.default_from.clone());
    let store = Arc::new(PgStore::new(pool.clone()));
    let services = Services {
        http: Arc::new(ReqwestHttpClient::new()),
        email: Arc::new(OutboxEmailSender::new(pool.clone())),
        whatsapp: Arc::new(OutboxWhatsAppSender::new(pool.clone())),
        contacts: Arc::new(PgContactStore::new(pool.clone())),
        lists: Arc::new(PgListResolver::new(pool.clone())),
        http_timeout: config.http_timeout,
        mass_email_batch_size: config.mass_email_batch_size,
        default_from: config.default_from.clone(),
    };

    Arc::new(AutomationExecutor::new(
        &config,
        services,
        Arc::new(PgScheduler::new(pool)),
        store.clone(),
        store,
    ))
}

fn parse_definition(content: &str) -> Result<Automation> {
    let value: Value = serde_json::from_str(content).context("invalid JSON")?;
    let (name, nodes) = match value {
        Value::Array(_) => ("unnamed".to_string(), value),
        Value::Object(mut map) => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string();
            let nodes = map.remove("nodes").context("missing `nodes` field")?;
            (name, nodes)
        }
        _ => bail!("expected a node array or an object with `nodes`"),
    };
    let nodes: Vec<Node> = serde_json::from_value(nodes).context("invalid node list")?;
    Ok(Automation::new(Uuid::nil(), name, nodes))
}

/// A token cancelled on Ctrl-C.
fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        trigger.cancel();
    });
    token
}
