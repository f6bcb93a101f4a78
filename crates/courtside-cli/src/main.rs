mod observability;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courtside_storage::{
    run_migrations, EventSink, GameStore, MemoryGameStore, MemorySink, PgGameStore,
    RedisStreamSink, SeasonId,
};
use courtside_sync::{
    run_batch_with_retry, BatchResult, IngestPipeline, LatestCycle, Scheduler, Shutdown,
    SyncConfig,
};
use courtside_web::AppState;
use tracing::{info, warn};

use crate::observability::{init_logging, LogFormat};

#[derive(Debug, Parser)]
#[command(name = "courtside")]
#[command(about = "Reconciles live and authoritative game feeds")]
struct Cli {
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Commands {
    /// Start the scheduler and the operator API until Ctrl-C.
    Run,
    /// Run one live cycle and print its report.
    Once,
    /// Run one settlement cycle for yesterday, with retries.
    Batch,
    /// Apply database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);
    let config = SyncConfig::from_env().context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Once => {
            let pipeline = build_pipeline(&config).await?;
            let report = pipeline.run_live_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Batch => batch(config).await,
        Commands::Migrate => {
            let Some(url) = config.database_url.as_deref() else {
                bail!("DATABASE_URL must be set to run migrations");
            };
            let store = PgGameStore::connect(url, config.sport.clone())
                .await
                .context("connecting to postgres")?;
            run_migrations(store.pool()).await
        }
    }
}

async fn build_store(config: &SyncConfig) -> Result<Arc<dyn GameStore>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgGameStore::connect(url, config.sport.clone())
                .await
                .context("connecting to postgres")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!(season = %config.season, "DATABASE_URL unset; using an in-memory store");
            Ok(Arc::new(MemoryGameStore::with_season(
                config.season.clone(),
                SeasonId(1),
            )))
        }
    }
}

async fn build_sink(config: &SyncConfig) -> Result<Arc<dyn EventSink>> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let sink = RedisStreamSink::connect(url)
                .await
                .context("connecting to redis")?;
            Ok(Arc::new(sink))
        }
        None => {
            warn!("REDIS_URL unset; live updates stay in memory");
            Ok(Arc::new(MemorySink::new()))
        }
    }
}

async fn build_pipeline(config: &SyncConfig) -> Result<IngestPipeline> {
    let store = build_store(config).await?;
    let sink = build_sink(config).await?;
    IngestPipeline::from_config(config, store, sink).await
}

/// Triggers `shutdown` on the first Ctrl-C.
fn trigger_on_ctrl_c(shutdown: Shutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; shutting down");
            shutdown.trigger();
        }
    });
}

async fn run(config: SyncConfig) -> Result<()> {
    let latest = LatestCycle::default();
    let pipeline = build_pipeline(&config).await?.with_latest(latest.clone());
    let metrics = pipeline.metrics().clone();
    let scheduler = Arc::new(Scheduler::new(config.scheduler_config(), Arc::new(pipeline))?);

    let shutdown = Shutdown::new();
    trigger_on_ctrl_c(shutdown.clone());
    scheduler.start(shutdown.clone()).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let state = AppState::new(metrics, latest, scheduler.clone());
    let served = courtside_web::serve(addr, state, shutdown.clone()).await;

    // The API only returns early on a bind or serve error; stop the cadences either way.
    shutdown.trigger();
    scheduler.stop().await;
    served
}

async fn batch(config: SyncConfig) -> Result<()> {
    let pipeline = build_pipeline(&config).await?;
    let shutdown = Shutdown::new();
    trigger_on_ctrl_c(shutdown.clone());

    match run_batch_with_retry(
        &pipeline,
        config.batch_max_attempts,
        config.batch_retry_delay,
        &shutdown,
    )
    .await
    {
        BatchResult::Succeeded { report, .. } => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        BatchResult::Exhausted {
            attempts,
            last_error,
        } => bail!("settlement gave up after {attempts} attempts: {last_error}"),
        BatchResult::Aborted { attempts } => bail!("settlement interrupted after {attempts} attempts"),
        BatchResult::Failed { error, .. } => Err(error.into()),
    }
}
