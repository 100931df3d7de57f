//! Search Sync Main Entry Point
//!
//! Runs the change pipeline worker or one of the index lifecycle commands.

use std::env;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use search_sync::indexer::Indexer;
use search_sync::pipeline::{spawn_batch_workers, InlineBatchSink, DEFAULT_QUEUE_CAPACITY};
use search_sync::{Dependencies, IndexingError, Settings};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "search-sync", version, about = "Keeps search indices in sync with the database")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consume change notifications and keep the live indices up to date.
    Worker,
    /// Create a fresh index behind every handler's staging alias.
    Create,
    /// Fill the staging indices from the database.
    Populate {
        /// Process batches on this many concurrent workers instead of inline.
        #[arg(long, env = "POPULATE_WORKERS", default_value_t = 0)]
        workers: usize,
    },
    /// Point every handler's alias at its staging index.
    Live {
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete indices no alias references.
    Clean {
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the indices behind every handler's aliases.
    Status,
}

/// Initialize tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("search_sync=info,search_sync_repository=info"));

    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"))
        || env::var("AXIOM_TOKEN").is_ok();

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();

        info!(
            service_name = "search-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();

        info!(
            service_name = "search-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }
}

async fn populate(deps: &Dependencies, indexer: &Indexer, workers: usize) -> Result<(), IndexingError> {
    let mut reports = if workers == 0 {
        let sink = InlineBatchSink::new(deps.processor());
        indexer.populate(&sink).await?
    } else {
        let (sink, pool) = spawn_batch_workers(deps.processor(), workers, DEFAULT_QUEUE_CAPACITY);
        let result = indexer.populate(&sink).await;
        drop(sink);
        let totals = pool.join().await;
        if totals.failed > 0 {
            error!(failed = totals.failed, "Some batches failed, population is incomplete");
        }
        result?
    };

    indexer.count_documents(&mut reports).await?;
    for report in &reports {
        info!(
            handler = %report.handler,
            alias = %report.staging_alias,
            batches = report.batches,
            items = report.items,
            documents = ?report.document_count,
            "Populate finished"
        );
    }
    Ok(())
}

async fn run(command: Command) -> Result<(), IndexingError> {
    let settings = Settings::from_env()?;
    let deps = Dependencies::new(settings).await?;
    info!("Dependencies initialized successfully");

    let indexer = deps.indexer();
    match command {
        Command::Worker => {
            let mut orchestrator = deps.orchestrator()?;
            orchestrator.run().await?;
        }
        Command::Create => {
            for report in indexer.create().await? {
                info!(handler = %report.handler, index = %report.index, alias = %report.staging_alias, "Created");
            }
        }
        Command::Populate { workers } => populate(&deps, &indexer, workers).await?,
        Command::Live { dry_run } => {
            for report in indexer.swap(dry_run).await? {
                info!(
                    handler = %report.handler,
                    alias = %report.alias,
                    index = %report.index,
                    previous = ?report.previous,
                    dry_run = report.dry_run,
                    "Live"
                );
            }
        }
        Command::Clean { dry_run } => {
            let indices = indexer.clean(dry_run).await?;
            info!(indices = ?indices, dry_run = dry_run, count = indices.len(), "Clean finished");
        }
        Command::Status => {
            for status in indexer.status().await? {
                info!(
                    handler = %status.handler,
                    alias = %status.alias,
                    live = ?status.live,
                    staging = ?status.staging,
                    documents = ?status.document_count,
                    "Status"
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    dotenv().ok();
    let cli = Cli::parse();

    init_tracing();

    info!(command = ?cli.command, "Starting search sync");

    match run(cli.command).await {
        Ok(()) => {
            info!("Search sync completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Search sync failed");
            Err(e)
        }
    }
}
