//! BAKEN — JRA betting-ticket ingestion and settlement engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the ticket store, and runs the sync→settle loop with graceful
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use baken::config;
use baken::engine::normalizer::Normalizer;
use baken::engine::sync::Syncer;
use baken::ingest::csv::CsvExportSource;
use baken::ingest::TicketSource;
use baken::results::file::FileResultFeed;
use baken::storage::TicketStore;

const BANNER: &str = r#"
 ____    _    _  _______ _   _
| __ )  / \  | |/ / ____| \ | |
|  _ \ / _ \ | ' /|  _| |  \| |
| |_) / ___ \| . \| |___| |\  |
|____/_/   \_\_|\_\_____|_| \_|

  JRA Ticket Sync & Settlement Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        interval_secs = cfg.sync.interval_secs,
        csv_export_dir = %cfg.sync.csv_export_dir,
        results_dir = %cfg.sync.results_dir,
        "BAKEN starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = TicketStore::connect(&cfg.database_url()).await?;

    let sources: Vec<Arc<dyn TicketSource>> =
        vec![Arc::new(CsvExportSource::new(&cfg.sync.csv_export_dir))];
    let feed = Arc::new(FileResultFeed::new(&cfg.sync.results_dir));
    let normalizer = Normalizer::new(cfg.tables.clone());

    let syncer = Syncer::new(sources, feed, store.clone(), normalizer);

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.sync.interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.sync.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let cycle_id = uuid::Uuid::new_v4();
                info!(%cycle_id, "Starting cycle");

                let sync = syncer.sync_tickets().await;
                let settle = syncer.settle_pending().await;

                match store.pending_count().await {
                    Ok(pending) => info!(
                        %cycle_id,
                        fetched = sync.fetched,
                        written = sync.written,
                        races_resolved = settle.races_resolved,
                        wins = settle.wins,
                        losses = settle.losses,
                        total_payout = settle.total_payout,
                        pending,
                        "Cycle complete"
                    ),
                    Err(e) => error!(%cycle_id, error = %e, "Failed to count pending tickets"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("BAKEN shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("baken=info"));

    let json_logging = std::env::var("BAKEN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
