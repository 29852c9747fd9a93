use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use vaultwatch::chain::{ChainReader, RpcChainReader};
use vaultwatch::config::Config;
use vaultwatch::events::EventRegistry;
use vaultwatch::indexer::{IndexerSettings, LogWindowIndexer};
use vaultwatch::scheduler::{run_periodic, unix_now, IndexerTask, SamplerTask};
use vaultwatch::series::{PoolReserves, SeriesAggregator, VaultPrice};
use vaultwatch::snapshot::SnapshotSampler;
use vaultwatch::store;
use vaultwatch::telemetry::Telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config_path = std::env::var("VAULTWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("vaultwatch.toml"));
    let from_file = config_path.exists();
    let config = if from_file {
        Config::load(&config_path)?
    } else {
        Config::from_env()?
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("vaultwatch v{} starting", env!("CARGO_PKG_VERSION"));
    if !from_file {
        info!(path = %config_path.display(), "no config file found, using env-only config");
    }

    let addresses = config.chain.addresses()?;
    let reader: Arc<dyn ChainReader> = Arc::new(RpcChainReader::connect(&config.chain.rpc_url)?);
    let store = store::open(&config.store).await?;
    let telemetry = Telemetry::new();
    let now = unix_now();

    // --- Indexer ---
    let mut indexer = LogWindowIndexer::new(
        reader.clone(),
        store.clone(),
        EventRegistry::new(addresses.pool, addresses.vault),
        IndexerSettings::from_config(&config.chain, &config.indexer),
    );
    indexer.hydrate(now).await;
    telemetry.publish_history(indexer.window(), now);

    // --- Sampler + series ---
    let mut vault_series = SeriesAggregator::new(VaultPrice, store.clone(), config.series.retention_secs);
    let mut pool_series = SeriesAggregator::new(PoolReserves, store.clone(), config.series.retention_secs);
    vault_series.hydrate(now).await;
    pool_series.hydrate(now).await;

    let budget_override = config.policy.budget_override();
    if budget_override.is_none() {
        info!("no absolute daily budget configured, deriving it from dailyBudgetBps");
    }
    let sampler = SnapshotSampler::new(reader.clone(), addresses, config.chain.read_timeout());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let indexer_handle = tokio::spawn(run_periodic(
        IndexerTask::new(indexer, telemetry.clone()),
        Duration::from_secs(config.indexer.interval_secs),
        shutdown_rx.clone(),
    ));
    let sampler_handle = tokio::spawn(run_periodic(
        SamplerTask::new(sampler, vault_series, pool_series, budget_override, telemetry.clone()),
        Duration::from_secs(config.series.interval_secs),
        shutdown_rx,
    ));

    // Stand-in consumer until a presentation layer subscribes
    let mut updates = telemetry.subscribe();
    tokio::spawn(async move {
        let mut last_events = 0usize;
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.history.len() != last_events {
                last_events = state.history.len();
                info!(
                    events = last_events,
                    last_vault_action = ?state.last_vault_action.as_ref().map(|e| e.label()),
                    "event window updated"
                );
            }
        }
    });

    info!("running - press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested, waiting for in-flight ticks");
    let _ = shutdown_tx.send(true);

    if let Err(e) = indexer_handle.await {
        warn!(task = "indexer", error = %e, "task ended abnormally");
    }
    if let Err(e) = sampler_handle.await {
        warn!(task = "sampler", error = %e, "task ended abnormally");
    }

    info!("vaultwatch stopped");
    Ok(())
}
