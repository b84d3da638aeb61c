//! Monitor mode: the long-running probe loop.
//!
//! In this mode, the daemon:
//! 1. Opens the state store under the data directory
//! 2. Registers the services listed in beacon.toml
//! 3. Starts the scheduler (first tick immediately)
//! 4. On Ctrl-C, signals shutdown and waits for in-flight ticks

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use beacon_core::BeaconConfig;
use beacon_health::{CheckExecutor, HyperProbe};
use beacon_scheduler::{Scheduler, SchedulerConfig};
use beacon_state::{MonitorStore, NewService, StateStore};

/// Run the monitor until Ctrl-C.
pub async fn run(config: BeaconConfig) -> anyhow::Result<()> {
    info!("Beacon daemon starting");
    std::fs::create_dir_all(&config.storage.data_dir)?;

    // ── State store ──────────────────────────────────────────────
    let db_path = config.storage.db_path();
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // ── Service registry ─────────────────────────────────────────
    for entry in &config.services {
        let service = state.register_service(&NewService {
            name: entry.name.clone(),
            url: entry.url.clone(),
            description: entry.description.clone(),
        })?;
        info!(service_id = service.id, name = %service.name, url = %service.url, "service registered");
    }
    let registered = state.list_services()?.len();
    if registered == 0 {
        warn!("no services registered, ticks will be empty until one is added");
    }

    // ── Probe pipeline ───────────────────────────────────────────
    let store: Arc<dyn MonitorStore> = Arc::new(state);
    let probe = Arc::new(HyperProbe::new(config.monitor.user_agent.clone()));
    let executor = CheckExecutor::new(Arc::clone(&store), probe)
        .with_timeout(config.monitor.probe_timeout());
    let scheduler = Arc::new(Scheduler::new(
        store,
        Arc::new(executor),
        SchedulerConfig::from(&config.monitor),
    ));

    // ── Scheduler loop ───────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = scheduler.start(shutdown_rx)?;
    info!(services = registered, "monitor running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!(
        ticks = scheduler.ticks_started(),
        skipped = scheduler.ticks_skipped(),
        "Beacon daemon stopped"
    );
    Ok(())
}
