//! One-shot administrative commands. Each opens the store, does one thing,
//! and prints the result as JSON on stdout.
//!
//! redb holds an exclusive lock on the database file, so these commands
//! must run while `beacond run` is stopped.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::TimeDelta;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use beacon_core::BeaconConfig;
use beacon_health::{CheckExecutor, HyperProbe};
use beacon_metrics::{Aggregator, hours_window};
use beacon_scheduler::{Scheduler, SchedulerConfig};
use beacon_state::*;

fn open_store(config: &BeaconConfig) -> anyhow::Result<StateStore> {
    let path = config.storage.db_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    StateStore::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn aggregator(store: &StateStore) -> Aggregator {
    Aggregator::new(Arc::new(store.clone()), store.clock())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn init(path: &Path, data_dir: Option<&Path>) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let data_dir = data_dir.unwrap_or_else(|| Path::new("/var/lib/beacon"));
    let config = BeaconConfig::scaffold(data_dir);
    std::fs::write(path, config.to_toml_string()?)?;
    println!("Generated {}", path.display());
    Ok(())
}

pub async fn check(config: &BeaconConfig, url: &str) -> anyhow::Result<()> {
    let state = open_store(config)?;
    let store: Arc<dyn MonitorStore> = Arc::new(state.clone());
    let probe = Arc::new(HyperProbe::new(config.monitor.user_agent.clone()));
    let executor = CheckExecutor::new(Arc::clone(&store), probe)
        .with_timeout(config.monitor.probe_timeout());
    let scheduler = Scheduler::new(
        store,
        Arc::new(executor),
        SchedulerConfig::from(&config.monitor),
    );

    let outcome = scheduler.check_url(url).await?;
    let uptime = aggregator(&state).uptime_percent(outcome.service_id, TimeDelta::hours(24))?;
    print_json(&json!({
        "status": outcome.status,
        "response_time_ms": outcome.response_time_ms,
        "error_message": outcome.error_message,
        "recorded": outcome.recorded,
        "timestamp": state.clock().now(),
        "uptime_24h": uptime,
    }))
}

pub fn status(config: &BeaconConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&aggregator(&store).current_status()?)
}

pub fn history(config: &BeaconConfig, service_id: ServiceId, hours: u32) -> anyhow::Result<()> {
    let store = open_store(config)?;
    require_service(&store, service_id)?;
    let checks = aggregator(&store).service_history(service_id, hours_window(hours))?;
    print_json(&checks)
}

pub fn uptime(config: &BeaconConfig, service_id: ServiceId, hours: u32) -> anyhow::Result<()> {
    let store = open_store(config)?;
    require_service(&store, service_id)?;
    let uptime = aggregator(&store).uptime_percent(service_id, hours_window(hours))?;
    print_json(&json!({
        "service_id": service_id,
        "hours": hours,
        "uptime_percent": uptime,
    }))
}

pub fn stats(config: &BeaconConfig, service_id: ServiceId, days: u32) -> anyhow::Result<()> {
    let store = open_store(config)?;
    require_service(&store, service_id)?;
    print_json(&aggregator(&store).summary_stats(service_id, days)?)
}

pub fn add_service(
    config: &BeaconConfig,
    name: String,
    url: String,
    description: Option<String>,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let service = store.register_service(&NewService {
        name,
        url,
        description,
    })?;
    info!(service_id = service.id, url = %service.url, "service registered");
    print_json(&service)
}

pub fn list_services(config: &BeaconConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&store.list_services()?)
}

pub fn list_incidents(config: &BeaconConfig, filter: IncidentFilter) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&store.list_incidents(&filter)?)
}

pub fn show_incident(config: &BeaconConfig, id: IncidentId) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let incident = store
        .get_incident(id)?
        .with_context(|| format!("incident {id} not found"))?;
    print_json(&incident)
}

pub fn open_incident(config: &BeaconConfig, new: NewIncident) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let incident = store.insert_incident(new)?;
    info!(incident_id = incident.id, service_id = incident.service_id, "incident opened");
    print_json(&incident)
}

pub fn resolve_incident(config: &BeaconConfig, id: IncidentId) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&store.resolve_incident(id)?)
}

pub fn update_incident(
    config: &BeaconConfig,
    id: IncidentId,
    update: IncidentUpdate,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&store.update_incident(id, &update)?)
}

pub fn delete_incident(config: &BeaconConfig, id: IncidentId) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if !store.delete_incident(id)? {
        anyhow::bail!("incident {id} not found");
    }
    print_json(&json!({ "deleted": id }))
}

pub fn incident_stats(config: &BeaconConfig, days: u32) -> anyhow::Result<()> {
    let store = open_store(config)?;
    print_json(&aggregator(&store).incident_stats(days)?)
}

fn require_service(store: &StateStore, service_id: ServiceId) -> anyhow::Result<Service> {
    store
        .get_service(service_id)?
        .with_context(|| format!("service {service_id} not found"))
}
