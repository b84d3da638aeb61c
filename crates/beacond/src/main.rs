//! beacond: the Beacon uptime monitor.
//!
//! Single binary that runs the monitoring loop and administers the state
//! it produces:
//! - State store (redb)
//! - HTTP probe + check executor + incident correlator
//! - Scheduler
//! - Uptime and incident statistics
//!
//! # Usage
//!
//! ```text
//! beacond init
//! beacond run --config beacon.toml
//! beacond check --url https://portal.example.edu
//! beacond incidents list --status open
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;

use beacon_core::{BeaconConfig, TickPolicy};
use beacon_state::{IncidentId, IncidentStatus, ServiceId, Severity};

mod admin;
mod monitor_mode;

const DEFAULT_CONFIG: &str = "beacon.toml";

#[derive(Parser)]
#[command(
    name = "beacond",
    about = "Beacon: HTTP uptime monitor with automatic incidents",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to beacon.toml (default: ./beacon.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override [storage].data_dir.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a beacon.toml scaffold.
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
    /// Run the monitor until Ctrl-C.
    Run {
        /// Override [monitor].tick_interval_ms.
        #[arg(long)]
        tick_interval_ms: Option<u64>,

        /// Skip a tick while the previous one is still running.
        #[arg(long)]
        skip_if_busy: bool,
    },
    /// Check one registered service now.
    Check {
        #[arg(long)]
        url: String,
    },
    /// Latest status of every service.
    Status,
    /// Checks of a service over the last hours, newest first.
    History {
        service_id: ServiceId,
        #[arg(long, default_value = "24")]
        hours: u32,
    },
    /// Uptime percentage of a service.
    Uptime {
        service_id: ServiceId,
        #[arg(long, default_value = "24")]
        hours: u32,
    },
    /// Uptime summary with a per-day breakdown.
    Stats {
        service_id: ServiceId,
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Manage the service registry.
    Services {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Manage incidents.
    Incidents {
        #[command(subcommand)]
        action: IncidentAction,
    },
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Register a service (no-op if the URL is already registered).
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        description: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum IncidentAction {
    List {
        #[arg(long)]
        status: Option<IncidentStatus>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Show {
        id: IncidentId,
    },
    /// Open a manual incident.
    Open {
        #[arg(long)]
        service_id: ServiceId,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "medium")]
        severity: Severity,
        #[arg(long, default_value = "operator")]
        created_by: String,
    },
    Resolve {
        id: IncidentId,
    },
    Update {
        id: IncidentId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        status: Option<IncidentStatus>,
        /// RFC 3339 timestamp, e.g. 2025-03-01T10:00:00Z.
        #[arg(long)]
        resolved_at: Option<DateTime<Utc>>,
    },
    Delete {
        id: IncidentId,
    },
    /// Incident counts and mean resolution time.
    Stats {
        #[arg(long, default_value = "7")]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    if let Command::Init { path } = &cli.command {
        return admin::init(path, cli.data_dir.as_deref());
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Command::Init { .. } => Ok(()),
        Command::Run {
            tick_interval_ms,
            skip_if_busy,
        } => {
            if let Some(ms) = tick_interval_ms {
                config.monitor.tick_interval_ms = ms;
            }
            if skip_if_busy {
                config.monitor.tick_policy = TickPolicy::SkipIfBusy;
            }
            config.validate()?;
            monitor_mode::run(config).await
        }
        Command::Check { url } => admin::check(&config, &url).await,
        Command::Status => admin::status(&config),
        Command::History { service_id, hours } => admin::history(&config, service_id, hours),
        Command::Uptime { service_id, hours } => admin::uptime(&config, service_id, hours),
        Command::Stats { service_id, days } => admin::stats(&config, service_id, days),
        Command::Services { action } => match action {
            ServiceAction::Add {
                name,
                url,
                description,
            } => admin::add_service(&config, name, url, description),
            ServiceAction::List => admin::list_services(&config),
        },
        Command::Incidents { action } => match action {
            IncidentAction::List {
                status,
                severity,
                limit,
                offset,
            } => admin::list_incidents(
                &config,
                beacon_state::IncidentFilter {
                    status,
                    severity,
                    limit,
                    offset,
                },
            ),
            IncidentAction::Show { id } => admin::show_incident(&config, id),
            IncidentAction::Open {
                service_id,
                title,
                description,
                severity,
                created_by,
            } => admin::open_incident(
                &config,
                beacon_state::NewIncident {
                    service_id,
                    title,
                    description,
                    severity,
                    created_by,
                },
            ),
            IncidentAction::Resolve { id } => admin::resolve_incident(&config, id),
            IncidentAction::Update {
                id,
                title,
                description,
                severity,
                status,
                resolved_at,
            } => admin::update_incident(
                &config,
                id,
                beacon_state::IncidentUpdate {
                    title,
                    description,
                    severity,
                    status,
                    resolved_at,
                },
            ),
            IncidentAction::Delete { id } => admin::delete_incident(&config, id),
            IncidentAction::Stats { days } => admin::incident_stats(&config, days),
        },
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => "info,beacond=debug,beacon=debug".parse()?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Explicit `--config` must exist; otherwise `./beacon.toml` is used when
/// present and built-in defaults when not.
fn load_config(path: Option<&Path>) -> anyhow::Result<BeaconConfig> {
    if let Some(path) = path {
        return Ok(BeaconConfig::from_file(path)?);
    }
    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        debug!(path = %default.display(), "loading config");
        return Ok(BeaconConfig::from_file(default)?);
    }
    debug!("no beacon.toml found, using defaults");
    Ok(BeaconConfig::default())
}
