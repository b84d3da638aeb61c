//! beacon-metrics: read-only statistics over the check ledger.
//!
//! Nothing here writes to the store; every figure is computed on demand
//! from `MonitorStore` reads.
//!
//! # Architecture
//!
//! ```text
//! Pure functions (uptime)
//!   ├── uptime_percent(checks)         → % of non-down checks, 2 decimals
//!   ├── average_response_time(checks) → mean over checks with a latency
//!   └── daily_uptime(checks)           → per-calendar-day buckets
//!
//! Aggregator (store + clock)
//!   ├── uptime_percent(service, window)
//!   ├── summary_stats(service, days)
//!   ├── service_history(service, window)
//!   ├── current_status()               → status board for every service
//!   └── incident_stats(days)
//! ```

pub mod aggregator;
pub mod uptime;

pub use aggregator::{
    Aggregator, IncidentStats, ServiceStatus, ServiceSummary, days_window, hours_window,
};
pub use uptime::{DailyUptime, average_response_time, daily_uptime, uptime_percent};
