//! Aggregator: on-demand statistics for services and incidents.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use beacon_state::*;

use crate::uptime::{self, DailyUptime};

/// Uptime summary for one service over a trailing window of days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub service_id: ServiceId,
    pub days: u32,
    pub total_checks: usize,
    pub successful_checks: usize,
    pub uptime_percent: f64,
    pub average_response_time_ms: Option<f64>,
    /// Newest day first.
    pub daily: Vec<DailyUptime>,
}

/// One row of the status board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub service: Service,
    /// Latest verdict; `None` until the service has been checked.
    pub status: Option<CheckStatus>,
    pub response_time_ms: Option<u64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub uptime_24h: f64,
    pub open_incident: Option<IncidentId>,
}

/// Incident counts over a trailing window of days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IncidentStats {
    pub days: u32,
    pub total: usize,
    pub open: usize,
    pub resolved: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Mean time to resolution over resolved incidents, in hours.
    pub average_resolution_hours: Option<f64>,
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn MonitorStore>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn MonitorStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Start of the trailing `window`, clamped to the earliest representable
    /// instant when the window reaches past it.
    fn since(&self, window: TimeDelta) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Uptime over the trailing `window`.
    pub fn uptime_percent(&self, service_id: ServiceId, window: TimeDelta) -> StateResult<f64> {
        let checks = self.store.checks_in_window(service_id, self.since(window))?;
        Ok(uptime::uptime_percent(&checks))
    }

    /// Checks in the trailing `window`, newest first.
    pub fn service_history(
        &self,
        service_id: ServiceId,
        window: TimeDelta,
    ) -> StateResult<Vec<Check>> {
        self.store.checks_in_window(service_id, self.since(window))
    }

    pub fn summary_stats(&self, service_id: ServiceId, days: u32) -> StateResult<ServiceSummary> {
        let checks = self
            .store
            .checks_in_window(service_id, self.since(days_window(days)))?;
        debug!(service_id, days, checks = checks.len(), "computing summary stats");

        let successful_checks = uptime::successful(checks.iter());
        Ok(ServiceSummary {
            service_id,
            days,
            total_checks: checks.len(),
            successful_checks,
            uptime_percent: uptime::percent(successful_checks, checks.len()),
            average_response_time_ms: uptime::average_response_time(&checks),
            daily: uptime::daily_uptime(&checks),
        })
    }

    /// Latest state of every registered service.
    pub fn current_status(&self) -> StateResult<Vec<ServiceStatus>> {
        let since = self.since(TimeDelta::hours(24));
        self.store
            .list_services()?
            .into_iter()
            .map(|service| -> StateResult<ServiceStatus> {
                let latest = self.store.recent_checks(service.id, 1)?.into_iter().next();
                let day = self.store.checks_in_window(service.id, since)?;
                let open_incident = self.store.open_incident(service.id)?.map(|i| i.id);
                Ok(ServiceStatus {
                    status: latest.as_ref().map(|c| c.status),
                    response_time_ms: latest.as_ref().and_then(|c| c.response_time_ms),
                    last_checked: latest.as_ref().map(|c| c.checked_at),
                    uptime_24h: uptime::uptime_percent(&day),
                    open_incident,
                    service,
                })
            })
            .collect()
    }

    pub fn incident_stats(&self, days: u32) -> StateResult<IncidentStats> {
        let incidents = self
            .store
            .incidents_since(self.since(days_window(days)))?;

        let mut stats = IncidentStats {
            days,
            total: incidents.len(),
            ..IncidentStats::default()
        };
        let mut resolution_hours = Vec::new();
        for incident in &incidents {
            match incident.status {
                IncidentStatus::Open => stats.open += 1,
                IncidentStatus::Resolved => stats.resolved += 1,
            }
            match incident.severity {
                Severity::High => stats.high += 1,
                Severity::Medium => stats.medium += 1,
                Severity::Low => stats.low += 1,
            }
            if let Some(resolved_at) = incident.resolved_at {
                let seconds = (resolved_at - incident.started_at).num_seconds();
                resolution_hours.push(seconds as f64 / 3600.0);
            }
        }

        stats.average_resolution_hours = (!resolution_hours.is_empty()).then(|| {
            uptime::round2(resolution_hours.iter().sum::<f64>() / resolution_hours.len() as f64)
        });
        Ok(stats)
    }
}

/// Trailing window of whole hours.
pub fn hours_window(hours: u32) -> TimeDelta {
    TimeDelta::try_hours(i64::from(hours)).unwrap_or(TimeDelta::MAX)
}

/// Trailing window of whole days.
pub fn days_window(days: u32) -> TimeDelta {
    TimeDelta::try_days(i64::from(days)).unwrap_or(TimeDelta::MAX)
}
