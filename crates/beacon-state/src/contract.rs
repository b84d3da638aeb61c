//! The data-access contract the monitoring engine is written against.
//!
//! `StateStore` is the production implementation; tests substitute fakes
//! (for example a store whose writes fail) to exercise failure isolation.

use chrono::{DateTime, Utc};

use crate::error::StateResult;
use crate::types::*;

/// Storage operations required by the executor, correlator, scheduler,
/// and aggregator. Implementations must tolerate concurrent callers.
pub trait MonitorStore: Send + Sync {
    /// All registered services, ordered by id.
    fn list_services(&self) -> StateResult<Vec<Service>>;

    /// Look a service up by its probe URL.
    fn find_service_by_url(&self, url: &str) -> StateResult<Option<Service>>;

    /// Append a check to the ledger, assigning its id and timestamp.
    fn insert_check(&self, check: NewCheck) -> StateResult<Check>;

    /// The `limit` most recent checks for a service, newest first.
    fn recent_checks(&self, service_id: ServiceId, limit: usize) -> StateResult<Vec<Check>>;

    /// All checks for a service at or after `since`, newest first.
    fn checks_in_window(
        &self,
        service_id: ServiceId,
        since: DateTime<Utc>,
    ) -> StateResult<Vec<Check>>;

    /// The open incident for a service, if any.
    fn open_incident(&self, service_id: ServiceId) -> StateResult<Option<Incident>>;

    /// Open a new incident.
    ///
    /// Fails with `StateError::OpenIncidentExists` if the service already has
    /// an open incident; the check and the insert are atomic.
    fn insert_incident(&self, incident: NewIncident) -> StateResult<Incident>;

    /// Mark an incident resolved as of now. Resolving an already-resolved
    /// incident returns it unchanged.
    fn resolve_incident(&self, incident_id: IncidentId) -> StateResult<Incident>;

    /// Incidents that started at or after `since`.
    fn incidents_since(&self, since: DateTime<Utc>) -> StateResult<Vec<Incident>>;
}
