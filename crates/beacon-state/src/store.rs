//! StateStore: redb-backed state persistence for Beacon.
//!
//! Provides typed operations over services, checks, and incidents. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).
//!
//! redb runs one write transaction at a time, so every read-then-write
//! sequence inside a single `begin_write` (id allocation, the open-incident
//! uniqueness check) is atomic with respect to concurrent writers.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::contract::MonitorStore;
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const SERVICE_SEQUENCE: &str = "services";
const CHECK_SEQUENCE: &str = "checks";
const INCIDENT_SEQUENCE: &str = "incidents";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Replace the clock used to stamp checks and incidents.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The clock this store stamps records with.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(CHECKS).map_err(map_err!(Table))?;
        txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Services ───────────────────────────────────────────────────

    /// Register a service. If a service with the same URL already exists it
    /// is returned unchanged.
    pub fn register_service(&self, new: &NewService) -> StateResult<Service> {
        let name = new.name.trim();
        let url = new.url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(StateError::Invalid(
                "service name and url are required".to_string(),
            ));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existing = {
            let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            find_service(&table, url)?
        };
        if let Some(service) = existing {
            debug!(service_id = service.id, %url, "service already registered");
            return Ok(service);
        }

        let service = Service {
            id: next_id(&txn, SERVICE_SEQUENCE)?,
            name: name.to_string(),
            url: url.to_string(),
            description: new.description.clone(),
            created_at: self.clock.now(),
        };
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            table
                .insert(service.id, encode(&service)?.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service_id = service.id, %url, "service registered");
        Ok(service)
    }

    /// Get a service by id.
    pub fn get_service(&self, service_id: ServiceId) -> StateResult<Option<Service>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        read_record(&table, service_id)
    }

    // ── Incidents ──────────────────────────────────────────────────

    /// Get an incident by id.
    pub fn get_incident(&self, incident_id: IncidentId) -> StateResult<Option<Incident>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        read_record(&table, incident_id)
    }

    /// List incidents matching a filter, newest first.
    pub fn list_incidents(&self, filter: &IncidentFilter) -> StateResult<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .all_incidents()?
            .into_iter()
            .filter(|incident| filter.matches(incident))
            .collect();
        incidents.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(incidents
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    /// Apply a manual edit to an incident.
    ///
    /// Setting the status to resolved without a `resolved_at` stamps the
    /// current time. A `resolved_at` is refused unless the incident ends up
    /// resolved. Re-opening clears it and is refused when the service already
    /// has a different open incident.
    pub fn update_incident(
        &self,
        incident_id: IncidentId,
        update: &IncidentUpdate,
    ) -> StateResult<Incident> {
        if update.is_empty() {
            return Err(StateError::Invalid("no fields to update".to_string()));
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StateError::Invalid("incident title is required".to_string()));
        }

        let now = self.clock.now();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut incident = {
            let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            read_record::<Incident>(&table, incident_id)?
                .ok_or_else(|| StateError::NotFound(format!("incident {incident_id}")))?
        };
        if update.resolved_at.is_some()
            && update.status.unwrap_or(incident.status) == IncidentStatus::Open
        {
            return Err(StateError::Invalid(
                "resolved_at requires a resolved incident".to_string(),
            ));
        }

        if let Some(title) = &update.title {
            incident.title = title.trim().to_string();
        }
        if let Some(description) = &update.description {
            incident.description = description.clone();
        }
        if let Some(severity) = update.severity {
            incident.severity = severity;
        }

        {
            let mut index = txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
            match (incident.status, update.status) {
                (IncidentStatus::Open, Some(IncidentStatus::Resolved)) => {
                    incident.status = IncidentStatus::Resolved;
                    incident.resolved_at = Some(update.resolved_at.unwrap_or(now));
                    clear_open_index(&mut index, &incident)?;
                }
                (IncidentStatus::Resolved, Some(IncidentStatus::Open)) => {
                    let current = index
                        .get(incident.service_id)
                        .map_err(map_err!(Read))?
                        .map(|guard| guard.value());
                    if let Some(other) = current.filter(|other| *other != incident.id) {
                        return Err(StateError::OpenIncidentExists {
                            service_id: incident.service_id,
                            incident_id: other,
                        });
                    }
                    incident.status = IncidentStatus::Open;
                    incident.resolved_at = None;
                    index
                        .insert(incident.service_id, incident.id)
                        .map_err(map_err!(Write))?;
                }
                _ => {
                    if update.resolved_at.is_some() {
                        incident.resolved_at = update.resolved_at;
                    }
                }
            }
        }

        incident.updated_at = now;
        {
            let mut table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            table
                .insert(incident.id, encode(&incident)?.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(incident_id, status = %incident.status, "incident updated");
        Ok(incident)
    }

    /// Delete an incident. Returns true if it existed.
    pub fn delete_incident(&self, incident_id: IncidentId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed: Option<Incident> = {
            let mut table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            let guard = table.remove(incident_id).map_err(map_err!(Write))?;
            match guard {
                Some(value) => Some(decode(value.value())?),
                None => None,
            }
        };
        if let Some(incident) = &removed {
            let mut index = txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
            clear_open_index(&mut index, incident)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(incident_id, existed = removed.is_some(), "incident deleted");
        Ok(removed.is_some())
    }

    fn all_incidents(&self) -> StateResult<Vec<Incident>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Ensure a service row exists inside a write transaction.
    fn require_service(txn: &WriteTransaction, service_id: ServiceId) -> StateResult<()> {
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let exists = table.get(service_id).map_err(map_err!(Read))?.is_some();
        if exists {
            Ok(())
        } else {
            Err(StateError::NotFound(format!("service {service_id}")))
        }
    }

    /// Collect checks for a service whose keys fall in `[start, prefix end)`,
    /// newest first.
    fn scan_checks(
        &self,
        service_id: ServiceId,
        start: &str,
        limit: usize,
    ) -> StateResult<Vec<Check>> {
        // ';' sorts right after ':', closing the `{service_id}:` prefix.
        let end = format!("{service_id:010};");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(start..end.as_str()).map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }
}

impl MonitorStore for StateStore {
    fn list_services(&self) -> StateResult<Vec<Service>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    fn find_service_by_url(&self, url: &str) -> StateResult<Option<Service>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        find_service(&table, url.trim())
    }

    fn insert_check(&self, new: NewCheck) -> StateResult<Check> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        Self::require_service(&txn, new.service_id)?;

        let check = Check {
            id: next_id(&txn, CHECK_SEQUENCE)?,
            service_id: new.service_id,
            status: new.status,
            response_time_ms: new.response_time_ms,
            error_message: new.error_message,
            checked_at: self.clock.now(),
        };
        {
            let key = check.table_key();
            let mut table = txn.open_table(CHECKS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), encode(&check)?.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            service_id = check.service_id,
            check_id = check.id,
            status = %check.status,
            "check recorded"
        );
        Ok(check)
    }

    fn recent_checks(&self, service_id: ServiceId, limit: usize) -> StateResult<Vec<Check>> {
        let start = check_prefix(service_id);
        self.scan_checks(service_id, &start, limit)
    }

    fn checks_in_window(
        &self,
        service_id: ServiceId,
        since: DateTime<Utc>,
    ) -> StateResult<Vec<Check>> {
        let start = check_key(service_id, since, 0);
        self.scan_checks(service_id, &start, usize::MAX)
    }

    fn open_incident(&self, service_id: ServiceId) -> StateResult<Option<Incident>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
        let incident_id = match index.get(service_id).map_err(map_err!(Read))? {
            Some(guard) => guard.value(),
            None => return Ok(None),
        };
        let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
        read_record(&table, incident_id)
    }

    fn insert_incident(&self, new: NewIncident) -> StateResult<Incident> {
        if new.title.trim().is_empty() {
            return Err(StateError::Invalid("incident title is required".to_string()));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        Self::require_service(&txn, new.service_id)?;
        {
            let index = txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
            if let Some(guard) = index.get(new.service_id).map_err(map_err!(Read))? {
                return Err(StateError::OpenIncidentExists {
                    service_id: new.service_id,
                    incident_id: guard.value(),
                });
            }
        }

        let now = self.clock.now();
        let incident = Incident {
            id: next_id(&txn, INCIDENT_SEQUENCE)?,
            service_id: new.service_id,
            title: new.title.trim().to_string(),
            description: new.description,
            severity: new.severity,
            status: IncidentStatus::Open,
            started_at: now,
            resolved_at: None,
            created_by: new.created_by,
            updated_at: now,
        };
        {
            let mut table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            table
                .insert(incident.id, encode(&incident)?.as_slice())
                .map_err(map_err!(Write))?;
            let mut index = txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
            index
                .insert(incident.service_id, incident.id)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            incident_id = incident.id,
            service_id = incident.service_id,
            "incident stored"
        );
        Ok(incident)
    }

    fn resolve_incident(&self, incident_id: IncidentId) -> StateResult<Incident> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut incident = {
            let table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            read_record::<Incident>(&table, incident_id)?
                .ok_or_else(|| StateError::NotFound(format!("incident {incident_id}")))?
        };
        if !incident.is_open() {
            // Nothing to write; dropping the transaction aborts it.
            return Ok(incident);
        }

        let now = self.clock.now();
        incident.status = IncidentStatus::Resolved;
        incident.resolved_at = Some(now);
        incident.updated_at = now;
        {
            let mut table = txn.open_table(INCIDENTS).map_err(map_err!(Table))?;
            table
                .insert(incident.id, encode(&incident)?.as_slice())
                .map_err(map_err!(Write))?;
            let mut index = txn.open_table(OPEN_INCIDENTS).map_err(map_err!(Table))?;
            clear_open_index(&mut index, &incident)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(incident_id, service_id = incident.service_id, "incident resolved");
        Ok(incident)
    }

    fn incidents_since(&self, since: DateTime<Utc>) -> StateResult<Vec<Incident>> {
        Ok(self
            .all_incidents()?
            .into_iter()
            .filter(|incident| incident.started_at >= since)
            .collect())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Read one JSON record from a table keyed by numeric id.
fn read_record<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> StateResult<Option<T>> {
    match table.get(id).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn find_service(
    table: &impl ReadableTable<u64, &'static [u8]>,
    url: &str,
) -> StateResult<Option<Service>> {
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let service: Service = decode(value.value())?;
        if service.url == url {
            return Ok(Some(service));
        }
    }
    Ok(None)
}

/// Allocate the next id of a sequence inside a write transaction.
fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let last = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    table.insert(sequence, last + 1).map_err(map_err!(Write))?;
    Ok(last + 1)
}

/// Drop the open-index entry for a service if it points at this incident.
fn clear_open_index(
    index: &mut redb::Table<'_, u64, u64>,
    incident: &Incident,
) -> StateResult<()> {
    let current = index
        .get(incident.service_id)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value());
    if current == Some(incident.id) {
        index
            .remove(incident.service_id)
            .map_err(map_err!(Write))?;
    }
    Ok(())
}
