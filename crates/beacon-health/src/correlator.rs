//! Incident correlator: opens and resolves incidents from check history.
//!
//! Per service the state is either "no open incident" or "open":
//!
//! - open: the latest check is `down`, nothing is open yet, and at least
//!   [`DEBOUNCE_THRESHOLD`] of the last [`DEBOUNCE_WINDOW`] checks
//!   (including the latest) are `down`
//! - resolve: the latest check is not `down` and an incident is open
//!
//! Opening is debounced, resolving is not: one healthy observation closes
//! the incident.

use std::sync::Arc;

use tracing::{debug, info};

use beacon_state::*;

/// How many recent checks the open rule looks at.
pub const DEBOUNCE_WINDOW: usize = 3;

/// How many of those must be `down` to open an incident.
pub const DEBOUNCE_THRESHOLD: usize = 2;

/// Result of evaluating one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Opened(Incident),
    Resolved(Incident),
    Unchanged,
}

#[derive(Clone)]
pub struct IncidentCorrelator {
    store: Arc<dyn MonitorStore>,
}

impl IncidentCorrelator {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self { store }
    }

    /// Evaluate a service after a check with `status` has been recorded.
    pub fn evaluate(&self, service: &Service, status: CheckStatus) -> StateResult<Transition> {
        if status.is_down() {
            self.maybe_open(service)
        } else {
            self.maybe_resolve(service)
        }
    }

    fn maybe_open(&self, service: &Service) -> StateResult<Transition> {
        if let Some(existing) = self.store.open_incident(service.id)? {
            debug!(
                service_id = service.id,
                incident_id = existing.id,
                "incident already open"
            );
            return Ok(Transition::Unchanged);
        }

        let recent: Vec<CheckStatus> = self
            .store
            .recent_checks(service.id, DEBOUNCE_WINDOW)?
            .into_iter()
            .map(|check| check.status)
            .collect();
        let down = down_count(&recent);
        if down < DEBOUNCE_THRESHOLD {
            debug!(
                service_id = service.id,
                down,
                window = recent.len(),
                "below incident threshold"
            );
            return Ok(Transition::Unchanged);
        }

        let new = NewIncident {
            service_id: service.id,
            title: format!("{} Service Outage", service.name),
            description: format!(
                "Automatic incident created after {down} of the last {} checks found {} unavailable.",
                recent.len(),
                service.url
            ),
            severity: Severity::High,
            created_by: SYSTEM_ACTOR.to_string(),
        };
        match self.store.insert_incident(new) {
            Ok(incident) => {
                info!(
                    service_id = service.id,
                    incident_id = incident.id,
                    name = %service.name,
                    "incident opened"
                );
                Ok(Transition::Opened(incident))
            }
            // A concurrent evaluation opened it first.
            Err(StateError::OpenIncidentExists { incident_id, .. }) => {
                debug!(service_id = service.id, incident_id, "incident opened concurrently");
                Ok(Transition::Unchanged)
            }
            Err(e) => Err(e),
        }
    }

    fn maybe_resolve(&self, service: &Service) -> StateResult<Transition> {
        let Some(open) = self.store.open_incident(service.id)? else {
            return Ok(Transition::Unchanged);
        };

        let resolved = self.store.resolve_incident(open.id)?;
        info!(
            service_id = service.id,
            incident_id = resolved.id,
            name = %service.name,
            "incident resolved"
        );
        Ok(Transition::Resolved(resolved))
    }
}

fn down_count(statuses: &[CheckStatus]) -> usize {
    statuses.iter().filter(|s| s.is_down()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    struct Fixture {
        store: StateStore,
        clock: Arc<ManualClock>,
        correlator: IncidentCorrelator,
        service: Service,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = StateStore::open_in_memory()
            .unwrap()
            .with_clock(clock.clone());
        let service = store
            .register_service(&NewService {
                name: "SSO Login".to_string(),
                url: "https://sso.example.edu".to_string(),
                description: None,
            })
            .unwrap();
        let correlator = IncidentCorrelator::new(Arc::new(store.clone()));
        Fixture {
            store,
            clock,
            correlator,
            service,
        }
    }

    impl Fixture {
        /// Record a check and evaluate it, as the executor does.
        fn observe(&self, status: CheckStatus) -> Transition {
            self.store
                .insert_check(NewCheck {
                    service_id: self.service.id,
                    status,
                    response_time_ms: Some(100),
                    error_message: None,
                })
                .unwrap();
            self.clock.advance(TimeDelta::seconds(30));
            self.correlator.evaluate(&self.service, status).unwrap()
        }

        fn incidents(&self) -> Vec<Incident> {
            self.store.list_incidents(&IncidentFilter::default()).unwrap()
        }
    }

    use CheckStatus::{Down, Online, Slow};

    #[test]
    fn single_down_does_not_open() {
        let f = fixture();
        assert_eq!(f.observe(Down), Transition::Unchanged);
        assert!(f.incidents().is_empty());
    }

    #[test]
    fn three_downs_open_exactly_one_high_incident() {
        let f = fixture();
        f.observe(Down);
        let opened = f.observe(Down);
        let third = f.observe(Down);

        let Transition::Opened(incident) = opened else {
            panic!("expected incident on second down, got {opened:?}");
        };
        assert_eq!(incident.severity, Severity::High);
        assert_eq!(incident.created_by, SYSTEM_ACTOR);
        assert_eq!(incident.title, "SSO Login Service Outage");
        assert_eq!(third, Transition::Unchanged);
        assert_eq!(f.incidents().len(), 1);
    }

    #[test]
    fn online_then_two_downs_opens() {
        let f = fixture();
        f.observe(Online);
        f.observe(Down);
        assert!(matches!(f.observe(Down), Transition::Opened(_)));
    }

    #[test]
    fn down_online_down_opens_two_of_three() {
        let f = fixture();
        f.observe(Down);
        f.observe(Online);
        assert!(matches!(f.observe(Down), Transition::Opened(_)));
    }

    #[test]
    fn only_latest_of_three_down_does_not_open() {
        let f = fixture();
        f.observe(Down);
        f.observe(Online);
        f.observe(Slow);
        // Window is now [Down(new), Slow, Online]; the old Down fell out.
        assert_eq!(f.observe(Down), Transition::Unchanged);
        assert!(f.incidents().is_empty());
    }

    #[test]
    fn non_down_resolves_once() {
        let f = fixture();
        f.observe(Down);
        f.observe(Down);

        let resolved = f.observe(Slow);
        let Transition::Resolved(incident) = resolved else {
            panic!("expected resolution, got {resolved:?}");
        };
        assert_eq!(incident.status, IncidentStatus::Resolved);
        assert!(incident.resolved_at.is_some());

        // A second healthy check leaves the resolved incident alone.
        let before = f.incidents();
        assert_eq!(f.observe(Online), Transition::Unchanged);
        assert_eq!(f.incidents(), before);
    }

    #[test]
    fn healthy_without_incident_is_noop() {
        let f = fixture();
        assert_eq!(f.observe(Online), Transition::Unchanged);
        assert_eq!(f.observe(Slow), Transition::Unchanged);
        assert!(f.incidents().is_empty());
    }

    #[test]
    fn manual_incident_blocks_auto_open_and_is_auto_resolved() {
        let f = fixture();
        f.store
            .insert_incident(NewIncident {
                service_id: f.service.id,
                title: "Planned maintenance".to_string(),
                description: String::new(),
                severity: Severity::Low,
                created_by: "operator".to_string(),
            })
            .unwrap();

        f.observe(Down);
        assert_eq!(f.observe(Down), Transition::Unchanged);
        assert_eq!(f.incidents().len(), 1);

        assert!(matches!(f.observe(Online), Transition::Resolved(_)));
    }

    #[test]
    fn flap_after_recovery_reopens_on_next_down() {
        let f = fixture();
        f.observe(Down);
        f.observe(Down);
        f.observe(Online);
        // [Down, Online, Down] still has two downs in the window.
        assert!(matches!(f.observe(Down), Transition::Opened(_)));
        assert_eq!(f.observe(Down), Transition::Unchanged);

        let incidents = f.incidents();
        assert_eq!(incidents.len(), 2);
        assert_eq!(incidents.iter().filter(|i| i.is_open()).count(), 1);
    }

    #[test]
    fn down_count_counts_only_down() {
        assert_eq!(down_count(&[Down, Slow, Down]), 2);
        assert_eq!(down_count(&[Online, Slow]), 0);
        assert_eq!(down_count(&[]), 0);
    }
}
