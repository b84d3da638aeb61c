//! Check executor: one timed probe per call, recorded and correlated.
//!
//! The executor holds no mutable state of its own, so a single instance is
//! shared by every concurrent probe of a tick and by manual checks.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use beacon_state::*;

use crate::classifier::classify;
use crate::correlator::{IncidentCorrelator, Transition};
use crate::probe::HttpProbe;

/// Hard limit on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// In-memory result of one probe, returned whether or not it was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub service_id: ServiceId,
    pub status: CheckStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    /// False when the check row could not be written.
    pub recorded: bool,
}

pub struct CheckExecutor {
    store: Arc<dyn MonitorStore>,
    probe: Arc<dyn HttpProbe>,
    correlator: IncidentCorrelator,
    timeout: Duration,
}

impl CheckExecutor {
    pub fn new(store: Arc<dyn MonitorStore>, probe: Arc<dyn HttpProbe>) -> Self {
        Self {
            correlator: IncidentCorrelator::new(Arc::clone(&store)),
            store,
            probe,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe a service, persist the observation, and run the correlator.
    ///
    /// Never fails: transport problems become a `down` outcome, storage and
    /// correlator problems are logged.
    pub async fn check_service(&self, service: &Service) -> CheckOutcome {
        let started = Instant::now();
        let probe = tokio::time::timeout(self.timeout, self.probe.get(&service.url)).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (http_status, error_message) = match probe {
            Ok(Ok(code)) => (Some(code), (code >= 400).then(|| format!("HTTP {code}"))),
            Ok(Err(e)) => {
                warn!(
                    service_id = service.id,
                    url = %service.url,
                    error = %e,
                    response_time_ms = elapsed_ms,
                    "service check failed"
                );
                (None, Some(e.to_string()))
            }
            Err(_) => {
                let reason = format!("timeout of {}ms exceeded", self.timeout.as_millis());
                warn!(
                    service_id = service.id,
                    url = %service.url,
                    response_time_ms = elapsed_ms,
                    "service check timed out"
                );
                (None, Some(reason))
            }
        };

        let status = classify(http_status, elapsed_ms);
        let mut outcome = CheckOutcome {
            service_id: service.id,
            status,
            response_time_ms: Some(elapsed_ms),
            error_message,
            recorded: false,
        };

        let record = NewCheck {
            service_id: service.id,
            status,
            response_time_ms: outcome.response_time_ms,
            error_message: outcome.error_message.clone(),
        };
        match self.store.insert_check(record) {
            Ok(check) => {
                outcome.recorded = true;
                debug!(
                    service_id = service.id,
                    check_id = check.id,
                    %status,
                    response_time_ms = elapsed_ms,
                    "check recorded"
                );
                self.correlate(service, status);
            }
            Err(e) => {
                error!(
                    service_id = service.id,
                    name = %service.name,
                    error = %e,
                    "failed to save check result"
                );
            }
        }

        outcome
    }

    fn correlate(&self, service: &Service, status: CheckStatus) {
        match self.correlator.evaluate(service, status) {
            Ok(Transition::Unchanged) => {}
            Ok(transition) => debug!(service_id = service.id, ?transition, "incident state changed"),
            Err(e) => error!(
                service_id = service.id,
                name = %service.name,
                error = %e,
                "incident correlation failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    /// Answers every GET with a fixed result after a fixed delay.
    struct FixedProbe {
        delay: Duration,
        result: Result<u16, &'static str>,
    }

    #[async_trait]
    impl HttpProbe for FixedProbe {
        async fn get(&self, _url: &str) -> Result<u16, ProbeError> {
            tokio::time::sleep(self.delay).await;
            self.result
                .map_err(|reason| ProbeError::Transport(reason.to_string()))
        }
    }

    fn probe(delay_ms: u64, result: Result<u16, &'static str>) -> Arc<dyn HttpProbe> {
        Arc::new(FixedProbe {
            delay: Duration::from_millis(delay_ms),
            result,
        })
    }

    /// Delegates reads to a real store but refuses check writes.
    struct ReadOnlyStore(StateStore);

    impl MonitorStore for ReadOnlyStore {
        fn list_services(&self) -> StateResult<Vec<Service>> {
            self.0.list_services()
        }
        fn find_service_by_url(&self, url: &str) -> StateResult<Option<Service>> {
            self.0.find_service_by_url(url)
        }
        fn insert_check(&self, _check: NewCheck) -> StateResult<Check> {
            Err(StateError::Write("disk full".to_string()))
        }
        fn recent_checks(&self, service_id: ServiceId, limit: usize) -> StateResult<Vec<Check>> {
            self.0.recent_checks(service_id, limit)
        }
        fn checks_in_window(
            &self,
            service_id: ServiceId,
            since: DateTime<Utc>,
        ) -> StateResult<Vec<Check>> {
            self.0.checks_in_window(service_id, since)
        }
        fn open_incident(&self, service_id: ServiceId) -> StateResult<Option<Incident>> {
            self.0.open_incident(service_id)
        }
        fn insert_incident(&self, incident: NewIncident) -> StateResult<Incident> {
            self.0.insert_incident(incident)
        }
        fn resolve_incident(&self, incident_id: IncidentId) -> StateResult<Incident> {
            self.0.resolve_incident(incident_id)
        }
        fn incidents_since(&self, since: DateTime<Utc>) -> StateResult<Vec<Incident>> {
            self.0.incidents_since(since)
        }
    }

    fn test_store() -> (StateStore, Service) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
        ));
        let store = StateStore::open_in_memory().unwrap().with_clock(clock);
        let service = store
            .register_service(&NewService {
                name: "E-Learning".to_string(),
                url: "https://cyber.example.edu".to_string(),
                description: None,
            })
            .unwrap();
        (store, service)
    }

    #[tokio::test(start_paused = true)]
    async fn fast_ok_is_online_and_recorded() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(Arc::new(store.clone()), probe(200, Ok(200)));

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Online);
        assert_eq!(outcome.response_time_ms, Some(200));
        assert_eq!(outcome.error_message, None);
        assert!(outcome.recorded);

        let checks = store.recent_checks(service.id, 10).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].status, CheckStatus::Online);
        assert_eq!(checks[0].response_time_ms, Some(200));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_is_slow() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(Arc::new(store), probe(5_000, Ok(200)));

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Slow);
        assert_eq!(outcome.response_time_ms, Some(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn http_error_sets_message() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(Arc::new(store.clone()), probe(50, Ok(503)));

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.error_message.as_deref(), Some("HTTP 503"));

        let executor = CheckExecutor::new(Arc::new(store), probe(50, Ok(404)));
        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Slow);
        assert_eq!(outcome.error_message.as_deref(), Some("HTTP 404"));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_down_with_reason() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(
            Arc::new(store.clone()),
            probe(5, Err("connection refused")),
        );

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.error_message.as_deref(), Some("connection refused"));
        assert!(outcome.recorded);
        let checks = store.recent_checks(service.id, 1).unwrap();
        assert_eq!(checks[0].error_message.as_deref(), Some("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_is_abandoned_at_timeout() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(Arc::new(store), probe(60_000, Ok(200)));

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, Some(10_000));
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("timeout of 10000ms exceeded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timeout_is_honoured() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(Arc::new(store), probe(3_000, Ok(200)))
            .with_timeout(Duration::from_secs(2));

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert_eq!(outcome.response_time_ms, Some(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_still_returns_outcome() {
        let (store, service) = test_store();
        let executor = CheckExecutor::new(
            Arc::new(ReadOnlyStore(store.clone())),
            probe(10, Err("dns failure")),
        );

        let outcome = executor.check_service(&service).await;
        assert_eq!(outcome.status, CheckStatus::Down);
        assert!(!outcome.recorded);
        assert!(store.recent_checks(service.id, 10).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_open_incident_then_recovery_resolves() {
        let (store, service) = test_store();
        let down = CheckExecutor::new(Arc::new(store.clone()), probe(10, Ok(500)));
        let up = CheckExecutor::new(Arc::new(store.clone()), probe(10, Ok(200)));

        down.check_service(&service).await;
        assert!(store.open_incident(service.id).unwrap().is_none());
        down.check_service(&service).await;
        let incident = store.open_incident(service.id).unwrap().unwrap();
        assert_eq!(incident.severity, Severity::High);

        up.check_service(&service).await;
        assert!(store.open_incident(service.id).unwrap().is_none());
        let resolved = store.get_incident(incident.id).unwrap().unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
    }
}
