//! Scheduler: drives the check executor over the service registry.
//!
//! A tick loads the registry and probes every service concurrently. One
//! tick fires immediately at start, then one per interval. Whether a tick
//! may start while the previous one is still running is governed by
//! [`TickPolicy`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use beacon_core::{MonitorSettings, TickPolicy};
use beacon_health::{CheckExecutor, CheckOutcome};
use beacon_state::*;

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub tick_policy: TickPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            tick_policy: TickPolicy::Overlap,
        }
    }
}

impl From<&MonitorSettings> for SchedulerConfig {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval(),
            tick_policy: settings.tick_policy,
        }
    }
}

/// Everything one tick observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// Services in the registry when the tick started.
    pub services: usize,
    /// One outcome per probe that ran to completion.
    pub outcomes: Vec<CheckOutcome>,
    /// Probe tasks that panicked or were cancelled.
    pub failed: usize,
}

impl TickReport {
    pub fn count(&self, status: CheckStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

pub struct Scheduler {
    store: Arc<dyn MonitorStore>,
    executor: Arc<CheckExecutor>,
    config: SchedulerConfig,
    running: AtomicBool,
    ticks_started: AtomicU64,
    ticks_skipped: AtomicU64,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        executor: Arc<CheckExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
            running: AtomicBool::new(false),
            ticks_started: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ticks launched by the timer loop.
    pub fn ticks_started(&self) -> u64 {
        self.ticks_started.load(Ordering::Relaxed)
    }

    /// Ticks dropped by [`TickPolicy::SkipIfBusy`].
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::Relaxed)
    }

    /// Start the timer loop on the current runtime.
    ///
    /// The loop exits once `shutdown` carries `true` (or its sender is
    /// dropped), after every in-flight tick has finished.
    pub fn start(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> SchedulerResult<JoinHandle<()>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            // Clears the flag even if the task is aborted or the loop panics.
            let _running = RunningGuard(Arc::clone(&this));
            this.run_loop(shutdown).await;
        }))
    }

    async fn run_loop(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.tick_interval.as_millis() as u64,
            policy = ?self.config.tick_policy,
            "scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: JoinSet<TickReport> = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => self.launch_tick(&mut ticks),
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => log_tick(joined),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(in_flight = ticks.len(), "scheduler shutting down");
        while let Some(joined) = ticks.join_next().await {
            log_tick(joined);
        }
        info!("scheduler stopped");
    }

    fn launch_tick(self: &Arc<Self>, ticks: &mut JoinSet<TickReport>) {
        while let Some(joined) = ticks.try_join_next() {
            log_tick(joined);
        }
        if self.config.tick_policy == TickPolicy::SkipIfBusy && !ticks.is_empty() {
            let skipped = self.ticks_skipped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(skipped, "previous tick still running, skipping");
            return;
        }

        let tick = self.ticks_started.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(tick, in_flight = ticks.len(), "tick started");
        let this = Arc::clone(self);
        ticks.spawn(async move { this.run_tick().await });
    }

    /// Probe every registered service concurrently and wait for all of them.
    ///
    /// A registry read failure yields an empty report. Manual calls are not
    /// subject to the tick policy.
    pub async fn run_tick(&self) -> TickReport {
        let services = match self.store.list_services() {
            Ok(services) => services,
            Err(e) => {
                error!(error = %e, "failed to load service registry, skipping tick");
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            services: services.len(),
            outcomes: Vec::with_capacity(services.len()),
            failed: 0,
        };

        let mut probes = JoinSet::new();
        for service in services {
            let executor = Arc::clone(&self.executor);
            probes.spawn(async move { executor.check_service(&service).await });
        }

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "service check task failed");
                }
            }
        }

        report
    }

    /// Manual check of one service through the same path as scheduled ticks.
    pub async fn check_one(&self, service: &Service) -> CheckOutcome {
        self.executor.check_service(service).await
    }

    /// Manual check of the registered service with this URL.
    pub async fn check_url(&self, url: &str) -> SchedulerResult<CheckOutcome> {
        let service = self
            .store
            .find_service_by_url(url)?
            .ok_or_else(|| SchedulerError::ServiceNotFound(url.to_string()))?;
        Ok(self.check_one(&service).await)
    }
}

struct RunningGuard(Arc<Scheduler>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

fn log_tick(joined: Result<TickReport, JoinError>) {
    match joined {
        Ok(report) => info!(
            services = report.services,
            online = report.count(CheckStatus::Online),
            slow = report.count(CheckStatus::Slow),
            down = report.count(CheckStatus::Down),
            failed = report.failed,
            "tick complete"
        ),
        Err(e) => error!(error = %e, "tick task failed"),
    }
}
