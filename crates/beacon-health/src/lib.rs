//! beacon-health: probing, classification, and incident correlation.
//!
//! # Architecture
//!
//! ```text
//! CheckExecutor::check_service(service)
//!   ├── HttpProbe::get(url) under a hard timeout → status code | transport error
//!   ├── classify(status, elapsed) → online | slow | down
//!   ├── MonitorStore::insert_check (one row per probe, failures logged)
//!   └── IncidentCorrelator::evaluate(service, status)
//!       ├── down + no open incident + 2 of last 3 down → open (severity high)
//!       └── not down + open incident → resolve
//! ```
//!
//! Every failure past the probe itself is logged and absorbed; a single
//! service can never take down the caller.

pub mod classifier;
pub mod correlator;
pub mod executor;
pub mod probe;

pub use classifier::classify;
pub use correlator::{IncidentCorrelator, Transition};
pub use executor::{CheckExecutor, CheckOutcome};
pub use probe::{HttpProbe, HyperProbe, ProbeError};
