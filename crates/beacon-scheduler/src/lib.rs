//! beacon-scheduler: periodic probing of every registered service.
//!
//! The scheduler:
//!
//! - Fires one tick immediately at start and then every `tick_interval`
//! - Fans each tick out to one `CheckExecutor` task per service and
//!   collects every result, panics included, before the tick completes
//! - Refuses a second concurrent `start`
//! - Runs manual "check now" requests through the same executor
//!
//! # Architecture
//!
//! ```text
//! Scheduler::start(shutdown)
//!   └── timer loop (interval, first tick immediate)
//!       ├── tick → JoinSet of check_service(service) per service
//!       ├── TickPolicy::Overlap    → ticks may run concurrently
//!       ├── TickPolicy::SkipIfBusy → tick skipped while one is in flight
//!       └── shutdown → drain in-flight ticks, clear running flag
//! ```

pub mod error;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{Scheduler, SchedulerConfig, TickReport};
