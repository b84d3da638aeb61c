//! beacon-state: embedded state store for Beacon.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for the service registry, the append-only check ledger, and
//! incident records.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Check keys are `{service_id}:{checked_at_millis}:{check_id}` (zero-padded)
//! so a per-service range scan walks the ledger in chronological order.
//! The `OPEN_INCIDENTS` index maps a service to its single open incident and
//! is consulted inside the same write transaction that inserts an incident,
//! which is what guarantees at most one open incident per service.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Callers that only need the data
//! access contract depend on the [`MonitorStore`] trait instead.

pub mod clock;
pub mod contract;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use contract::MonitorStore;
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
