//! redb table definitions for the Beacon state store.
//!
//! Record tables use JSON-serialized `&[u8]` values. Numeric ids are stored
//! as `u64` keys so iteration order matches allocation order.

use redb::TableDefinition;

/// Registered services keyed by service id.
pub const SERVICES: TableDefinition<u64, &[u8]> = TableDefinition::new("services");

/// Check ledger keyed by `{service_id:010}:{checked_at_millis:015}:{check_id:012}`.
pub const CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("checks");

/// Incidents keyed by incident id.
pub const INCIDENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("incidents");

/// Open incident index: service id → incident id. At most one entry per service.
pub const OPEN_INCIDENTS: TableDefinition<u64, u64> = TableDefinition::new("open_incidents");

/// Last allocated id per record kind.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
