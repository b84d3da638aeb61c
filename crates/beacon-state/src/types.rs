//! Domain types for the Beacon state store.
//!
//! These types represent the service registry, the check ledger, and
//! incident records. Status fields are closed enums; every record is
//! serializable to/from JSON for storage in redb tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a registered service.
pub type ServiceId = u64;

/// Unique identifier for a check observation.
pub type CheckId = u64;

/// Unique identifier for an incident.
pub type IncidentId = u64;

/// `created_by` value used for incidents opened by the correlator.
pub const SYSTEM_ACTOR: &str = "system";

// ── Service ────────────────────────────────────────────────────────

/// A monitored, network-reachable service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    /// Probe target (http:// or https://).
    pub url: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration request for a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewService {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
}

// ── Check ──────────────────────────────────────────────────────────

/// Health verdict of a single probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Online,
    Slow,
    Down,
}

impl CheckStatus {
    pub fn is_down(self) -> bool {
        self == CheckStatus::Down
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Online => "online",
            CheckStatus::Slow => "slow",
            CheckStatus::Down => "down",
        }
    }
}

/// One immutable probe result. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Check {
    pub id: CheckId,
    pub service_id: ServiceId,
    pub status: CheckStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Check {
    /// Composite key for the checks table.
    pub fn table_key(&self) -> String {
        check_key(self.service_id, self.checked_at, self.id)
    }
}

/// A probe result to be appended to the ledger. The store assigns the id
/// and the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheck {
    pub service_id: ServiceId,
    pub status: CheckStatus,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
}

/// Zero-padded so that lexicographic order is chronological per service.
pub(crate) fn check_key(service_id: ServiceId, at: DateTime<Utc>, id: CheckId) -> String {
    format!(
        "{}{:015}:{id:012}",
        check_prefix(service_id),
        at.timestamp_millis().max(0)
    )
}

pub(crate) fn check_prefix(service_id: ServiceId) -> String {
    format!("{service_id:010}:")
}

// ── Incident ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

/// A sustained service disruption, opened automatically or by an operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: IncidentId,
    pub service_id: ServiceId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// `"system"` for correlator-created incidents.
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.status == IncidentStatus::Open
    }

    pub fn is_automatic(&self) -> bool {
        self.created_by == SYSTEM_ACTOR
    }
}

/// Request to open an incident. New incidents always start `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncident {
    pub service_id: ServiceId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub created_by: String,
}

/// Manual edit of an incident. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl IncidentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.status.is_none()
            && self.resolved_at.is_none()
    }
}

/// Listing filter for incidents, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub severity: Option<Severity>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for IncidentFilter {
    fn default() -> Self {
        Self {
            status: None,
            severity: None,
            limit: 50,
            offset: 0,
        }
    }
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.is_none_or(|s| s == incident.status)
            && self.severity.is_none_or(|s| s == incident.severity)
    }
}

// ── Text forms ─────────────────────────────────────────────────────

macro_rules! text_enum {
    ($ty:ident { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($ty), " '{}'"),
                        other
                    )),
                }
            }
        }
    };
}

text_enum!(CheckStatus { "online" => Online, "slow" => Slow, "down" => Down });
text_enum!(Severity { "low" => Low, "medium" => Medium, "high" => High });
text_enum!(IncidentStatus { "open" => Open, "resolved" => Resolved });

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn check_keys_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        // Later timestamp sorts after even with a smaller id.
        assert!(check_key(7, early, 99) < check_key(7, late, 1));
        // Keys of different services never interleave.
        assert!(check_key(7, late, 1) < check_key(8, early, 1));
        assert!(check_key(7, late, 1).starts_with(&check_prefix(7)));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CheckStatus::Slow).unwrap(), "\"slow\"");
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&IncidentStatus::Resolved).unwrap(),
            "\"resolved\""
        );
    }

    #[test]
    fn statuses_parse_from_text() {
        assert_eq!("Down".parse::<CheckStatus>(), Ok(CheckStatus::Down));
        assert_eq!(" high ".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("open".parse::<IncidentStatus>(), Ok(IncidentStatus::Open));
        assert!("degraded".parse::<CheckStatus>().is_err());
    }

    #[test]
    fn incident_filter_matches() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let incident = Incident {
            id: 1,
            service_id: 1,
            title: "Outage".to_string(),
            description: String::new(),
            severity: Severity::High,
            status: IncidentStatus::Open,
            started_at: now,
            resolved_at: None,
            created_by: SYSTEM_ACTOR.to_string(),
            updated_at: now,
        };

        assert!(IncidentFilter::default().matches(&incident));
        let resolved_only = IncidentFilter {
            status: Some(IncidentStatus::Resolved),
            ..Default::default()
        };
        assert!(!resolved_only.matches(&incident));
        let high_only = IncidentFilter {
            severity: Some(Severity::High),
            ..Default::default()
        };
        assert!(high_only.matches(&incident));
        assert!(incident.is_automatic());
    }
}
