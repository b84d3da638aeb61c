//! Uptime and latency arithmetic over a slice of checks.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use beacon_state::Check;

/// Uptime for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUptime {
    pub date: NaiveDate,
    pub total_checks: usize,
    pub successful_checks: usize,
    pub uptime_percent: f64,
    pub average_response_time_ms: Option<f64>,
}

/// Share of checks that were not `down`, in percent, rounded to two
/// decimals. An empty slice reports `0.0`.
pub fn uptime_percent(checks: &[Check]) -> f64 {
    percent(successful(checks.iter()), checks.len())
}

/// Mean response time over checks that carry one, or `None` when no check
/// does.
pub fn average_response_time(checks: &[Check]) -> Option<f64> {
    mean_latency(checks.iter())
}

/// Bucket checks by the UTC date of `checked_at`, newest day first.
pub fn daily_uptime(checks: &[Check]) -> Vec<DailyUptime> {
    let mut days: BTreeMap<NaiveDate, Vec<&Check>> = BTreeMap::new();
    for check in checks {
        days.entry(check.checked_at.date_naive())
            .or_default()
            .push(check);
    }

    days.into_iter()
        .rev()
        .map(|(date, day)| {
            let successful_checks = successful(day.iter().copied());
            DailyUptime {
                date,
                total_checks: day.len(),
                successful_checks,
                uptime_percent: percent(successful_checks, day.len()),
                average_response_time_ms: mean_latency(day.iter().copied()),
            }
        })
        .collect()
}

pub(crate) fn successful<'a>(checks: impl Iterator<Item = &'a Check>) -> usize {
    checks.filter(|c| !c.status.is_down()).count()
}

pub(crate) fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / total as f64)
}

fn mean_latency<'a>(checks: impl Iterator<Item = &'a Check>) -> Option<f64> {
    let (sum, count) = checks
        .filter_map(|c| c.response_time_ms)
        .fold((0u128, 0u64), |(sum, count), ms| (sum + u128::from(ms), count + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_state::CheckStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn check(status: CheckStatus, response_time_ms: Option<u64>, at: DateTime<Utc>) -> Check {
        Check {
            id: 0,
            service_id: 1,
            status,
            response_time_ms,
            error_message: None,
            checked_at: at,
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    use CheckStatus::{Down, Online, Slow};

    #[test]
    fn three_of_four_is_seventy_five() {
        let checks = [
            check(Online, Some(100), noon(1)),
            check(Slow, Some(4_000), noon(1)),
            check(Down, None, noon(1)),
            check(Online, Some(200), noon(1)),
        ];
        assert_eq!(uptime_percent(&checks), 75.0);
    }

    #[test]
    fn empty_uptime_is_zero() {
        assert_eq!(uptime_percent(&[]), 0.0);
    }

    #[test]
    fn uptime_rounds_to_two_decimals() {
        let checks = [
            check(Online, Some(1), noon(1)),
            check(Online, Some(1), noon(1)),
            check(Down, None, noon(1)),
        ];
        assert_eq!(uptime_percent(&checks), 66.67);
    }

    #[test]
    fn average_ignores_missing_latency() {
        let checks = [
            check(Online, Some(100), noon(1)),
            check(Down, None, noon(1)),
            check(Slow, Some(400), noon(1)),
        ];
        assert_eq!(average_response_time(&checks), Some(250.0));
    }

    #[test]
    fn average_without_data_is_none() {
        assert_eq!(average_response_time(&[]), None);
        assert_eq!(average_response_time(&[check(Down, None, noon(1))]), None);
    }

    #[test]
    fn daily_buckets_newest_first() {
        let checks = [
            check(Online, Some(100), noon(3)),
            check(Down, None, noon(3)),
            check(Online, Some(300), noon(1)),
            check(Online, Some(100), noon(1)),
        ];
        let days = daily_uptime(&checks);
        assert_eq!(days.len(), 2);

        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(days[0].total_checks, 2);
        assert_eq!(days[0].successful_checks, 1);
        assert_eq!(days[0].uptime_percent, 50.0);
        assert_eq!(days[0].average_response_time_ms, Some(100.0));

        assert_eq!(days[1].date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(days[1].uptime_percent, 100.0);
        assert_eq!(days[1].average_response_time_ms, Some(200.0));
    }

    #[test]
    fn day_boundary_is_utc_midnight() {
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let days = daily_uptime(&[check(Online, None, late), check(Down, None, early)]);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].uptime_percent, 0.0);
        assert_eq!(days[1].uptime_percent, 100.0);
    }
}
