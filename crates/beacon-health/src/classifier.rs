//! Status classification of a single probe.

use beacon_state::CheckStatus;

/// Responses slower than this are `slow`.
pub const SLOW_THRESHOLD_MS: u64 = 3_000;

/// Responses slower than this are `down`.
pub const DOWN_THRESHOLD_MS: u64 = 10_000;

/// Classify a probe from its HTTP status (absent on transport failure) and
/// elapsed time.
///
/// Rules, first match wins:
/// 1. no status → `Down`
/// 2. 5xx → `Down`
/// 3. 4xx → `Slow` (degraded, not a hard failure)
/// 4. latency: > 10 s `Down`, > 3 s `Slow`, otherwise `Online`
pub fn classify(http_status: Option<u16>, response_time_ms: u64) -> CheckStatus {
    let Some(code) = http_status else {
        return CheckStatus::Down;
    };

    match code {
        500.. => CheckStatus::Down,
        400..=499 => CheckStatus::Slow,
        _ if response_time_ms > DOWN_THRESHOLD_MS => CheckStatus::Down,
        _ if response_time_ms > SLOW_THRESHOLD_MS => CheckStatus::Slow,
        _ => CheckStatus::Online,
    }
}
