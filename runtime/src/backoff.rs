//! Backoff schedule for callback delivery.
//!
//! A pure function of `(attempt, table, remaining TTL)` — no shared state.
//! The configured table is indexed by attempt number; once the table runs
//! out the delay falls back to `min(2^attempt, 30s)`. The result is always
//! clamped to the caller's remaining TTL, and a zero result means the
//! caller must stop retrying rather than spin.

use std::time::Duration;

/// Cap on the table-exhausted exponential fallback.
const FALLBACK_CAP_SECS: u64 = 30;

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// `table` entries are seconds; entry `attempt - 1` applies. Past the end
/// of the table the delay is `min(2^attempt, 30s)`. The returned duration
/// never exceeds `remaining`.
#[must_use]
pub fn backoff_delay(attempt: u32, table: &[u64], remaining: Duration) -> Duration {
    let attempt = attempt.max(1);
    let secs = table
        .get(attempt as usize - 1)
        .copied()
        .unwrap_or_else(|| 2u64.saturating_pow(attempt).min(FALLBACK_CAP_SECS));
    Duration::from_secs(secs).min(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    #[test]
    fn indexes_table_by_attempt_number() {
        let table = [1, 2, 4];
        assert_eq!(backoff_delay(1, &table, LONG_TTL), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, &table, LONG_TTL), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, &table, LONG_TTL), Duration::from_secs(4));
    }

    #[test]
    fn falls_back_to_exponential_when_table_exhausted() {
        let table = [1];
        assert_eq!(backoff_delay(2, &table, LONG_TTL), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, &table, LONG_TTL), Duration::from_secs(8));
        assert_eq!(backoff_delay(4, &table, LONG_TTL), Duration::from_secs(16));
    }

    #[test]
    fn fallback_is_capped_at_thirty_seconds() {
        assert_eq!(backoff_delay(5, &[], LONG_TTL), Duration::from_secs(30));
        assert_eq!(backoff_delay(63, &[], LONG_TTL), Duration::from_secs(30));
        // Large attempt numbers must not overflow.
        assert_eq!(backoff_delay(u32::MAX, &[], LONG_TTL), Duration::from_secs(30));
    }

    #[test]
    fn clamps_to_remaining_ttl() {
        let table = [10];
        assert_eq!(
            backoff_delay(1, &table, Duration::from_secs(3)),
            Duration::from_secs(3)
        );
        assert_eq!(backoff_delay(1, &table, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn empty_table_uses_fallback_from_first_attempt() {
        assert_eq!(backoff_delay(1, &[], LONG_TTL), Duration::from_secs(2));
    }
}
