//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max`, plus up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_retry_waits_base() {
        let d = calculate_backoff(1, 200, 2000);
        assert!(d >= Duration::from_millis(200) && d < Duration::from_millis(220));
    }

    #[test]
    fn test_growth_is_capped() {
        let d = calculate_backoff(3, 200, 2000);
        assert!(d >= Duration::from_millis(800));

        let capped = calculate_backoff(12, 200, 2000);
        assert!(capped >= Duration::from_millis(2000) && capped < Duration::from_millis(2200));
    }

    #[test]
    fn test_zero_attempt_has_no_delay() {
        assert_eq!(calculate_backoff(0, 200, 2000), Duration::ZERO);
    }
}
