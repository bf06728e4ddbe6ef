//! Retry schedule: exponential backoff with jitter, capped at 30 s.
//! Whether to retry at all is read off the error itself; an upstream
//! rate-limit reset time overrides the computed schedule.

use std::time::Duration;

use rand::Rng;

use quarry_core::constants::MAX_BACKOFF_MS;
use quarry_core::errors::{ProviderError, QuarryError};

/// Backoff for the given zero-based attempt: `base · 2^attempt` plus up to
/// 25% jitter, capped.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let capped = exp.min(MAX_BACKOFF_MS);
    let jitter = rand::rng().random_range(0..=capped / 4);
    Duration::from_millis((capped + jitter).min(MAX_BACKOFF_MS))
}

/// Decide the delay before retrying `attempt + 1`, or `None` when the
/// error must not be retried.
pub fn retry_delay(error: &QuarryError, attempt: u32, base_ms: u64) -> Option<Duration> {
    if !error.is_retryable() {
        return None;
    }
    // A quota error with a known reset time waits for the reset instead
    // of the backoff schedule.
    if let QuarryError::Provider(ProviderError::Quota {
        reset_after_ms: Some(reset),
        ..
    }) = error
    {
        return Some(Duration::from_millis((*reset).min(MAX_BACKOFF_MS)));
    }
    Some(backoff_delay(attempt, base_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let d0 = backoff_delay(0, 1_000);
        assert!(d0 >= Duration::from_millis(1_000));
        assert!(d0 <= Duration::from_millis(1_250));

        let d_large = backoff_delay(20, 1_000);
        assert!(d_large <= Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn auth_errors_never_retry() {
        let err: QuarryError = ProviderError::Authentication {
            provider: "remote-http".into(),
            reason: "bad key".into(),
        }
        .into();
        assert!(retry_delay(&err, 0, 1_000).is_none());
    }

    #[test]
    fn quota_reset_overrides_schedule() {
        let err: QuarryError = ProviderError::Quota {
            provider: "remote-http".into(),
            reset_after_ms: Some(7_000),
        }
        .into();
        assert_eq!(
            retry_delay(&err, 0, 1_000).unwrap(),
            Duration::from_millis(7_000)
        );
    }

    #[test]
    fn network_errors_use_backoff() {
        let err: QuarryError = ProviderError::Network {
            provider: "remote-http".into(),
            status: Some(503),
            reason: "unavailable".into(),
        }
        .into();
        let delay = retry_delay(&err, 1, 500).unwrap();
        assert!(delay >= Duration::from_millis(1_000));
    }
}
