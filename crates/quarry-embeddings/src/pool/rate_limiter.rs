//! Token bucket, one per provider instance. The bucket refills at
//! `requests_per_minute / 60` tokens per second; burst capacity covers a
//! five-second window. `generate` awaits a token before any upstream call,
//! which also serializes issuance under contention.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn from_rpm(requests_per_minute: u32) -> Self {
        let refill_per_sec = f64::from(requests_per_minute.max(1)) / 60.0;
        // Five seconds of burst, at least one request.
        let capacity = (refill_per_sec * 5.0).max(1.0);
        Self::new(capacity, refill_per_sec)
    }

    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Take one token, or report how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().expect("token bucket lock");
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }

    /// Await a token cooperatively.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_up_to_capacity() {
        let bucket = TokenBucket::new(3.0, 1.0);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn rpm_derivation() {
        let bucket = TokenBucket::from_rpm(600); // 10/sec
        assert!((bucket.capacity() - 50.0).abs() < 1e-9);

        // Tiny rates still allow one request.
        let bucket = TokenBucket::from_rpm(1);
        assert!(bucket.capacity() >= 1.0);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(1.0, 1000.0); // fast refill for the test
        assert!(bucket.try_acquire().is_ok());
        std::thread::sleep(Duration::from_millis(5));
        assert!(bucket.try_acquire().is_ok());
    }
}
