//! Send pacing for rate-limited chat services.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A token bucket refilled at one token per interval.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Take a token, or report how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / refill_rate))
        }
    }
}

/// Spaces out sends: `burst` messages back-to-back, then one per `interval`.
pub struct Pacer {
    bucket: Mutex<TokenBucket>,
    capacity: f64,
    refill_rate: Option<f64>,
}

impl Pacer {
    pub fn new(burst: u32, interval: Duration) -> Self {
        let capacity = f64::from(burst.max(1));
        let refill_rate = if interval.is_zero() {
            None
        } else {
            Some(1.0 / interval.as_secs_f64())
        };
        Self {
            bucket: Mutex::new(TokenBucket::new(capacity)),
            capacity,
            refill_rate,
        }
    }

    /// A pacer that never waits.
    pub fn unlimited() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait until a send is permitted.
    pub async fn acquire(&self) {
        let Some(refill_rate) = self.refill_rate else {
            return;
        };
        let mut bucket = self.bucket.lock().await;
        while let Err(wait) = bucket.try_acquire(self.capacity, refill_rate) {
            tracing::debug!(wait = ?wait, "Pacing outbound message");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_paced() {
        let pacer = Pacer::new(2, Duration::from_millis(100));
        let start = Instant::now();
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));

        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let pacer = Pacer::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            pacer.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
