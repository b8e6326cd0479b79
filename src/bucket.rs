//! Generic token-bucket rate limiter, shared by the RPC Transport's
//! per-endpoint buckets and the named HTTP rate limiter.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A single token bucket: `reservoir` tokens, refilled to full every
/// `refill_interval`, with at most `max_concurrent` tokens checked out at once.
pub struct TokenBucket {
    reservoir: u32,
    available: Mutex<BucketState>,
    refill_interval: Duration,
    max_concurrent: u32,
}

struct BucketState {
    tokens: u32,
    in_flight: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(reservoir: u32, refill_interval: Duration, max_concurrent: u32) -> Self {
        Self {
            reservoir,
            available: Mutex::new(BucketState {
                tokens: reservoir,
                in_flight: 0,
                last_refill: Instant::now(),
            }),
            refill_interval,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Acquire a slot, waiting (cooperatively) until the bucket has capacity.
    pub async fn acquire(&self) {
        loop {
            {
                let mut state = self.available.lock().await;
                self.refill_if_due(&mut state);
                if state.tokens > 0 && state.in_flight < self.max_concurrent {
                    state.tokens -= 1;
                    state.in_flight += 1;
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Release a previously-acquired concurrency slot (tokens themselves only
    /// refill on the timer, this only frees up `max_concurrent` headroom).
    pub async fn release(&self) {
        let mut state = self.available.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn refill_if_due(&self, state: &mut BucketState) {
        if state.last_refill.elapsed() >= self.refill_interval {
            state.tokens = self.reservoir;
            state.last_refill = Instant::now();
        }
    }

    #[cfg(test)]
    pub async fn tokens_remaining(&self) -> u32 {
        self.available.lock().await.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_consumes_a_token() {
        let bucket = TokenBucket::new(2, Duration::from_secs(60), 2);
        assert_eq!(bucket.tokens_remaining().await, 2);
        bucket.acquire().await;
        assert_eq!(bucket.tokens_remaining().await, 1);
    }

    #[tokio::test]
    async fn refill_restores_full_reservoir() {
        let bucket = TokenBucket::new(1, Duration::from_millis(20), 1);
        bucket.acquire().await;
        assert_eq!(bucket.tokens_remaining().await, 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Next acquire should trigger a refill-and-consume, leaving 0 again
        // but proving the reservoir was restored to 1 first.
        bucket.acquire().await;
        assert_eq!(bucket.tokens_remaining().await, 0);
    }

    #[tokio::test]
    async fn max_concurrent_is_enforced() {
        let bucket = TokenBucket::new(10, Duration::from_secs(60), 1);
        bucket.acquire().await;
        let bucket = std::sync::Arc::new(bucket);
        let b2 = bucket.clone();
        let handle = tokio::spawn(async move {
            tokio::time::timeout(Duration::from_millis(50), b2.acquire())
                .await
        });
        // Should still be blocked by max_concurrent=1 after 50ms.
        assert!(handle.await.unwrap().is_err());
    }
}
