// Jaskier Shared Pattern — rate limiter
// Token bucket with continuous refill. The whole refill-and-decrement
// sequence runs under one mutex so waiters serialize on the same bucket
// instead of racing each other's view of `last_refill`.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_rate: f64, // tokens per second
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// `capacity` tokens, fully replenished over `window`.
    pub fn new(capacity: f64, window: Duration) -> Self {
        let refill_rate = capacity / window.as_secs_f64();
        Self {
            capacity,
            refill_rate,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(bucket: &mut Bucket, capacity: f64, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(capacity);
        bucket.last_refill = now;
    }

    /// Suspends the caller until a token is available, then consumes one.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                Self::refill(&mut bucket, self.capacity, self.refill_rate);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Returns `true` and consumes a token if one is immediately available,
    /// without suspending.
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        Self::refill(&mut bucket, self.capacity, self.refill_rate);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
