//! In-process token bucket limiter.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::backend::RateLimiter;
use super::model::{Decision, Identity, Limit};
use crate::error::Result;

/// Per-identity bucket state.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// An in-process token-bucket rate limiter.
///
/// State lives in a process-local table, so each replica enforces its own
/// budget; use [`RedisLimiter`](super::RedisLimiter) when one global limit
/// must hold across instances. Buckets are created lazily on first admission
/// and never evicted, so long-lived processes with high-cardinality keys
/// should prefer the distributed backend.
pub struct MemoryLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryLimiter {
    /// Create a limiter with an empty table.
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether one request for `id` may proceed under `limit`.
    ///
    /// Local computation cannot fail, so unlike the trait method this
    /// returns the decision directly. The whole check runs under one lock:
    /// no two calls observe the same pre-update state.
    pub fn allow(&self, id: &Identity, limit: &Limit) -> Decision {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let key = id.storage_key();

        let Some(bucket) = buckets.get_mut(&key) else {
            // First admission: start from a full bucket and spend one token.
            buckets.insert(
                key,
                Bucket {
                    tokens: limit.burst() as f64 - 1.0,
                    last_refill: now,
                },
            );
            trace!(identity = %id, burst = limit.burst(), "created bucket");
            return Decision {
                allow: true,
                remaining: limit.burst() - 1,
                retry_after: Duration::ZERO,
                reset_time: SystemTime::now(),
            };
        };

        // Refill for the time since the last update, capped at burst. The
        // refill timestamp moves forward even when the request is denied.
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let accrued = elapsed.as_secs_f64() * limit.rate_per_second();
        bucket.tokens = (bucket.tokens + accrued).min(limit.burst() as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision {
                allow: true,
                remaining: bucket.tokens as u64,
                retry_after: Duration::ZERO,
                reset_time: SystemTime::now(),
            }
        } else {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / limit.rate_per_second());
            Decision {
                allow: false,
                remaining: bucket.tokens as u64,
                retry_after: wait,
                reset_time: SystemTime::now() + wait,
            }
        }
    }

    /// Number of identities with live bucket state.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

impl Default for MemoryLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for MemoryLimiter {
    async fn allow(&self, id: &Identity, limit: &Limit) -> Result<Decision> {
        Ok(MemoryLimiter::allow(self, id, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity() -> Identity {
        Identity::new("test", "user_1")
    }

    #[test]
    fn first_admission_spends_one_token() {
        let limiter = MemoryLimiter::new();
        let limit = Limit::per_second(10, 10).unwrap();

        let decision = limiter.allow(&test_identity(), &limit);

        assert!(decision.allow);
        assert_eq!(decision.remaining, 9);
        assert_eq!(decision.retry_after, Duration::ZERO);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn exhaustion_denies_with_zero_remaining() {
        let limiter = MemoryLimiter::new();
        let limit = Limit::per_second(1, 5).unwrap();
        let id = test_identity();

        for i in 0..5 {
            let decision = limiter.allow(&id, &limit);
            assert!(decision.allow, "request {i} was unexpectedly denied");
        }

        let decision = limiter.allow(&id, &limit);
        assert!(!decision.allow, "6th request should be denied at burst 5");
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after > Duration::ZERO);
        assert!(decision.reset_time > SystemTime::now() - Duration::from_secs(1));
    }

    #[test]
    fn denial_estimates_wait_for_one_token() {
        let limiter = MemoryLimiter::new();
        let limit = Limit::per_second(10, 1).unwrap();
        let id = test_identity();

        assert!(limiter.allow(&id, &limit).allow);
        let decision = limiter.allow(&id, &limit);

        assert!(!decision.allow);
        // One token accrues every 100ms at 10/s; a sliver may already have
        // accrued between the two calls.
        assert!(decision.retry_after > Duration::from_millis(50));
        assert!(decision.retry_after <= Duration::from_millis(100));
    }

    #[test]
    fn refill_allows_after_waiting() {
        let limiter = MemoryLimiter::new();
        let limit = Limit::per_second(10, 1).unwrap();
        let id = test_identity();

        assert!(limiter.allow(&id, &limit).allow);
        assert!(!limiter.allow(&id, &limit).allow);

        // 100ms accrues the missing token; 150ms leaves headroom.
        std::thread::sleep(Duration::from_millis(150));

        assert!(limiter.allow(&id, &limit).allow);
    }

    #[test]
    fn idle_accrual_never_exceeds_burst() {
        let limiter = MemoryLimiter::new();
        // One token per 50ms: an idle bucket would earn 6 tokens over 300ms
        // if the cap did not hold.
        let limit = Limit::new(1, Duration::from_millis(50), 3).unwrap();
        let id = test_identity();

        assert!(limiter.allow(&id, &limit).allow);
        std::thread::sleep(Duration::from_millis(300));

        for _ in 0..3 {
            assert!(limiter.allow(&id, &limit).allow);
        }
        assert!(!limiter.allow(&id, &limit).allow);
    }

    #[test]
    fn identities_have_independent_buckets() {
        let limiter = MemoryLimiter::new();
        let limit = Limit::per_second(1, 1).unwrap();

        assert!(limiter.allow(&Identity::new("ip", "10.0.0.1"), &limit).allow);
        assert!(limiter.allow(&Identity::new("ip", "10.0.0.2"), &limit).allow);
        assert!(!limiter.allow(&Identity::new("ip", "10.0.0.1"), &limit).allow);
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn concurrent_checks_never_double_spend() {
        let limiter = MemoryLimiter::new();
        let limit = Limit::per_second(1, 100).unwrap();
        let id = test_identity();

        std::thread::scope(|scope| {
            for _ in 0..100 {
                scope.spawn(|| {
                    limiter.allow(&id, &limit);
                });
            }
        });

        let decision = limiter.allow(&id, &limit);
        assert!(
            !decision.allow,
            "bucket should be exhausted after 100 concurrent admissions"
        );
    }

    #[tokio::test]
    async fn trait_impl_never_fails() {
        let limiter: &dyn RateLimiter = &MemoryLimiter::new();
        let limit = Limit::per_second(10, 10).unwrap();

        let decision = limiter.allow(&test_identity(), &limit).await.unwrap();
        assert!(decision.allow);
    }
}
