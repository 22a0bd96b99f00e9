//! Backend trait abstracting local and distributed limiters.

use async_trait::async_trait;

use super::model::{Decision, Identity, Limit};
use crate::error::Result;

/// Admission-control interface implemented by both backends.
///
/// [`MemoryLimiter`](super::MemoryLimiter) enforces a per-process budget;
/// [`RedisLimiter`](super::RedisLimiter) enforces one shared budget across
/// every instance pointing at the same store. Code that only needs "may this
/// request proceed" should accept this trait so the backend can be swapped
/// at wiring time.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check whether one request for `id` may proceed under `limit`.
    ///
    /// Each call costs exactly one token.
    async fn allow(&self, id: &Identity, limit: &Limit) -> Result<Decision>;
}
