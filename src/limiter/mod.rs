//! Token bucket rate limiting: shared model and both backends.

mod backend;
mod memory;
mod model;
mod redis;

pub use backend::RateLimiter;
pub use memory::MemoryLimiter;
pub use model::{Decision, Identity, Limit};
pub use self::redis::RedisLimiter;
