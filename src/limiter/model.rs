//! Shared vocabulary for both limiter backends.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// Names the subject being rate limited.
///
/// The namespace groups subjects (for example "ip", "user", "api_key") and
/// the key identifies one subject within that namespace. Together they form
/// the stable storage key both backends track state under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Logical grouping for the subject.
    pub namespace: String,
    /// The subject's identifier within the namespace.
    pub key: String,
}

impl Identity {
    /// Create a new identity.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// The `namespace:key` form used as the storage key.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

/// A rate limiting policy: `rate` tokens are earned per `period`, and the
/// bucket holds at most `burst` tokens.
///
/// Limits are validated at construction so backends can assume a finite,
/// positive refill rate. A zero rate, zero period, or zero burst is rejected
/// with [`Error::InvalidLimit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    rate: u64,
    period: Duration,
    burst: u64,
}

impl Limit {
    /// Create a validated limit.
    pub fn new(rate: u64, period: Duration, burst: u64) -> Result<Self> {
        if rate == 0 {
            return Err(Error::InvalidLimit("rate must be positive".into()));
        }
        if period.is_zero() {
            return Err(Error::InvalidLimit("period must be positive".into()));
        }
        if burst == 0 {
            return Err(Error::InvalidLimit("burst must be at least 1".into()));
        }
        Ok(Self {
            rate,
            period,
            burst,
        })
    }

    /// Shorthand for a limit measured per second.
    pub fn per_second(rate: u64, burst: u64) -> Result<Self> {
        Self::new(rate, Duration::from_secs(1), burst)
    }

    /// Tokens earned per period.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// The window the rate is measured over.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Bucket capacity, also the maximum immediately grantable burst.
    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Effective refill rate in tokens per second.
    pub fn rate_per_second(&self) -> f64 {
        self.rate as f64 / self.period.as_secs_f64()
    }
}

/// The outcome of a single admission check.
///
/// Fields map directly onto the usual rate limit response headers:
/// `remaining` onto `X-RateLimit-Remaining`, `retry_after` onto
/// `Retry-After`.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allow: bool,
    /// Whole tokens left after this decision is applied.
    pub remaining: u64,
    /// Zero when allowed; otherwise the estimated wait until one token
    /// becomes available.
    pub retry_after: Duration,
    /// Absolute time corresponding to decision time + `retry_after`.
    pub reset_time: SystemTime,
}
