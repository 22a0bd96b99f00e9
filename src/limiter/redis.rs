//! Distributed token bucket limiter backed by Redis.
//!
//! Every instance that shares a Redis deployment enforces one logical bucket
//! per identity. The read-compute-write cycle runs inside a Lua script that
//! Redis executes atomically per key, so concurrent checks from independent
//! processes can never observe the same pre-update state and double-spend a
//! token.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Value;
use tracing::{debug, trace};

use super::backend::RateLimiter;
use super::model::{Decision, Identity, Limit};
use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::metrics::{
    MetricsRecorder, NoOpRecorder, CALL_METRIC, ERROR_METRIC, LATENCY_METRIC,
};

/// The atomic admission procedure, registered with Redis at construction.
const TOKEN_BUCKET_SCRIPT: &str = include_str!("token_bucket.lua");

/// Fixed cost of one admission check.
const COST: f64 = 1.0;

/// A distributed token-bucket rate limiter.
///
/// Bucket state is a Redis hash with `tokens` and `last_refill` fields under
/// `prefix + namespace:key`, with an expiry refreshed on every update so
/// idle identities are reclaimed by the store. The token bucket math runs
/// server-side via `EVALSHA`.
///
/// On any invocation failure `allow` returns the error and no decision; the
/// caller chooses between availability (fail open) and protection (fail
/// closed).
pub struct RedisLimiter {
    conn: ConnectionManager,
    script_sha: String,
    config: RedisConfig,
    recorder: Arc<dyn MetricsRecorder>,
}

impl RedisLimiter {
    /// Validate connectivity and register the token bucket script.
    ///
    /// The returned limiter invokes the script by its SHA. If Redis is later
    /// restarted and loses its script cache, `allow` starts returning
    /// [`Error::ScriptNotLoaded`]; constructing a fresh limiter reloads the
    /// script.
    pub async fn connect(client: redis::Client, config: RedisConfig) -> Result<Self> {
        let timeout = config.command_timeout();
        let mut conn = client.get_connection_manager().await?;

        let _: String = bound(timeout, redis::cmd("PING").query_async(&mut conn)).await?;
        let script_sha: String = bound(
            timeout,
            redis::cmd("SCRIPT")
                .arg("LOAD")
                .arg(TOKEN_BUCKET_SCRIPT)
                .query_async(&mut conn),
        )
        .await?;

        debug!(sha = %script_sha, prefix = %config.prefix, "token bucket script loaded");

        Ok(Self {
            conn,
            script_sha,
            config,
            recorder: Arc::new(NoOpRecorder),
        })
    }

    /// Install a metrics recorder. The default discards everything.
    pub fn with_recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Check whether one request for `id` may proceed under `limit`.
    ///
    /// Emits exactly one latency observation and one counter update per
    /// call, whatever the outcome. Errors are surfaced verbatim and never
    /// retried; dropping the returned future aborts the round trip.
    pub async fn allow(&self, id: &Identity, limit: &Limit) -> Result<Decision> {
        let started = Instant::now();
        let outcome = self.check(id, limit).await;

        let status = match &outcome {
            Ok(decision) if decision.allow => "allowed",
            Ok(_) => "denied",
            Err(_) => "error",
        };
        let namespace = id.namespace.as_str();
        self.recorder.observe(
            LATENCY_METRIC,
            started.elapsed().as_secs_f64(),
            &[("namespace", namespace), ("status", status)],
        );
        match &outcome {
            Ok(_) => self.recorder.add(
                CALL_METRIC,
                1.0,
                &[("namespace", namespace), ("status", status)],
            ),
            Err(err) => self.recorder.add(
                ERROR_METRIC,
                1.0,
                &[("namespace", namespace), ("type", err.category())],
            ),
        }

        outcome
    }

    async fn check(&self, id: &Identity, limit: &Limit) -> Result<Decision> {
        let key = format!("{}{}", self.config.prefix, id.storage_key());
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        trace!(
            key = %key,
            rate_per_second = limit.rate_per_second(),
            burst = limit.burst(),
            "invoking token bucket script"
        );

        let mut conn = self.conn.clone();
        let reply: Value = bound(
            self.config.command_timeout(),
            redis::cmd("EVALSHA")
                .arg(&self.script_sha)
                .arg(1)
                .arg(&key)
                .arg(limit.rate_per_second())
                .arg(limit.burst())
                .arg(now)
                .arg(COST)
                .query_async(&mut conn),
        )
        .await
        .map_err(classify)?;

        decode_decision(&reply)
    }
}

#[async_trait]
impl RateLimiter for RedisLimiter {
    async fn allow(&self, id: &Identity, limit: &Limit) -> Result<Decision> {
        RedisLimiter::allow(self, id, limit).await
    }
}

/// Run one Redis round trip under the configured timeout.
///
/// An already-expired deadline fails before the command is handed to the
/// connection: the multiplexed connection cannot retract an enqueued
/// command, and an aborted check must not mutate the bucket.
async fn bound<T>(
    timeout: Duration,
    fut: impl Future<Output = redis::RedisResult<T>>,
) -> Result<T> {
    if timeout.is_zero() {
        return Err(Error::Timeout(timeout));
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

/// Distinguish a cleared script cache from other command failures.
fn classify(err: Error) -> Error {
    match err {
        Error::Redis(e) if e.code() == Some("NOSCRIPT") => Error::ScriptNotLoaded,
        other => other,
    }
}

/// Decode the script's `(allowed, remaining, retry_after, reset_time)`
/// reply. The two durations arrive as strings; anything else in the tuple
/// is protocol drift reported as [`Error::MalformedResponse`].
fn decode_decision(reply: &Value) -> Result<Decision> {
    let Value::Array(values) = reply else {
        return Err(Error::MalformedResponse(format!(
            "expected array reply, got {reply:?}"
        )));
    };
    if values.len() != 4 {
        return Err(Error::MalformedResponse(format!(
            "expected 4 elements, got {}",
            values.len()
        )));
    }

    let allowed = numeric(&values[0], "allowed")?;
    let remaining = numeric(&values[1], "remaining")?;
    let retry_after = numeric(&values[2], "retry_after")?.max(0.0);
    let reset_time = numeric(&values[3], "reset_time")?.max(0.0);

    Ok(Decision {
        allow: allowed as i64 == 1,
        remaining: remaining.max(0.0) as u64,
        retry_after: Duration::from_secs_f64(retry_after),
        reset_time: UNIX_EPOCH + Duration::from_secs_f64(reset_time),
    })
}

fn numeric(value: &Value, field: &str) -> Result<f64> {
    let parsed = match value {
        Value::Int(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).ok().and_then(|s| s.parse().ok()),
        Value::SimpleString(s) => s.parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).ok_or_else(|| {
        Error::MalformedResponse(format!("field {field} is not numeric: {value:?}"))
    })
}
