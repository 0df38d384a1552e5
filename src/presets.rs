//! Ready-made bundles wiring a driver to a breaker.
//!
//! Two convenience constructors, matching the two reference backends:
//! [`memory`] for single-process use and tests, [`distributed`] for a
//! breaker shared across processes and hosts via Redis. Both apply the same
//! documented defaults (`failures=5, timeout=10s, expires=180s,
//! jitter=default`); `distributed` additionally exposes the connection and
//! key-prefix tunables `RedisDriverConfigBuilder` itself supports, rather
//! than hardcoding them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::circuit_breaker::{Breaker, BuildError};
use crate::driver::{InMemoryDriver, RedisDriver, RedisDriverConfig};
use crate::error::DriverError;
use crate::jitter::Jitter;

const DEFAULT_MAX_FAILURES: u64 = 5;
const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_EXPIRES_SECS: u64 = 180;

/// The documented default key prefix, `"rcb:"` — pass this to
/// [`distributed`] to opt into the same default the old hardcoded preset
/// used, or supply your own.
pub const DEFAULT_PREFIX: &str = "rcb:";

/// How [`distributed`] reaches the Redis-compatible server: either a
/// connection string or a pre-built handle, mirroring
/// `RedisDriverConfigBuilder`'s own `connection_url`/`connection` split.
pub enum RedisEndpoint {
    Url(String),
    Connection(ConnectionManager),
}

impl From<String> for RedisEndpoint {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<&str> for RedisEndpoint {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<ConnectionManager> for RedisEndpoint {
    fn from(connection: ConnectionManager) -> Self {
        Self::Connection(connection)
    }
}

/// An in-memory-backed breaker with the library's documented defaults.
///
/// **Included:** threshold 5, cooldown 10s, record TTL 180s, default
/// jitter (uniform `[0, 10]` seconds).
pub fn memory<Sub, Fut, T, E>(subject: Sub, key: impl Into<String>) -> Result<Breaker<InMemoryDriver, Sub>, BuildError>
where
    Sub: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
{
    let driver = Arc::new(InMemoryDriver::new(Some(Duration::from_secs(DEFAULT_EXPIRES_SECS))));
    Breaker::builder(driver, subject, key)
        .max_failures(DEFAULT_MAX_FAILURES)
        .timeout(DEFAULT_TIMEOUT_SECS)
        .jitter(Jitter::Default)
        .build()
}

/// A Redis-backed breaker with the library's documented defaults for
/// everything except the connection and key prefix, which the caller
/// always supplies.
///
/// **Included:** threshold 5, cooldown 10s, record TTL 180s, default
/// jitter. `endpoint` accepts a `&str`/`String` connection URL or a
/// pre-built `ConnectionManager` (see [`RedisEndpoint`]); pass
/// [`DEFAULT_PREFIX`] for `prefix` to match the library's own default.
/// Connecting (when `endpoint` is a URL) is the only async step in
/// constructing a breaker.
pub async fn distributed<Sub, Fut, T, E>(
    subject: Sub,
    key: impl Into<String>,
    endpoint: impl Into<RedisEndpoint>,
    prefix: impl Into<String>,
) -> Result<Breaker<RedisDriver, Sub>, DriverError>
where
    Sub: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
{
    let builder = RedisDriverConfig::builder()
        .prefix(prefix)
        .expires(Duration::from_secs(DEFAULT_EXPIRES_SECS));
    let builder = match endpoint.into() {
        RedisEndpoint::Url(url) => builder.connection_url(url),
        RedisEndpoint::Connection(connection) => builder.connection(connection),
    };
    let config = builder.build().map_err(|e| DriverError::Backend(e.to_string()))?;
    let driver = Arc::new(RedisDriver::connect(config).await?);
    Breaker::builder(driver, subject, key)
        .max_failures(DEFAULT_MAX_FAILURES)
        .timeout(DEFAULT_TIMEOUT_SECS)
        .jitter(Jitter::Default)
        .build()
        .map_err(|e| DriverError::Backend(e.to_string()))
}
