//! Reference distributed [`Driver`] over a Redis-compatible key-value store.
//!
//! Grounded on `examples/zircote-subcog`'s choice of the `redis` crate with
//! `tokio-comp` + `connection-manager` for an async, auto-reconnecting,
//! cheaply-cloned client — exactly the "connection handle is assumed
//! thread-safe" backend spec.md's concurrency model calls for. The storage
//! layout (one hash per key, atomic `HINCRBY` for failures, a single
//! `HSET` for everything else, native `EXPIRE` for TTL) follows
//! `original_source`'s redis driver line for line.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{ensure_nonempty, Driver};
use crate::error::DriverError;
use crate::record::{BreakerRecord, RecordUpdate, Status};

const FIELD_FAILURES: &str = "failures";
const FIELD_STATUS: &str = "status";
const FIELD_CHECKIN: &str = "checkin";

/// Validated construction parameters for [`RedisDriver`].
///
/// Connecting is async (opening a `ConnectionManager` does a round trip),
/// but validating the inputs is not — `build` only checks that exactly one
/// of a connection or a URL was supplied, and defers the network call to
/// [`RedisDriverConfig::connect`].
pub struct RedisDriverConfig {
    connection: Option<ConnectionManager>,
    url: Option<String>,
    prefix: String,
    expires: Option<Duration>,
}

impl RedisDriverConfig {
    pub fn builder() -> RedisDriverConfigBuilder {
        RedisDriverConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct RedisDriverConfigBuilder {
    connection: Option<ConnectionManager>,
    url: Option<String>,
    prefix: Option<String>,
    expires: Option<Duration>,
}

/// Raised when neither a connection handle nor a URL was supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingConnectionError;

impl std::fmt::Display for MissingConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "you must specify one of connection or connection_url")
    }
}

impl std::error::Error for MissingConnectionError {}

impl RedisDriverConfigBuilder {
    pub fn connection(mut self, connection: ConnectionManager) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn connection_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn expires(mut self, expires: Duration) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn build(self) -> Result<RedisDriverConfig, MissingConnectionError> {
        if self.connection.is_none() && self.url.is_none() {
            return Err(MissingConnectionError);
        }
        Ok(RedisDriverConfig {
            connection: self.connection,
            url: self.url,
            prefix: self.prefix.unwrap_or_else(|| "rcb:".to_string()),
            expires: self.expires,
        })
    }
}

/// Redis-backed reference driver.
#[derive(Clone)]
pub struct RedisDriver {
    connection: ConnectionManager,
    prefix: String,
    expires: Option<Duration>,
}

impl std::fmt::Debug for RedisDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDriver")
            .field("prefix", &self.prefix)
            .field("expires", &self.expires)
            .finish()
    }
}

impl RedisDriver {
    /// Opens (or reuses) a connection and builds the driver. This is the
    /// only part of setup that does network I/O.
    pub async fn connect(config: RedisDriverConfig) -> Result<Self, DriverError> {
        let connection = match config.connection {
            Some(conn) => conn,
            None => {
                let url = config.url.expect("build() guarantees url or connection is set");
                let client = redis::Client::open(url)
                    .map_err(|e| DriverError::Backend(e.to_string()))?;
                ConnectionManager::new(client)
                    .await
                    .map_err(|e| DriverError::Backend(e.to_string()))?
            }
        };
        Ok(Self { connection, prefix: config.prefix, expires: config.expires })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn arm_ttl(&self, key: &str) -> Result<(), DriverError> {
        if let Some(ttl) = self.expires {
            let mut conn = self.connection.clone();
            let namespaced = self.namespaced(key);
            let _: () = conn
                .expire(&namespaced, ttl.as_secs() as i64)
                .await
                .map_err(|e| DriverError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    fn decode(
        key: &str,
        map: std::collections::HashMap<String, String>,
    ) -> Result<BreakerRecord, DriverError> {
        if map.is_empty() {
            tracing::debug!(key, "redis hash not found");
            return Err(DriverError::KeyNotFound);
        }
        let failures: u64 = map
            .get(FIELD_FAILURES)
            .ok_or_else(|| DriverError::CorruptRecord("missing failures field".into()))?
            .parse()
            .map_err(|_| DriverError::CorruptRecord("failures is not an integer".into()))?;
        let status_raw: i64 = map
            .get(FIELD_STATUS)
            .ok_or_else(|| DriverError::CorruptRecord("missing status field".into()))?
            .parse()
            .map_err(|_| DriverError::CorruptRecord("status is not an integer".into()))?;
        let status = Status::try_from(status_raw)?;
        let checkin: f64 = map
            .get(FIELD_CHECKIN)
            .ok_or_else(|| DriverError::CorruptRecord("missing checkin field".into()))?
            .parse()
            .map_err(|_| DriverError::CorruptRecord("checkin is not a float".into()))?;
        Ok(BreakerRecord { failures, status, checkin })
    }
}

#[async_trait]
impl Driver for RedisDriver {
    async fn load(&self, key: &str) -> Result<BreakerRecord, DriverError> {
        let mut conn = self.connection.clone();
        let namespaced = self.namespaced(key);
        let map: std::collections::HashMap<String, String> = conn
            .hgetall(&namespaced)
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        Self::decode(key, map)
    }

    async fn new_record(&self, key: &str) -> Result<BreakerRecord, DriverError> {
        let record = BreakerRecord::fresh(self.now());
        self.update(
            key,
            RecordUpdate::new()
                .failures(record.failures)
                .status(record.status)
                .checkin(record.checkin),
        )
        .await?;
        self.arm_ttl(key).await?;
        Ok(record)
    }

    async fn update(&self, key: &str, update: RecordUpdate) -> Result<(), DriverError> {
        ensure_nonempty(&update)?;
        let mut fields: Vec<(&str, String)> = Vec::with_capacity(3);
        if let Some(failures) = update.failures {
            fields.push((FIELD_FAILURES, failures.to_string()));
        }
        if let Some(status) = update.status {
            fields.push((FIELD_STATUS, i64::from(status).to_string()));
        }
        if let Some(checkin) = update.checkin {
            fields.push((FIELD_CHECKIN, checkin.to_string()));
        }
        let mut conn = self.connection.clone();
        let namespaced = self.namespaced(key);
        let _: () = conn
            .hset_multiple(&namespaced, &fields)
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn failure(&self, key: &str) -> Result<u64, DriverError> {
        let mut conn = self.connection.clone();
        let namespaced = self.namespaced(key);
        let failures: u64 = conn
            .hincr(&namespaced, FIELD_FAILURES, 1_i64)
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        tracing::debug!(key, failures, "logged failure via atomic HINCRBY");
        Ok(failures)
    }

    async fn open(&self, key: &str) -> Result<(), DriverError> {
        self.update(
            key,
            RecordUpdate::new().status(Status::Open).checkin(self.now()),
        )
        .await
    }

    async fn close(&self, key: &str) -> Result<(), DriverError> {
        self.update(
            key,
            RecordUpdate::new().status(Status::Closed).failures(0).checkin(self.now()),
        )
        .await
    }

    async fn reset(&self, key: &str) -> Result<(), DriverError> {
        self.close(key).await?;
        self.arm_ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), DriverError> {
        let mut conn = self.connection.clone();
        let namespaced = self.namespaced(key);
        let _: i64 = conn
            .del(&namespaced)
            .await
            .map_err(|e| DriverError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn expire(&self, _key: &str, _checkin: f64) -> Result<(), DriverError> {
        // Native TTL handles expiry; nothing to do here. See DESIGN.md.
        Ok(())
    }

    fn now(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs_f64()
    }
}
