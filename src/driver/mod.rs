//! The pluggable shared-state backend a [`Breaker`](crate::circuit_breaker::Breaker)
//! persists its state through.
//!
//! Modeled the way the teacher's rate-limit `TokenStore` trait separates
//! storage from policy: the breaker depends only on this trait, and any
//! backend that can satisfy it — in-memory, Redis, or something else
//! entirely — can stand behind a shared breaker key.

pub mod distributed;
pub mod memory;

use crate::error::DriverError;
use crate::record::{BreakerRecord, RecordUpdate};
use async_trait::async_trait;

pub use distributed::{RedisDriver, RedisDriverConfig};
pub use memory::InMemoryDriver;

/// Persists and mutates [`BreakerRecord`] under a key.
///
/// Every method takes `&self`: implementors must hold their state behind
/// interior mutability (a mutex, or a backend connection handle that is
/// already safe to share), so one `Arc<dyn Driver>` can back many
/// [`Breaker`](crate::circuit_breaker::Breaker) instances across threads without an
/// extra layer of synchronization here.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Returns the current record, or `DriverError::KeyNotFound` if absent.
    async fn load(&self, key: &str) -> Result<BreakerRecord, DriverError>;

    /// Persists a default record (failures=0, closed, checkin=now) and
    /// returns it. Arms the TTL if one is configured.
    async fn new_record(&self, key: &str) -> Result<BreakerRecord, DriverError>;

    /// Partial update. `update.is_empty()` is an error. If the key is
    /// absent, the driver creates it from defaults first.
    async fn update(&self, key: &str, update: RecordUpdate) -> Result<(), DriverError>;

    /// Atomically increments the failure counter and returns the new value.
    async fn failure(&self, key: &str) -> Result<u64, DriverError>;

    /// Sets status=open, checkin=now.
    async fn open(&self, key: &str) -> Result<(), DriverError>;

    /// Sets status=closed, failures=0, checkin=now.
    async fn close(&self, key: &str) -> Result<(), DriverError>;

    /// Equivalent to `close`, re-arming the TTL if one is configured.
    async fn reset(&self, key: &str) -> Result<(), DriverError>;

    /// Removes the record.
    async fn delete(&self, key: &str) -> Result<(), DriverError>;

    /// Advisory expiry check. A no-op on backends with native per-key TTL.
    async fn expire(&self, key: &str, checkin: f64) -> Result<(), DriverError>;

    /// Current wall-clock seconds (fractional), read through the driver so
    /// the breaker never calls `SystemTime::now()` directly.
    fn now(&self) -> f64;
}

/// Shared validation for `update`: every `Driver::update` implementation
/// must reject an empty [`RecordUpdate`] the same way.
pub(crate) fn ensure_nonempty(update: &RecordUpdate) -> Result<(), DriverError> {
    if update.is_empty() {
        Err(DriverError::InvalidArguments)
    } else {
        Ok(())
    }
}
