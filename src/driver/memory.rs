//! Reference in-memory [`Driver`], for single-process deployments and tests.
//!
//! Grounded on the teacher's `rate_limit::store::InMemoryTokenStore`: a
//! `Mutex`-guarded `HashMap<String, _>` is the idiomatic stand-in for "the
//! backend" when there isn't one. Unlike the distributed driver, `failure`
//! on a missing key is an error here — there's no atomic create-on-increment
//! primitive to fall back on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ensure_nonempty, Driver};
use crate::clock::{Clock, SystemClock};
use crate::error::DriverError;
use crate::record::{BreakerRecord, RecordUpdate, Status};

/// In-memory reference backend.
pub struct InMemoryDriver {
    state: Mutex<HashMap<String, BreakerRecord>>,
    expires: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDriver").field("expires", &self.expires).finish()
    }
}

impl InMemoryDriver {
    /// `expires: None` disables TTL.
    pub fn new(expires: Option<Duration>) -> Self {
        Self::with_clock(expires, Arc::new(SystemClock))
    }

    /// Inject a clock — tests use this with a [`crate::clock::ManualClock`]
    /// to assert TTL behavior without real sleeps.
    pub fn with_clock(expires: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        Self { state: Mutex::new(HashMap::new()), expires, clock }
    }

    fn expired(&self, record: &BreakerRecord) -> bool {
        match self.expires {
            Some(ttl) => self.clock.now() - record.checkin >= ttl.as_secs_f64(),
            None => false,
        }
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn load(&self, key: &str) -> Result<BreakerRecord, DriverError> {
        let mut guard = self.state.lock().unwrap();
        match guard.get(key) {
            Some(record) if self.expired(record) => {
                tracing::debug!(key, "in-memory record expired on load, evicting");
                guard.remove(key);
                Err(DriverError::KeyNotFound)
            }
            Some(record) => Ok(*record),
            None => Err(DriverError::KeyNotFound),
        }
    }

    async fn new_record(&self, key: &str) -> Result<BreakerRecord, DriverError> {
        let record = BreakerRecord::fresh(self.clock.now());
        self.state.lock().unwrap().insert(key.to_string(), record);
        tracing::debug!(key, "created fresh in-memory record");
        Ok(record)
    }

    async fn update(&self, key: &str, update: RecordUpdate) -> Result<(), DriverError> {
        ensure_nonempty(&update)?;
        let mut guard = self.state.lock().unwrap();
        let base = guard.get(key).copied().unwrap_or_else(|| BreakerRecord::fresh(self.clock.now()));
        guard.insert(key.to_string(), update.apply(base));
        Ok(())
    }

    async fn failure(&self, key: &str) -> Result<u64, DriverError> {
        let mut guard = self.state.lock().unwrap();
        let record = guard.get_mut(key).ok_or(DriverError::KeyNotFound)?;
        record.failures += 1;
        tracing::debug!(key, failures = record.failures, "logged failure");
        Ok(record.failures)
    }

    async fn open(&self, key: &str) -> Result<(), DriverError> {
        self.update(
            key,
            RecordUpdate::new().status(Status::Open).checkin(self.clock.now()),
        )
        .await
    }

    async fn close(&self, key: &str) -> Result<(), DriverError> {
        self.update(
            key,
            RecordUpdate::new().status(Status::Closed).failures(0).checkin(self.clock.now()),
        )
        .await
    }

    async fn reset(&self, key: &str) -> Result<(), DriverError> {
        self.close(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), DriverError> {
        self.state.lock().unwrap().remove(key).map(|_| ()).ok_or(DriverError::KeyNotFound)
    }

    async fn expire(&self, key: &str, checkin: f64) -> Result<(), DriverError> {
        if let Some(ttl) = self.expires {
            if self.clock.now() - checkin >= ttl.as_secs_f64() {
                tracing::debug!(key, "advisory expire evicting stale record");
                self.state.lock().unwrap().remove(key);
            }
        }
        Ok(())
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }
}
