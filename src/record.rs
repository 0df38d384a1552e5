//! The durable per-key state a [`Driver`](crate::driver::Driver) owns.

use crate::error::DriverError;

/// Breaker status, as persisted by a driver.
///
/// The discriminants are wire format: existing deployments store `0` for
/// open and `1` for closed, and a reimplementation has to preserve that
/// exact encoding rather than picking the more obvious `Closed = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum Status {
    Open = 0,
    Closed = 1,
}

impl TryFrom<i64> for Status {
    type Error = DriverError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Open),
            1 => Ok(Status::Closed),
            other => Err(DriverError::CorruptRecord(format!(
                "status decoded to {other}, expected 0 or 1"
            ))),
        }
    }
}

impl From<Status> for i64 {
    fn from(status: Status) -> Self {
        status as i64
    }
}

/// The triple `(failures, status, checkin)` stored per key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerRecord {
    pub failures: u64,
    pub status: Status,
    pub checkin: f64,
}

impl BreakerRecord {
    /// A fresh record: no failures, closed, checked in now.
    pub fn fresh(now: f64) -> Self {
        Self { failures: 0, status: Status::Closed, checkin: now }
    }
}

/// A partial update to a [`BreakerRecord`]. Fields left `None` are
/// unchanged by the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordUpdate {
    pub failures: Option<u64>,
    pub status: Option<Status>,
    pub checkin: Option<f64>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn checkin(mut self, checkin: f64) -> Self {
        self.checkin = Some(checkin);
        self
    }

    /// True when no field was supplied — callers must reject this rather
    /// than silently no-op a write.
    pub fn is_empty(&self) -> bool {
        self.failures.is_none() && self.status.is_none() && self.checkin.is_none()
    }

    /// Apply this update onto an existing record, leaving unset fields
    /// untouched.
    pub fn apply(&self, mut record: BreakerRecord) -> BreakerRecord {
        if let Some(failures) = self.failures {
            record.failures = failures;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(checkin) = self.checkin {
            record.checkin = checkin;
        }
        record
    }
}
