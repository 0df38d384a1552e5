//! Error types for the breaker and its drivers.

use std::fmt;

/// Errors surfaced by a [`Driver`](crate::driver::Driver) implementation.
///
/// This is the driver-internal taxonomy. A [`Breaker`](crate::circuit_breaker::Breaker)
/// recovers [`DriverError::KeyNotFound`] on load (it triggers
/// [`Driver::new_record`](crate::driver::Driver::new_record)); every other
/// variant propagates to the caller, mapped onto [`BreakerError`].
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No record exists for this key (backends without create-on-write).
    #[error("key not found in backend store")]
    KeyNotFound,

    /// The record for this key has expired. Semantically equivalent to
    /// [`DriverError::KeyNotFound`]; reserved for drivers that distinguish
    /// the two cases.
    #[error("key has expired")]
    KeyExpired,

    /// `update` was called with every field left unset.
    #[error("update requires at least one of failures, status, checkin")]
    InvalidArguments,

    /// A stored record decoded to a `status` outside `{0, 1}`.
    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),

    /// The backing store itself is unhealthy (network, server error, etc).
    #[error("backend problem: {0}")]
    Backend(String),
}

/// Errors raised to callers of a [`Breaker`](crate::circuit_breaker::Breaker).
///
/// `E` is the error type of the wrapped subject. `BackendProblem` is
/// deliberately treated as a subtype of `CircuitOpen` — see
/// [`BreakerError::is_circuit_open`] — so that a caller with one clause for
/// "don't try now" handles both a tripped breaker and a broken backend.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// Admission denied: the breaker is open and the cooldown has not
    /// elapsed.
    CircuitOpen,
    /// The shared backing store is unhealthy. A subtype of `CircuitOpen` in
    /// everything but name.
    BackendProblem(String),
    /// The wrapped operation itself failed. Re-raised verbatim.
    Inner(E),
}

impl<E: Clone> Clone for BreakerError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::CircuitOpen => Self::CircuitOpen,
            Self::BackendProblem(msg) => Self::BackendProblem(msg.clone()),
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for BreakerError<E> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::CircuitOpen, Self::CircuitOpen) => true,
            (Self::BackendProblem(a), Self::BackendProblem(b)) => a == b,
            (Self::Inner(a), Self::Inner(b)) => a == b,
            _ => false,
        }
    }
}

impl<E: Eq> Eq for BreakerError<E> {}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit breaker is open"),
            Self::BackendProblem(msg) => write!(f, "circuit breaker backend problem: {msg}"),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> BreakerError<E> {
    /// True for `CircuitOpen` and `BackendProblem` alike. A broken backend
    /// behaves exactly like an open breaker from the caller's point of view.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::BackendProblem(_))
    }

    /// True only for `BackendProblem`.
    pub fn is_backend_problem(&self) -> bool {
        matches!(self, Self::BackendProblem(_))
    }

    /// True only for `Inner`.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the subject's error, if this wraps one.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Consume and return the subject's error, if this wraps one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Maps a driver-level failure onto the breaker's caller-visible taxonomy.
///
/// `KeyNotFound`/`KeyExpired` should never reach this: the breaker recovers
/// those itself by creating a fresh record. If one slips through anyway
/// (e.g. a future driver op this crate doesn't yet recover), treat it as a
/// backend problem rather than panicking or inventing a variant.
impl<E> From<DriverError> for BreakerError<E> {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Backend(msg) => Self::BackendProblem(msg),
            other => Self::BackendProblem(other.to_string()),
        }
    }
}
