#![forbid(unsafe_code)]

//! # meshbreaker
//!
//! A circuit breaker whose state lives in a shared backing store, so that
//! many independent callers — in many processes, on many hosts — converge
//! on a single logical breaker per key. It protects a downstream service
//! from stampeding callers during an outage, and protects callers from
//! hanging on a known-bad service.
//!
//! The reference backend is Redis-compatible ([`RedisDriver`]); a
//! single-process [`InMemoryDriver`] is included for tests and
//! non-distributed deployments. Both implement the same [`Driver`] trait,
//! so a [`Breaker`] never knows which one it's talking to.
//!
//! ## Quick start
//!
//! ```rust
//! use meshbreaker::presets;
//!
//! #[derive(Debug)]
//! struct DownstreamError;
//! impl std::fmt::Display for DownstreamError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "downstream unavailable")
//!     }
//! }
//! impl std::error::Error for DownstreamError {}
//!
//! async fn call_downstream() -> Result<String, DownstreamError> {
//!     Ok("ok".to_string())
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let breaker = presets::memory(call_downstream, "payments-api").unwrap();
//! match breaker.call().await {
//!     Ok(value) => println!("{value}"),
//!     Err(e) if e.is_circuit_open() => println!("breaker open, skip the call"),
//!     Err(e) => println!("downstream failed: {e}"),
//! }
//! # }
//! ```

mod circuit_breaker;
mod clock;
mod error;
mod jitter;
mod record;

pub mod driver;
pub mod presets;

pub use circuit_breaker::{Breaker, BreakerBuilder, BreakerSnapshot, BuildError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{Driver, InMemoryDriver, RedisDriver, RedisDriverConfig};
pub use error::{BreakerError, DriverError};
pub use jitter::Jitter;
pub use record::{BreakerRecord, RecordUpdate, Status};
