//! The breaker state machine and its invocation contract.
//!
//! A [`Breaker`] holds a driver, a key, a wrapped operation (the "subject"),
//! thresholds, and a jitter policy. Calling it loads the shared record from
//! the driver, decides whether to admit or reject the call, invokes the
//! subject if admitted, and writes the outcome back through the driver —
//! so any number of breaker instances sharing a driver and a key converge
//! on the same logical breaker.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;

use crate::driver::Driver;
use crate::error::BreakerError;
use crate::jitter::Jitter;
use crate::record::{BreakerRecord, Status};

/// Local, non-authoritative snapshot of the shared record. Refreshed from
/// the driver on every call; never trusted across processes.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    failures: u64,
    status: Status,
    checkin: f64,
}

impl From<BreakerRecord> for Snapshot {
    fn from(record: BreakerRecord) -> Self {
        Self { failures: record.failures, status: record.status, checkin: record.checkin }
    }
}

/// An observable view of a breaker's current state, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub status: Status,
    pub failures: u64,
    pub timeout: f64,
    pub checkin: f64,
    pub jitter: Option<f64>,
    pub max_failures: u64,
}

/// Builds a [`Breaker`].
pub struct BreakerBuilder<D, Sub> {
    driver: Arc<D>,
    subject: Sub,
    key: String,
    max_failures: u64,
    timeout: f64,
    jitter: Jitter,
}

/// Raised by [`BreakerBuilder::build`] for invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    EmptyKey,
    ZeroThreshold,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "breaker key must not be empty"),
            Self::ZeroThreshold => write!(f, "max_failures must be > 0"),
        }
    }
}

impl std::error::Error for BuildError {}

impl<D, Sub> BreakerBuilder<D, Sub> {
    pub fn new(driver: Arc<D>, subject: Sub, key: impl Into<String>) -> Self {
        Self {
            driver,
            subject,
            key: key.into(),
            max_failures: 5,
            timeout: 10.0,
            jitter: Jitter::Default,
        }
    }

    pub fn max_failures(mut self, max_failures: u64) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn timeout(mut self, timeout_secs: f64) -> Self {
        self.timeout = timeout_secs;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

impl<D: Driver, Sub> BreakerBuilder<D, Sub> {
    /// `checkin` is seeded from `driver.now()`, not zero — a fresh breaker
    /// sharing a driver with an existing record must not look like it was
    /// checked in at the Unix epoch, or its first advisory `expire()` call
    /// would see an elapsed TTL of "now minus zero" and delete whatever a
    /// sibling breaker already wrote at that key.
    pub fn build(self) -> Result<Breaker<D, Sub>, BuildError> {
        if self.key.is_empty() {
            return Err(BuildError::EmptyKey);
        }
        if self.max_failures == 0 {
            return Err(BuildError::ZeroThreshold);
        }
        let checkin = self.driver.now();
        Ok(Breaker {
            driver: self.driver,
            subject: self.subject,
            key: self.key,
            max_failures: self.max_failures,
            timeout: self.timeout,
            jitter: self.jitter,
            snapshot: Arc::new(Mutex::new(Snapshot { failures: 0, status: Status::Closed, checkin })),
            last_jitter: Arc::new(Mutex::new(None)),
        })
    }
}

/// The wrapping state machine. `D` is the backing [`Driver`]; `Sub` is the
/// wrapped operation, a `Fn() -> Fut` so argument binding is pushed to the
/// caller's closure rather than threaded generically through the breaker.
/// The local snapshot lives behind an `Arc` so cloning a `Breaker` shares
/// one cache rather than forking it, the way the teacher's
/// `CircuitBreakerPolicy` shares its `Arc<CircuitBreakerState>` on clone.
pub struct Breaker<D, Sub> {
    driver: Arc<D>,
    subject: Sub,
    key: String,
    max_failures: u64,
    timeout: f64,
    jitter: Jitter,
    snapshot: Arc<Mutex<Snapshot>>,
    last_jitter: Arc<Mutex<Option<f64>>>,
}

// A hand-written impl, not `#[derive(Clone)]`: deriving would add a
// `D: Clone` bound that isn't actually needed — only `Arc<D>` is cloned,
// never `D` itself — and would wrongly block cloning e.g.
// `Breaker<InMemoryDriver, _>`, since `InMemoryDriver` isn't `Clone`.
impl<D, Sub: Clone> Clone for Breaker<D, Sub> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            subject: self.subject.clone(),
            key: self.key.clone(),
            max_failures: self.max_failures,
            timeout: self.timeout,
            jitter: self.jitter.clone(),
            snapshot: self.snapshot.clone(),
            last_jitter: self.last_jitter.clone(),
        }
    }
}

impl<D, Sub> Breaker<D, Sub> {
    pub fn builder(driver: Arc<D>, subject: Sub, key: impl Into<String>) -> BreakerBuilder<D, Sub> {
        BreakerBuilder::new(driver, subject, key)
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<D, Sub, Fut, T, E> Breaker<D, Sub>
where
    D: Driver,
    Sub: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
{
    /// Refresh the local snapshot from the driver, creating a fresh record
    /// if none exists yet.
    async fn load(&self) -> Result<(), BreakerError<E>> {
        let cached_checkin = self.snapshot.lock().unwrap().checkin;
        // Advisory no-op on backends with native TTL; reaps stale entries
        // on backends that need a nudge (e.g. the in-memory driver).
        self.driver.expire(&self.key, cached_checkin).await?;

        let record = match self.driver.load(&self.key).await {
            Ok(record) => record,
            Err(crate::error::DriverError::KeyNotFound)
            | Err(crate::error::DriverError::KeyExpired) => {
                tracing::debug!(key = %self.key, "no record found, creating a fresh one");
                self.driver.new_record(&self.key).await?
            }
            Err(other) => return Err(other.into()),
        };
        *self.snapshot.lock().unwrap() = record.into();
        Ok(())
    }

    fn sample_jitter(&self) -> f64 {
        let value = self.jitter.sample();
        *self.last_jitter.lock().unwrap() = Some(value);
        value
    }

    /// Invoke the wrapped operation, updating shared state with the
    /// outcome. The threshold is *not* enforced here — only the next
    /// admission check observes an incremented counter and trips the
    /// breaker. This tolerates a brief overshoot under concurrency by
    /// design: the alternative (locking around the check-then-increment)
    /// would defeat the point of a lock-free, per-call shared counter.
    ///
    /// A failed probe (`was_open` true) only increments the failure count;
    /// it does not call `driver.open()` again, so `checkin` is not
    /// refreshed and the cooldown does not restart. The next call sees the
    /// same stale checkin and is admitted as another probe.
    async fn invoke(&self, was_open: bool) -> Result<T, BreakerError<E>> {
        match (self.subject)().await {
            Ok(value) => {
                if was_open {
                    self.driver.close(&self.key).await?;
                    let mut snapshot = self.snapshot.lock().unwrap();
                    snapshot.status = Status::Closed;
                    snapshot.failures = 0;
                    tracing::info!(key = %self.key, "probe succeeded, breaker closed");
                }
                Ok(value)
            }
            Err(e) => {
                let failures = self.driver.failure(&self.key).await?;
                self.snapshot.lock().unwrap().failures = failures;
                tracing::warn!(key = %self.key, failures, "subject failed");
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Invoke the breaker. Performs, in order: refresh the shared snapshot,
    /// decide whether to admit the call, and — if admitted — run the
    /// subject and persist the outcome.
    pub async fn call(&self) -> Result<T, BreakerError<E>> {
        self.load().await?;

        let (status, failures, checkin) = {
            let snapshot = self.snapshot.lock().unwrap();
            (snapshot.status, snapshot.failures, snapshot.checkin)
        };

        match status {
            Status::Open => {
                let jitter = self.sample_jitter();
                let elapsed = self.driver.now() - checkin;
                if elapsed < self.timeout + jitter {
                    tracing::debug!(key = %self.key, elapsed, "breaker open, call rejected");
                    return Err(BreakerError::CircuitOpen);
                }
                tracing::info!(key = %self.key, jitter, "cooldown elapsed, admitting probe");
                self.invoke(true).await
            }
            Status::Closed if failures >= self.max_failures => {
                tracing::warn!(
                    key = %self.key,
                    failures,
                    max_failures = self.max_failures,
                    "threshold exceeded, tripping breaker"
                );
                self.driver.open(&self.key).await?;
                self.snapshot.lock().unwrap().status = Status::Open;
                Err(BreakerError::CircuitOpen)
            }
            Status::Closed => self.invoke(false).await,
        }
    }

    /// Reset the shared record to closed/zero-failures. Does not touch the
    /// local snapshot — the next call's `load` picks up the change.
    pub async fn reset(&self) -> Result<(), BreakerError<E>> {
        self.driver.reset(&self.key).await?;
        Ok(())
    }

    /// Force the breaker open, if it is currently closed.
    pub async fn open(&self) -> Result<(), BreakerError<E>> {
        let is_closed = self.snapshot.lock().unwrap().status == Status::Closed;
        if is_closed {
            self.driver.open(&self.key).await?;
            let now = self.driver.now();
            let mut snapshot = self.snapshot.lock().unwrap();
            snapshot.status = Status::Open;
            snapshot.checkin = now;
        }
        Ok(())
    }

    /// Force the breaker closed, if it is currently open.
    pub async fn close(&self) -> Result<(), BreakerError<E>> {
        let is_open = self.snapshot.lock().unwrap().status == Status::Open;
        if is_open {
            self.driver.close(&self.key).await?;
            self.snapshot.lock().unwrap().status = Status::Closed;
        }
        Ok(())
    }

    /// An observable view of the current local snapshot.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let snapshot = self.snapshot.lock().unwrap();
        BreakerSnapshot {
            status: snapshot.status,
            failures: snapshot.failures,
            timeout: self.timeout,
            checkin: snapshot.checkin,
            jitter: *self.last_jitter.lock().unwrap(),
            max_failures: self.max_failures,
        }
    }
}

impl<D, Sub> fmt::Display for Breaker<D, Sub> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot.lock().unwrap();
        let status = match snapshot.status {
            Status::Closed => "CLOSED",
            Status::Open => "OPEN",
        };
        let jitter = *self.last_jitter.lock().unwrap();
        write!(
            f,
            "<Breaker [{}] status={} failures={} checkin={}, jitter={:?}>",
            self.key, status, snapshot.failures, snapshot.checkin, jitter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::driver::InMemoryDriver;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct SubjectError;

    impl fmt::Display for SubjectError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "subject failed")
        }
    }
    impl std::error::Error for SubjectError {}

    fn breaker_on<F, Fut>(
        driver: Arc<InMemoryDriver>,
        subject: F,
        max_failures: u64,
        timeout: f64,
    ) -> Breaker<InMemoryDriver, F>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<u32, SubjectError>> + Send,
    {
        Breaker::builder(driver, subject, "k")
            .max_failures(max_failures)
            .timeout(timeout)
            .jitter(Jitter::fixed(0.0))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn successful_call_keeps_breaker_closed_with_zero_failures() {
        let driver = Arc::new(InMemoryDriver::new(None));
        let breaker = breaker_on(driver, || std::future::ready(Ok(42)), 5, 10.0);
        assert_eq!(breaker.call().await.unwrap(), 42);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.status, Status::Closed);
    }

    #[tokio::test]
    async fn trip_and_recover_scenario() {
        let clock = Arc::new(ManualClock::at(0.0));
        let driver = Arc::new(InMemoryDriver::with_clock(None, clock.clone()));
        let call_count = Arc::new(AtomicU64::new(0));
        let cc = call_count.clone();
        let subject = move || {
            let n = cc.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n == 1 || n == 2 { Err(SubjectError) } else { Ok(n as u32) })
        };
        let breaker = breaker_on(driver, subject, 2, 5.0);

        assert!(breaker.call().await.is_ok()); // call 1 -> value
        assert!(breaker.call().await.is_err()); // call 2 -> subject error, failures=1
        assert_eq!(breaker.snapshot().failures, 1);
        assert!(breaker.call().await.is_err()); // call 3 -> subject error, failures=2
        assert_eq!(breaker.snapshot().failures, 2);

        let err = breaker.call().await.unwrap_err(); // call 4 -> open
        assert!(err.is_circuit_open());
        let err = breaker.call().await.unwrap_err(); // call 5 -> still open
        assert!(err.is_circuit_open());

        clock.advance(6.0);

        let value = breaker.call().await.unwrap(); // call 6 -> probe succeeds
        assert_eq!(value, 5);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.status, Status::Closed);
        assert_eq!(snapshot.failures, 0);

        assert!(breaker.call().await.is_err()); // call 7 -> subject error, failures=1
        assert_eq!(breaker.snapshot().failures, 1);
    }

    #[tokio::test]
    async fn fresh_breaker_seeds_checkin_from_the_driver_clock() {
        let clock = Arc::new(ManualClock::at(1_000.0));
        let driver = Arc::new(InMemoryDriver::with_clock(Some(Duration::from_secs(180)), clock.clone()));
        let breaker = breaker_on(driver, || std::future::ready(Ok(1)), 5, 10.0);
        assert_eq!(breaker.snapshot().checkin, 1_000.0);
    }

    #[tokio::test]
    async fn a_second_breaker_sharing_a_driver_does_not_evict_an_existing_record() {
        let clock = Arc::new(ManualClock::at(1_000.0));
        let driver = Arc::new(InMemoryDriver::with_clock(Some(Duration::from_secs(180)), clock.clone()));

        // A sibling breaker has already tripped and recorded failures.
        let first = breaker_on(driver.clone(), || std::future::ready(Err::<u32, _>(SubjectError)), 1, 10.0);
        assert!(first.call().await.is_err());
        assert_eq!(first.snapshot().failures, 1);

        // Constructing a second breaker against the same key must not reset
        // `checkin` to the epoch — doing so would make the new breaker's
        // first advisory `expire()` call see an elapsed TTL and delete the
        // record `first` just wrote, before `second` ever reads it.
        let second = breaker_on(driver, || std::future::ready(Ok(1)), 1, 10.0);
        second.call().await.unwrap();
        assert_eq!(
            second.snapshot().failures,
            1,
            "second breaker observes the failure count first recorded, not a freshly reset one"
        );
    }

    #[tokio::test]
    async fn preloaded_open_entry_probes_after_cooldown() {
        let clock = Arc::new(ManualClock::at(0.0));
        let driver = Arc::new(InMemoryDriver::with_clock(None, clock.clone()));
        driver.new_record("k").await.unwrap();
        driver
            .update(
                "k",
                crate::record::RecordUpdate::new()
                    .failures(2)
                    .status(Status::Open)
                    .checkin(0.0),
            )
            .await
            .unwrap();

        let breaker = breaker_on(driver, || std::future::ready(Ok::<u32, SubjectError>(1)), 10, 5.0);

        let err = breaker.call().await.unwrap_err();
        assert!(err.is_circuit_open());

        clock.advance(6.0);

        let value = breaker.call().await.unwrap();
        assert_eq!(value, 1);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.status, Status::Closed);
        assert_eq!(snapshot.failures, 0);
    }

    #[tokio::test]
    async fn failing_probe_leaves_breaker_open_without_blocking_the_next_probe() {
        // A failed probe does not call driver.open(), so checkin is never
        // refreshed — the cooldown does not restart. The next call sees the
        // same stale checkin, still past the cooldown, and is admitted as
        // another probe rather than rejected. This is a literal port of the
        // original source's behavior: see the design note on checkin only
        // being refreshed by an explicit open().
        let clock = Arc::new(ManualClock::at(0.0));
        let driver = Arc::new(InMemoryDriver::with_clock(None, clock.clone()));
        driver.new_record("k").await.unwrap();
        driver
            .update(
                "k",
                crate::record::RecordUpdate::new()
                    .failures(2)
                    .status(Status::Open)
                    .checkin(0.0),
            )
            .await
            .unwrap();

        let breaker = breaker_on(driver, || std::future::ready(Err::<u32, _>(SubjectError)), 2, 5.0);
        clock.advance(6.0);

        let err = breaker.call().await.unwrap_err();
        assert!(matches!(err, BreakerError::Inner(SubjectError)));
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.status, Status::Open, "failed probe leaves breaker open");
        assert_eq!(snapshot.failures, 3);

        let err = breaker.call().await.unwrap_err();
        assert!(matches!(err, BreakerError::Inner(SubjectError)), "still admitted as a probe");
        assert_eq!(breaker.snapshot().failures, 4);
    }

    #[tokio::test]
    async fn forced_open_and_close_bypass_the_subject() {
        let driver = Arc::new(InMemoryDriver::new(None));
        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        let breaker = breaker_on(
            driver,
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Ok::<u32, SubjectError>(1))
            },
            5,
            10.0,
        );

        breaker.call().await.unwrap();
        breaker.open().await.unwrap();
        assert_eq!(breaker.snapshot().status, Status::Open);

        let err = breaker.call().await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "subject not invoked while forced open");

        breaker.close().await.unwrap();
        assert_eq!(breaker.snapshot().status, Status::Closed);
        breaker.call().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cloned_breaker_shares_the_local_snapshot() {
        let driver = Arc::new(InMemoryDriver::new(None));
        let breaker = breaker_on(driver, || std::future::ready(Ok(1)), 5, 10.0);
        let cloned = breaker.clone();

        breaker.call().await.unwrap();
        assert_eq!(cloned.snapshot().failures, 0);
        breaker.open().await.unwrap();
        assert_eq!(cloned.snapshot().status, Status::Open, "clone observes the same cache");
    }

    #[tokio::test]
    async fn display_reports_key_status_and_failures() {
        let driver = Arc::new(InMemoryDriver::new(None));
        let breaker = breaker_on(driver, || std::future::ready(Ok::<u32, SubjectError>(1)), 5, 10.0);
        breaker.call().await.unwrap();
        let text = format!("{breaker}");
        assert!(text.contains("[k]"));
        assert!(text.contains("CLOSED"));
    }

    #[derive(Clone, Default)]
    struct CapturingWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturingWriter {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn rejected_call_is_logged_at_debug() {
        let writer = CapturingWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let driver = Arc::new(InMemoryDriver::new(None));
        let breaker = breaker_on(driver, || std::future::ready(Err::<u32, _>(SubjectError)), 1, 100.0);
        breaker.open().await.unwrap();
        let err = breaker.call().await.unwrap_err();
        assert!(err.is_circuit_open());

        drop(_guard);
        let log = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("breaker open, call rejected"), "log was: {log}");
    }
}
