//! Jitter strategies to prevent a thundering herd of probes after an outage.
//!
//! Independent callers sampling jitter independently spreads their probe
//! attempts across a jitter-sized window once the cooldown elapses, instead
//! of every caller retrying the recovering downstream in the same instant.

use rand::Rng;
use std::sync::{Arc, Mutex};

/// Per-call jitter added to the OPEN-state cooldown comparison.
#[derive(Clone)]
pub enum Jitter {
    /// Uniform integer seconds in `[0, 10]`, sampled fresh on every access.
    Default,
    /// A fixed number of seconds, the same on every access.
    Fixed(f64),
    /// A caller-supplied generator, invoked fresh on every access. Tests
    /// supply a deterministic one here instead of reaching for process-wide
    /// random state. `Arc`, not `Box`, so a `Jitter` — and in turn a
    /// `Breaker` holding one — can be cloned.
    Custom(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl std::fmt::Debug for Jitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "Jitter::Default"),
            Self::Fixed(v) => write!(f, "Jitter::Fixed({v})"),
            Self::Custom(_) => write!(f, "Jitter::Custom(<fn>)"),
        }
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::Default
    }
}

impl Jitter {
    /// A constant jitter value.
    pub fn fixed(seconds: f64) -> Self {
        Self::Fixed(seconds)
    }

    /// A caller-supplied jitter generator.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// A reproducible jitter sequence, for tests that assert on the exact
    /// numbers a fixed seed produces.
    pub fn seeded(seed: u64) -> Self {
        use rand::SeedableRng;
        let rng = Mutex::new(rand::rngs::StdRng::seed_from_u64(seed));
        Self::custom(move || rng.lock().unwrap().random_range(0..=10) as f64)
    }

    /// Sample the jitter value for this access.
    pub fn sample(&self) -> f64 {
        match self {
            Self::Default => rand::rng().random_range(0..=10) as f64,
            Self::Fixed(v) => *v,
            Self::Custom(f) => f(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_jitter_never_changes() {
        let jitter = Jitter::fixed(3.5);
        for _ in 0..10 {
            assert_eq!(jitter.sample(), 3.5);
        }
    }

    #[test]
    fn default_jitter_stays_in_bounds() {
        let jitter = Jitter::Default;
        for _ in 0..200 {
            let v = jitter.sample();
            assert!((0.0..=10.0).contains(&v));
        }
    }

    #[test]
    fn seeded_jitter_is_reproducible() {
        let a = Jitter::seeded(1);
        let b = Jitter::seeded(1);
        let sequence_a: Vec<f64> = (0..5).map(|_| a.sample()).collect();
        let sequence_b: Vec<f64> = (0..5).map(|_| b.sample()).collect();
        assert_eq!(sequence_a, sequence_b);
    }

    #[test]
    fn custom_jitter_invokes_the_closure_each_time() {
        let counter = std::sync::atomic::AtomicU64::new(0);
        let jitter = Jitter::custom(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) as f64
        });
        assert_eq!(jitter.sample(), 0.0);
        assert_eq!(jitter.sample(), 1.0);
        assert_eq!(jitter.sample(), 2.0);
    }
}
