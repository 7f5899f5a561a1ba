//! Injectable randomness (`SPEC_FULL.md` §9).
//!
//! The loopback transport's field synthesis and read-outcome lottery both
//! need randomness that tests can pin down; everything that needs a random
//! choice goes through this trait instead of calling `rand::thread_rng()`
//! directly.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// A source of randomness for the loopback simulator.
pub trait RandomSource: Send + Sync {
    /// An integer in `lo..=hi`, inclusive.
    fn range_u32(&self, lo: u32, hi: u32) -> u32;
    /// A float in `lo..hi`.
    fn range_f64(&self, lo: f64, hi: f64) -> f64;
    /// A uniform index into `0..len`.
    fn index(&self, len: usize) -> usize;
    /// `len` random alphanumeric characters.
    fn alphanumeric(&self, len: usize) -> String;
}

/// The production implementation, backed by `rand::thread_rng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn range_u32(&self, lo: u32, hi: u32) -> u32 {
        rand::thread_rng().gen_range(lo..=hi)
    }

    fn range_f64(&self, lo: f64, hi: f64) -> f64 {
        rand::thread_rng().gen_range(lo..hi)
    }

    fn index(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..len)
        }
    }

    fn alphanumeric(&self, len: usize) -> String {
        rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
    }
}

/// Deterministic [`RandomSource`] implementations, public so integration
/// tests outside this crate can force specific loopback branches too.
pub mod test_support {
    use super::RandomSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic source: cycles through a fixed script of `u32` draws for
    /// `range_u32`/`index`, and returns fixed values elsewhere. Used to force
    /// specific loopback branches (e.g. the read-outcome lottery) in tests.
    pub struct ScriptedRandom {
        script: Vec<u32>,
        cursor: AtomicUsize,
    }

    impl ScriptedRandom {
        pub fn new(script: Vec<u32>) -> Self {
            Self { script, cursor: AtomicUsize::new(0) }
        }

        fn next(&self) -> u32 {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.script[i % self.script.len()]
        }
    }

    impl RandomSource for ScriptedRandom {
        // Clamped rather than reduced modulo the range: callers (notably the
        // loopback read-outcome lottery) script the exact outcome number they
        // want to force, e.g. `vec![3]` to land on outcome 3.
        fn range_u32(&self, lo: u32, hi: u32) -> u32 {
            self.next().clamp(lo, hi)
        }

        fn range_f64(&self, lo: f64, hi: f64) -> f64 {
            lo + (self.next() as f64 / u32::MAX as f64) * (hi - lo)
        }

        fn index(&self, len: usize) -> usize {
            if len == 0 {
                0
            } else {
                (self.next() as usize) % len
            }
        }

        fn alphanumeric(&self, len: usize) -> String {
            "A".repeat(len)
        }
    }
}
