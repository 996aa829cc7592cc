//! Nonce material drawn from a fixed alphanumeric alphabet.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::time_utils::unix_nanos;

/// The 62 characters nonces are drawn from.
pub const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A source of random strings over [`ALPHABET`].
///
/// Sessions receive this as an `Arc<dyn RandomSource>` so tests can swap in
/// a deterministic or counting implementation.
pub trait RandomSource: Send + Sync {
    /// Returns exactly `length` characters, each sampled uniformly and
    /// independently from [`ALPHABET`].
    fn generate(&self, length: usize) -> String;
}

/// A pseudo-random stream seeded once at construction.
///
/// The generator sits behind a mutex, so a single instance can be shared by
/// every session in the process without two requests ever observing the same
/// position in the stream.
///
/// # Example
///
/// ```rust
/// use signed_proxy::{RandomSource, SeededRandom};
///
/// let random = SeededRandom::from_time_seed();
/// let token = random.generate(18);
/// assert_eq!(token.len(), 18);
/// ```
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Seeds from the current time in nanoseconds.
    pub fn from_time_seed() -> Self {
        Self::from_seed(unix_nanos())
    }

    /// Seeds from a fixed value. Two instances with the same seed produce the
    /// same stream.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::from_time_seed()
    }
}

impl RandomSource for SeededRandom {
    fn generate(&self, length: usize) -> String {
        // A panic while holding the lock leaves the rng itself intact.
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        (0..length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}
