//! Handshake nonce generation

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Characters a nonce is drawn from
pub const NONCE_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZÅÄÖabcdefghijklmnopqrstuvwxyzåäö0123456789";

/// Shortest nonce, in characters
pub const NONCE_MIN_LEN: usize = 8;

/// Longest nonce, in characters
pub const NONCE_MAX_LEN: usize = 15;

/// Random source for handshake nonces, seeded once when created
///
/// Nonces only make successive handshakes differ on the wire; they are not
/// secrets.
pub struct NonceGenerator {
    alphabet: Vec<char>,
    rng: Mutex<StdRng>,
}

impl NonceGenerator {
    /// Create a generator seeded from OS entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a deterministic generator
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        NonceGenerator {
            alphabet: NONCE_ALPHABET.chars().collect(),
            rng: Mutex::new(rng),
        }
    }

    /// Draw a nonce of 8 to 15 characters
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let len = rng.gen_range(NONCE_MIN_LEN..=NONCE_MAX_LEN);
        (0..len)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect()
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}
