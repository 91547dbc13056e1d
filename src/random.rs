// ABOUTME: Injectable random source for retry delays and savepoint names
// ABOUTME: ChaCha-based default implementation, seedable for deterministic tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const ALPHANUMERIC_LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Source of randomness consumed by the transaction runner
///
/// Savepoint names only need to be collision-improbable within one
/// transaction tree, so nothing here is required to be cryptographically secure.
pub trait RandomSource: Send {
    /// Uniform integer in `min..=max`; bounds given in either order
    fn random_int(&mut self, min: u64, max: u64) -> u64;

    /// Lowercase alphanumeric string of `len` characters
    fn random_string(&mut self, len: usize) -> String;
}

/// Default random source backed by `ChaCha8`
#[derive(Debug, Clone)]
pub struct ChaChaRandom {
    rng: ChaCha8Rng,
}

impl ChaChaRandom {
    /// Seed from operating system entropy
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Deterministic sequence for a given seed
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Default for ChaChaRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for ChaChaRandom {
    fn random_int(&mut self, min: u64, max: u64) -> u64 {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        self.rng.gen_range(low..=high)
    }

    fn random_string(&mut self, len: usize) -> String {
        let index = Uniform::from(0..ALPHANUMERIC_LOWER.len());
        (0..len)
            .map(|_| char::from(ALPHANUMERIC_LOWER[index.sample(&mut self.rng)]))
            .collect()
    }
}
