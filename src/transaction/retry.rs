// ABOUTME: Retry budget and randomized backoff for conflicting transactions
// ABOUTME: Attempt-count based; the delay is drawn uniformly between the configured bounds
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use txrunner_core::constants::retry;

/// Tunable retry parameters carried by every client
///
/// The worst-case time spent retrying is `max_retries * max_delay_ms`; there is
/// no wall-clock limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Conflicting attempts tolerated before giving up
    pub max_retries: u32,
    /// Lower bound of the delay between attempts, in milliseconds
    pub min_delay_ms: u64,
    /// Upper bound of the delay between attempts, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            min_delay_ms: retry::DEFAULT_MIN_DELAY_MS,
            max_delay_ms: retry::DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts
    #[must_use]
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            min_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Whether the `conflicts`th conflicting attempt still leaves budget for another
    #[must_use]
    pub const fn allows(&self, conflicts: u32) -> bool {
        conflicts <= self.max_retries
    }

    /// Draw the next backoff delay
    pub fn next_delay(&self, random: &mut dyn RandomSource) -> Duration {
        Duration::from_millis(random.random_int(self.min_delay_ms, self.max_delay_ms))
    }
}
