// ABOUTME: Checked-out client wrapping one backend connection and its transaction state
// ABOUTME: Non-cloneable handle whose release consumes it, returning the connection exactly once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::pool::PoolStats;
use crate::random::{ChaChaRandom, RandomSource};
use crate::transaction::{RetryPolicy, TransactionBackend};
use std::sync::Arc;
use tracing::{debug, warn};
use txrunner_core::errors::DbResult;

/// Claim on a pool slot, settled exactly once
#[derive(Debug)]
pub(crate) struct Lease {
    server: String,
    stats: Arc<PoolStats>,
}

impl Lease {
    pub(crate) fn new(server: impl Into<String>, stats: Arc<PoolStats>) -> Self {
        stats.record_acquire();
        Self {
            server: server.into(),
            stats,
        }
    }

    fn settle(self) {
        self.stats.record_release();
        debug!(server = %self.server, "Client released to pool");
    }
}

/// One checked-out connection plus its transaction bookkeeping
///
/// A client is owned by exactly one unit of work at a time. Nested
/// transactions reuse it and bump the depth counter instead of acquiring a new
/// connection. Call [`Client::release`] once finished; it consumes the client,
/// so a second release cannot compile.
pub struct Client<B: TransactionBackend> {
    pub(crate) backend: B,
    pub(crate) depth: u32,
    pub(crate) random: Box<dyn RandomSource>,
    /// Retry tuning for transactions started on this client
    pub retry: RetryPolicy,
    lease: Option<Lease>,
}

impl<B: TransactionBackend> Client<B> {
    /// Wrap a backend connection that does not belong to a pool
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            depth: 0,
            random: Box::new(ChaChaRandom::from_entropy()),
            retry: RetryPolicy::default(),
            lease: None,
        }
    }

    pub(crate) fn leased(backend: B, retry: RetryPolicy, lease: Lease) -> Self {
        Self {
            backend,
            depth: 0,
            random: Box::new(ChaChaRandom::from_entropy()),
            retry,
            lease: Some(lease),
        }
    }

    /// Replace the random source used for retry delays and savepoint names
    #[must_use]
    pub fn with_random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current nesting depth; 0 outside any transaction
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Whether a transaction is running on this client
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Borrow the backend connection
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutably borrow the backend connection
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Round trip to the store
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unusable
    pub async fn ping(&mut self) -> DbResult<()> {
        self.backend.ping().await
    }

    /// Return the connection to its pool
    pub fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.settle();
        }
    }
}

impl<B: TransactionBackend> Drop for Client<B> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            warn!(
                server = %lease.server,
                depth = self.depth,
                "Client dropped without release - returning connection to pool"
            );
            lease.settle();
        }
    }
}
