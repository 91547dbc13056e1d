// ABOUTME: Process-wide connection pool keyed by logical server name
// ABOUTME: Lazily opens one store handle per server and hands out leased clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Connection pooling
//!
//! A [`Pool`] owns a map from server name to a store-specific handle (an
//! `sqlx` pool, a set of Redis connections, ...). The handle for a server is
//! opened the first time that server is acquired and lives as long as the
//! pool. Concurrent first acquisitions of the same server open it once.

use crate::client::{Client, Lease};
use crate::config::{ServerConfig, StoreConfig};
use crate::transaction::TransactionBackend;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use txrunner_core::errors::DbResult;

/// Store-specific half of the pool: opens per-server handles and checks out connections
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
    /// Per-server pool handle
    type Handle: Send + Sync + 'static;
    /// Checked-out connection driven by the transaction runner
    type Backend: TransactionBackend;

    /// Open the handle for one declared server
    async fn open(&self, server: &str, config: &ServerConfig) -> DbResult<Self::Handle>;

    /// Check out one connection from an open handle
    async fn checkout(&self, handle: &Self::Handle) -> DbResult<Self::Backend>;
}

/// Acquire/release counters
#[derive(Debug, Default)]
pub struct PoolStats {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PoolStats {
    pub(crate) fn record_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    /// Clients handed out so far
    #[must_use]
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Clients returned so far
    #[must_use]
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Clients currently checked out
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }
}

/// Named-server connection pool for one store type
pub struct Pool<C: StoreConnector> {
    connector: C,
    config: StoreConfig,
    handles: DashMap<String, Arc<OnceCell<C::Handle>>>,
    stats: Arc<PoolStats>,
}

impl<C: StoreConnector> Pool<C> {
    /// Create a pool; no connection is opened until the first `acquire`
    #[must_use]
    pub fn new(connector: C, config: StoreConfig) -> Self {
        Self {
            connector,
            config,
            handles: DashMap::new(),
            stats: Arc::new(PoolStats::default()),
        }
    }

    /// Check out a client for `server`
    ///
    /// The returned client carries the store section's retry policy and must
    /// be released with [`Client::release`] on every path.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::Configuration` when `server` is not declared
    /// - `DatabaseError::Config` when its pool sizing cannot be satisfied
    /// - `DatabaseError::Connection` when the server cannot be reached
    pub async fn acquire(&self, server: &str) -> DbResult<Client<C::Backend>> {
        let config = self.config.server(server)?;
        config.validate(server)?;
        let cell = self.handle_cell(server);
        let handle = cell
            .get_or_try_init(|| async {
                info!(
                    server = %server,
                    min_connections = config.min_connections,
                    max_connections = config.max_connections,
                    "Opening connection pool"
                );
                self.connector.open(server, config).await
            })
            .await?;

        let backend = self.connector.checkout(handle).await?;
        debug!(server = %server, "Client acquired from pool");
        Ok(Client::leased(
            backend,
            self.config.retry,
            Lease::new(server, Arc::clone(&self.stats)),
        ))
    }

    /// Acquire, ping, and release
    ///
    /// # Errors
    ///
    /// Returns an error if the server is undeclared or does not answer
    pub async fn health_check(&self, server: &str) -> DbResult<()> {
        let mut client = self.acquire(server).await?;
        let result = client.ping().await;
        client.release();
        result
    }

    /// Declared server names
    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.config.servers.keys().map(String::as_str)
    }

    /// Whether the handle for `server` has been opened
    #[must_use]
    pub fn is_open(&self, server: &str) -> bool {
        self.handles
            .get(server)
            .is_some_and(|cell| cell.initialized())
    }

    /// Acquire/release counters
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Store configuration this pool was built from
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn handle_cell(&self, server: &str) -> Arc<OnceCell<C::Handle>> {
        // Clone the cell out so no map guard is held across the open await
        Arc::clone(
            self.handles
                .entry(server.to_owned())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        )
    }
}
