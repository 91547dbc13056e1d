// ABOUTME: Retrying transaction runner shared by every store backend
// ABOUTME: Drives BEGIN/SAVEPOINT, COMMIT/ROLLBACK, rollback signals, and conflict retries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Transaction execution with retries and savepoint nesting
//!
//! This module provides:
//! - `Client::transaction`: run a unit of work inside a transaction
//! - `TransactionBackend`: the per-store capability set the runner drives
//! - `Rollback` / `TxError`: explicit rollback that still yields a value
//!
//! ## Root transactions
//!
//! The first `transaction()` call on a client issues `BEGIN`, runs the unit of
//! work and issues `COMMIT`. Any failure along the way rolls back. A conflict
//! the backend classifies as retryable re-runs the whole attempt from `BEGIN`
//! after a randomized delay, until the client's [`RetryPolicy`] is spent.
//!
//! ## Nested transactions
//!
//! A `transaction()` call made from inside a unit of work opens a savepoint on
//! the same connection. Stores without savepoints reject the nested call with
//! `DatabaseError::Nesting`.
//!
//! ## Example
//!
//! ```text
//! let total = client
//!     .transaction(TransactionOptions::named("transfer"), |tx, rollback| {
//!         Box::pin(async move {
//!             tx.execute("UPDATE accounts SET balance = balance - $1 WHERE id = $2", &params![10, 1]).await?;
//!             if insufficient {
//!                 return Err(rollback.with(0_i64));
//!             }
//!             Ok(10_i64)
//!         })
//!     })
//!     .await?;
//! ```

/// Store capability trait driven by the runner
pub mod backend;
/// Per-call options
pub mod options;
/// Retry budget and backoff
pub mod retry;
/// Rollback capability and unit-of-work error type
pub mod signal;

pub use backend::TransactionBackend;
pub use options::{IsolationLevel, TransactionOptions};
pub use retry::RetryPolicy;
pub use signal::{Rollback, RollbackSignal, RollbackTarget, TxError};

use crate::client::Client;
use futures_util::future::BoxFuture;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use txrunner_core::constants::savepoint;
use txrunner_core::errors::{DatabaseError, QueryError};

/// Future returned by a unit of work
pub type WorkFuture<'c, T> = BoxFuture<'c, Result<T, TxError>>;

/// How one root attempt ended
enum Attempt<T> {
    Committed(T),
    RolledBack(T),
    Retry(QueryError),
    Fatal(TxError),
}

impl<B: TransactionBackend> Client<B> {
    /// Run `work` inside a transaction on this client
    ///
    /// `work` receives the client (for queries and nested transactions) and a
    /// [`Rollback`] handle for the level it runs at. It may be invoked several
    /// times when a root attempt is retried, so it must not assume it runs once.
    ///
    /// The depth counter is restored before this returns, on every path.
    ///
    /// # Errors
    ///
    /// - `DatabaseError::Nesting` when nesting is requested on a store without savepoints
    /// - `DatabaseError::RetryExhausted` after more than `retry.max_retries` conflicts
    /// - `DatabaseError::InvalidRollback` for a rollback aimed at no open level
    /// - any other error returned by `work` or by the store, unchanged
    ///
    /// A nested call can also return `TxError::Rollback` when the signal targets
    /// an enclosing level; propagate it with `?`.
    pub fn transaction<'a, T, F>(
        &'a mut self,
        options: TransactionOptions,
        mut work: F,
    ) -> BoxFuture<'a, Result<T, TxError>>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self, Rollback<T>) -> WorkFuture<'c, T> + Send + 'a,
    {
        Box::pin(async move {
            if self.depth > 0 && !self.backend.supports_savepoints() {
                return Err(DatabaseError::Nesting {
                    name: options.display_name().to_owned(),
                }
                .into());
            }

            self.depth += 1;
            let result = if self.depth == 1 {
                self.run_root(&options, &mut work).await
            } else {
                self.run_savepoint(&options, &mut work).await
            };
            self.depth -= 1;
            result
        })
    }

    async fn run_root<T, F>(
        &mut self,
        options: &TransactionOptions,
        work: &mut F,
    ) -> Result<T, TxError>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self, Rollback<T>) -> WorkFuture<'c, T> + Send,
    {
        let name = options.display_name();
        let mut conflicts: u32 = 0;

        loop {
            match self.attempt_root(options, work).await {
                Attempt::Committed(value) => {
                    debug!(transaction = %name, retries = conflicts, "Transaction committed");
                    return Ok(value);
                }
                Attempt::RolledBack(value) => {
                    debug!(transaction = %name, "Transaction rolled back on request");
                    return Ok(value);
                }
                Attempt::Fatal(failure) => return Err(failure),
                Attempt::Retry(conflict) => {
                    conflicts += 1;
                    if !self.retry.allows(conflicts) {
                        error!(
                            transaction = %name,
                            attempts = conflicts,
                            max_retries = self.retry.max_retries,
                            error = %conflict,
                            "Transaction failed after max retries"
                        );
                        return Err(DatabaseError::RetryExhausted {
                            name: name.to_owned(),
                            attempts: conflicts,
                            source: Box::new(conflict),
                        }
                        .into());
                    }

                    let delay = self.retry.next_delay(self.random.as_mut());
                    warn!(
                        transaction = %name,
                        attempt = conflicts,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %conflict,
                        "Serialization failure, retrying transaction after backoff"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_root<T, F>(&mut self, options: &TransactionOptions, work: &mut F) -> Attempt<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self, Rollback<T>) -> WorkFuture<'c, T> + Send,
    {
        let failure = match self.begin_run_commit(options, work).await {
            Ok(value) => return Attempt::Committed(value),
            Err(failure) => failure,
        };

        if let Err(rollback_error) = self.backend.rollback().await {
            warn!(
                transaction = %options.display_name(),
                error = %rollback_error,
                "Rollback after failed attempt also failed"
            );
        }

        self.classify_root(failure)
    }

    async fn begin_run_commit<T, F>(
        &mut self,
        options: &TransactionOptions,
        work: &mut F,
    ) -> Result<T, TxError>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self, Rollback<T>) -> WorkFuture<'c, T> + Send,
    {
        self.backend.begin(options).await?;
        let value = work(self, Rollback::root()).await?;
        self.backend.commit().await?;
        Ok(value)
    }

    fn classify_root<T: 'static>(&self, failure: TxError) -> Attempt<T> {
        match failure {
            TxError::Rollback(signal) if *signal.target() == RollbackTarget::Root => {
                match signal.into_value::<T>() {
                    Ok(value) => Attempt::RolledBack(value),
                    Err(mismatch) => Attempt::Fatal(mismatch.into()),
                }
            }
            TxError::Rollback(signal) => Attempt::Fatal(
                DatabaseError::InvalidRollback {
                    message: format!("no open transaction level matches {}", signal.target()),
                }
                .into(),
            ),
            TxError::Database(DatabaseError::Query(conflict))
                if self.backend.is_retryable(&conflict) =>
            {
                Attempt::Retry(conflict)
            }
            other => Attempt::Fatal(other),
        }
    }

    async fn run_savepoint<T, F>(
        &mut self,
        options: &TransactionOptions,
        work: &mut F,
    ) -> Result<T, TxError>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self, Rollback<T>) -> WorkFuture<'c, T> + Send,
    {
        let name = format!(
            "{}{}",
            savepoint::NAME_PREFIX,
            self.random.random_string(savepoint::NAME_RANDOM_LEN)
        );
        self.backend.savepoint(&name).await?;

        let target = RollbackTarget::Savepoint(name.clone());
        match work(self, Rollback::savepoint(name.clone())).await {
            Ok(value) => Ok(value),
            Err(TxError::Rollback(signal)) if *signal.target() == target => {
                self.backend.rollback_to_savepoint(&name).await?;
                debug!(
                    transaction = %options.display_name(),
                    savepoint = %name,
                    "Savepoint rolled back on request"
                );
                Ok(signal.into_value::<T>()?)
            }
            Err(failure) => {
                // Leave the enclosing level usable if it chooses to continue
                if let Err(undo) = self.backend.rollback_to_savepoint(&name).await {
                    warn!(
                        transaction = %options.display_name(),
                        savepoint = %name,
                        error = %undo,
                        "Could not roll back savepoint after failure"
                    );
                }
                Err(failure)
            }
        }
    }
}
