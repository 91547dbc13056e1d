// ABOUTME: Capability trait each store implements for the transaction runner
// ABOUTME: Begin/savepoint, commit, rollback, and conflict classification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::TransactionOptions;
use async_trait::async_trait;
use txrunner_core::errors::{DatabaseError, DbResult, QueryError};

/// Store operations the runner needs to drive one transaction tree
///
/// The runner owns nesting depth, retries, and rollback signalling; a backend
/// only translates each step into its store's commands and says which failures
/// are worth another attempt.
#[async_trait]
pub trait TransactionBackend: Send {
    /// Whether nested levels can be expressed as savepoints
    fn supports_savepoints(&self) -> bool;

    /// Start a root transaction
    async fn begin(&mut self, options: &TransactionOptions) -> DbResult<()>;

    /// Make the root transaction durable
    async fn commit(&mut self) -> DbResult<()>;

    /// Abandon the root transaction
    async fn rollback(&mut self) -> DbResult<()>;

    /// Open a named savepoint inside the running transaction
    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        Err(DatabaseError::Nesting {
            name: name.to_owned(),
        })
    }

    /// Undo everything since the named savepoint
    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        Err(DatabaseError::Nesting {
            name: name.to_owned(),
        })
    }

    /// Whether an attempt that failed with `error` should be re-run from the start
    fn is_retryable(&self, error: &QueryError) -> bool;

    /// Cheap round trip proving the connection is usable
    async fn ping(&mut self) -> DbResult<()>;
}
