// ABOUTME: Main library entry point for the retrying transaction layer
// ABOUTME: Pooled PostgreSQL and Redis clients sharing one transaction runner
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # txrunner
//!
//! Run a unit of work inside a database transaction, retry it on
//! serialization conflicts with randomized backoff, nest sub-transactions as
//! savepoints, and roll back explicitly while still returning a value.
//!
//! ## Features
//!
//! - **Named-server pools**: one lazily opened pool per declared server
//! - **One runner, two stores**: `PostgreSQL` (savepoints) and Redis (`WATCH` + `MULTI`/`EXEC`)
//! - **Explicit rollback**: [`Rollback::with`] rolls back the current level and yields a value
//! - **Bounded retries**: conflicts re-run the whole unit of work until the budget is spent
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use txrunner::config::StoreConfig;
//! use txrunner::store::PostgresConnector;
//! use txrunner::{params, Pool, TransactionOptions, TxError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TxError> {
//!     let config = StoreConfig::from_env("postgres")?;
//!     let pool = Pool::new(PostgresConnector, config);
//!
//!     let mut client = pool.acquire("default").await?;
//!     let moved = client
//!         .transaction(TransactionOptions::named("transfer"), |tx, rollback| {
//!             Box::pin(async move {
//!                 let debited = tx
//!                     .execute(
//!                         "UPDATE accounts SET balance = balance - $1 WHERE id = $2 AND balance >= $1",
//!                         &params![25_i64, 1_i64],
//!                     )
//!                     .await?;
//!                 if debited == 0 {
//!                     return Err(rollback.with(0_i64));
//!                 }
//!                 tx.execute(
//!                     "UPDATE accounts SET balance = balance + $1 WHERE id = $2",
//!                     &params![25_i64, 2_i64],
//!                 )
//!                 .await?;
//!                 Ok(25_i64)
//!             })
//!         })
//!         .await;
//!     client.release();
//!
//!     println!("moved {}", moved?);
//!     Ok(())
//! }
//! ```

/// Checked-out client and its lease on a pool slot
pub mod client;

/// Store sections, server declarations, and the dotted-path config provider
pub mod config;

/// Structured logging setup
pub mod logging;

/// Statement parameters and trace rendering
pub mod params;

/// Named-server connection pool
pub mod pool;

/// Injectable randomness for backoff delays and savepoint names
pub mod random;

/// `PostgreSQL` and Redis backends
pub mod store;

/// Retrying transaction runner
pub mod transaction;

pub use client::Client;
pub use params::{Param, ParamKind};
pub use pool::{Pool, PoolStats, StoreConnector};
pub use random::{ChaChaRandom, RandomSource};
pub use transaction::{
    IsolationLevel, RetryPolicy, Rollback, RollbackSignal, RollbackTarget, TransactionBackend,
    TransactionOptions, TxError, WorkFuture,
};

/// Error types shared with the core crate
pub use txrunner_core::errors;
/// Constants shared with the core crate
pub use txrunner_core::constants;
