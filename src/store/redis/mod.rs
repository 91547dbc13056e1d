// ABOUTME: Redis backend: optimistic transactions with WATCH and a queued MULTI/EXEC batch
// ABOUTME: A nil EXEC reply is reported as a retryable watch conflict
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Redis transactions
//!
//! Redis has a single transaction level. Reads run immediately through
//! [`Client::execute`], writes are queued with [`Client::queue`] and sent as
//! one `MULTI`/`EXEC` batch when the root transaction commits. Keys named in
//! [`TransactionOptions::watch`] are `WATCH`ed before the unit of work runs,
//! so a concurrent write to any of them turns the commit into a conflict and
//! the runner re-runs the attempt.

/// Dedicated connection slots per server
pub mod connections;
/// Pending command batch
pub mod queue;

pub use self::connections::{Checkout, RedisHandle};
pub use self::queue::{resolve_command, OperationQueue, QueuedCommand};

use crate::client::Client;
use crate::config::ServerConfig;
use crate::params::{render_all, Param};
use crate::pool::{Pool, StoreConnector};
use crate::store::QUERY_TRACE_TARGET;
use crate::transaction::{TransactionBackend, TransactionOptions};
use async_trait::async_trait;
use self::queue::describe_batch;
use ::redis::aio::ConnectionLike;
use ::redis::{FromRedisValue, RedisError, Value};
use tracing::debug;
use txrunner_core::constants::conflict::WATCH_CONFLICT;
use txrunner_core::errors::{DatabaseError, DbResult, QueryError};

/// Pool of Redis clients
pub type RedisPool = Pool<RedisConnector>;

/// Opens a [`RedisHandle`] per declared server
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl StoreConnector for RedisConnector {
    type Handle = RedisHandle;
    type Backend = RedisBackend;

    async fn open(&self, server: &str, config: &ServerConfig) -> DbResult<RedisHandle> {
        RedisHandle::open(server, config).await
    }

    async fn checkout(&self, handle: &RedisHandle) -> DbResult<RedisBackend> {
        Ok(RedisBackend::new(handle.checkout().await?))
    }
}

/// One checked-out Redis connection with its pending batch
pub struct RedisBackend {
    checkout: Checkout,
    session: Session,
}

impl RedisBackend {
    /// Wrap a checked-out connection
    #[must_use]
    pub const fn new(checkout: Checkout) -> Self {
        Self {
            checkout,
            session: Session::new(),
        }
    }

    /// Run one command immediately, outside the queued batch
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` for rejected command names, server
    /// errors, and replies that do not convert to `T`
    pub async fn execute<T: FromRedisValue>(
        &mut self,
        command: &str,
        params: &[Param],
    ) -> DbResult<T> {
        let name = resolve_command(command)?;
        let mut cmd = ::redis::cmd(&name);
        for param in params {
            cmd.arg(param.to_bytes());
        }
        let line = QueuedCommand {
            name: name.clone(),
            args: params.to_vec(),
        }
        .render();
        debug!(target: QUERY_TRACE_TARGET, command = %line, "Executing command");
        cmd.query_async(self.checkout.conn())
            .await
            .map_err(|e| command_error(&name, params, e))
    }

    /// Pending batch
    #[must_use]
    pub const fn queue(&self) -> &OperationQueue {
        &self.session.queue
    }

    /// Mutable pending batch
    pub fn queue_mut(&mut self) -> &mut OperationQueue {
        &mut self.session.queue
    }

    /// Replies of the last committed batch, one per queued command
    #[must_use]
    pub fn last_exec(&self) -> &[Value] {
        &self.session.last_exec
    }

    /// Whether a `WATCH` is outstanding on this connection
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.session.watching
    }
}

#[async_trait]
impl TransactionBackend for RedisBackend {
    fn supports_savepoints(&self) -> bool {
        false
    }

    async fn begin(&mut self, options: &TransactionOptions) -> DbResult<()> {
        self.session.begin(self.checkout.conn(), &options.watch).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.session.commit(self.checkout.conn()).await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.session.rollback(self.checkout.conn()).await
    }

    fn is_retryable(&self, error: &QueryError) -> bool {
        error.has_code_in(&[WATCH_CONFLICT])
    }

    async fn ping(&mut self) -> DbResult<()> {
        let result: Result<String, RedisError> =
            ::redis::cmd("PING").query_async(self.checkout.conn()).await;
        result
            .map(|_| ())
            .map_err(|e| DatabaseError::connection(format!("Redis ping failed: {e}")))
    }
}

impl Drop for RedisBackend {
    fn drop(&mut self) {
        if self.session.watching {
            self.checkout.discard();
        }
    }
}

/// Watch flag and queued batch of the running transaction
///
/// Kept apart from the socket so it works over any async connection.
struct Session {
    queue: OperationQueue,
    watching: bool,
    last_exec: Vec<Value>,
}

impl Session {
    const fn new() -> Self {
        Self {
            queue: OperationQueue::new(),
            watching: false,
            last_exec: Vec::new(),
        }
    }

    async fn begin<C>(&mut self, conn: &mut C, watch: &[String]) -> DbResult<()>
    where
        C: ConnectionLike + Send,
    {
        self.queue.clear();
        if watch.is_empty() {
            return Ok(());
        }

        let keys = watch.join(" ");
        debug!(target: QUERY_TRACE_TARGET, command = %format!("WATCH {keys}"), "Executing command");
        let mut cmd = ::redis::cmd("WATCH");
        for key in watch {
            cmd.arg(key);
        }
        let result: Result<(), RedisError> = cmd.query_async(conn).await;
        result.map_err(|e| DatabaseError::Query(redis_query_error("WATCH", watch.to_vec(), e)))?;
        self.watching = true;
        Ok(())
    }

    async fn commit<C>(&mut self, conn: &mut C) -> DbResult<()>
    where
        C: ConnectionLike + Send,
    {
        if self.queue.is_empty() {
            // Nothing to send; only release a watch if one was taken
            return self.unwatch(conn).await;
        }
        self.exec_batch(conn).await
    }

    async fn rollback<C>(&mut self, conn: &mut C) -> DbResult<()>
    where
        C: ConnectionLike + Send,
    {
        self.queue.clear();
        self.unwatch(conn).await
    }

    async fn unwatch<C>(&mut self, conn: &mut C) -> DbResult<()>
    where
        C: ConnectionLike + Send,
    {
        if !self.watching {
            return Ok(());
        }
        debug!(target: QUERY_TRACE_TARGET, command = "UNWATCH", "Executing command");
        let result: Result<(), RedisError> = ::redis::cmd("UNWATCH").query_async(conn).await;
        result.map_err(|e| command_error("UNWATCH", &[], e))?;
        self.watching = false;
        Ok(())
    }

    async fn exec_batch<C>(&mut self, conn: &mut C) -> DbResult<()>
    where
        C: ConnectionLike + Send,
    {
        let batch = self.queue.take();
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for command in &batch {
            pipe.cmd(&command.name);
            for arg in &command.args {
                pipe.arg(arg.to_bytes());
            }
        }
        debug!(
            target: QUERY_TRACE_TARGET,
            commands = ?describe_batch(&batch),
            "Executing MULTI/EXEC batch"
        );

        let reply: Result<Option<Vec<Value>>, RedisError> = pipe.query_async(conn).await;
        // EXEC ends the watch whatever its outcome
        self.watching = false;

        match reply {
            Ok(Some(values)) => {
                self.last_exec = values;
                Ok(())
            }
            Ok(None) => Err(QueryError::new(
                "EXEC",
                describe_batch(&batch),
                "watched key modified before EXEC",
            )
            .with_code(WATCH_CONFLICT)
            .into()),
            Err(e) => Err(DatabaseError::Query(redis_query_error(
                "EXEC",
                describe_batch(&batch),
                e,
            ))),
        }
    }
}

impl Client<RedisBackend> {
    /// Run one command immediately on this client's connection
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` when the command is rejected or fails
    pub async fn execute<T: FromRedisValue>(
        &mut self,
        command: &str,
        params: &[Param],
    ) -> DbResult<T> {
        self.backend.execute(command, params).await
    }

    /// Queue a command for the running transaction's `MULTI`/`EXEC` batch
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` outside a transaction or for a command
    /// that cannot be queued
    pub fn queue(&mut self, command: &str, params: &[Param]) -> DbResult<()> {
        if !self.in_transaction() {
            return Err(QueryError::new(
                command,
                render_all(params),
                "commands can only be queued inside a transaction",
            )
            .into());
        }
        self.backend.queue_mut().add(command, params)?;
        Ok(())
    }

    /// Commands queued so far in the running transaction
    #[must_use]
    pub const fn pending(&self) -> &OperationQueue {
        self.backend.queue()
    }

    /// Replies of the last committed batch
    #[must_use]
    pub fn last_exec(&self) -> &[Value] {
        self.backend.last_exec()
    }
}

fn command_error(name: &str, params: &[Param], error: RedisError) -> DatabaseError {
    DatabaseError::Query(redis_query_error(name, render_all(params), error))
}

/// Wrap a driver error, keeping the server's error code
fn redis_query_error(name: &str, params: Vec<String>, error: RedisError) -> QueryError {
    let code = error.code().map(str::to_owned);
    let mut query = QueryError::new(name, params, error.to_string());
    if let Some(code) = code {
        query = query.with_code(code);
    }
    query.with_source(error)
}
