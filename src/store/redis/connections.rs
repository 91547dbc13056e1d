// ABOUTME: Bounded set of dedicated Redis connections for one server
// ABOUTME: Idle connections are pinged on checkout and broken ones discarded with a warning
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::{DatabaseSelector, ServerConfig};
use redis::aio::MultiplexedConnection;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};
use txrunner_core::constants::pool::REDIS_PORT;
use txrunner_core::errors::{DatabaseError, DbResult};

/// Build the connection URL for a server declaration
///
/// # Errors
///
/// Returns a config error when the database selector is not a numeric index
pub fn connection_url(config: &ServerConfig) -> DbResult<String> {
    if let Some(url) = &config.url {
        return Ok(url.clone());
    }

    let credentials = match (&config.user, &config.password) {
        (Some(user), Some(password)) => format!(
            "{}:{}@",
            urlencoding::encode(user),
            urlencoding::encode(password)
        ),
        (None, Some(password)) => format!(":{}@", urlencoding::encode(password)),
        (Some(user), None) => format!("{}@", urlencoding::encode(user)),
        (None, None) => String::new(),
    };

    let database = match &config.database {
        None => 0,
        Some(DatabaseSelector::Index(index)) => *index,
        Some(DatabaseSelector::Name(name)) => name.parse::<i64>().map_err(|_| {
            DatabaseError::config(format!("Redis database must be a numeric index, got '{name}'"))
        })?,
    };

    Ok(format!(
        "redis://{credentials}{}:{}/{database}",
        config.host,
        config.port.unwrap_or(REDIS_PORT)
    ))
}

/// Open connections for one Redis server
///
/// Every checked-out connection is used by exactly one client, so `WATCH`
/// state never leaks between transactions.
pub struct RedisHandle {
    server: String,
    client: redis::Client,
    idle: Arc<Mutex<Vec<MultiplexedConnection>>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl RedisHandle {
    /// Create the handle and pre-open `min_connections` connections
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable
    pub async fn open(server: &str, config: &ServerConfig) -> DbResult<Self> {
        let url = connection_url(config)?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| DatabaseError::config(format!("invalid Redis URL: {e}")))?;

        let handle = Self {
            server: server.to_owned(),
            client,
            idle: Arc::new(Mutex::new(Vec::new())),
            permits: Arc::new(Semaphore::new(config.max_connections as usize)),
            acquire_timeout: config.acquire_timeout(),
        };

        for _ in 0..config.min_connections {
            let conn = handle.connect().await?;
            handle.push_idle(conn);
        }
        Ok(handle)
    }

    /// Check out a healthy connection, waiting for a free slot if needed
    ///
    /// # Errors
    ///
    /// Returns an error on acquire timeout or when a new connection cannot be opened
    pub async fn checkout(&self) -> DbResult<Checkout> {
        let permit = timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            DatabaseError::connection(format!(
                "timed out waiting for a free Redis connection to '{}'",
                self.server
            ))
        })?
        .map_err(|_| DatabaseError::connection("Redis connection set closed"))?;

        while let Some(mut conn) = self.pop_idle() {
            let pong: redis::RedisResult<String> =
                redis::cmd("PING").query_async(&mut conn).await;
            match pong {
                Ok(_) => return Ok(self.lend(conn, permit)),
                Err(e) => warn!(
                    server = %self.server,
                    error = %e,
                    "Discarding broken idle Redis connection"
                ),
            }
        }

        let conn = self.connect().await?;
        Ok(self.lend(conn, permit))
    }

    /// Connections currently parked
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map_or(0, |idle| idle.len())
    }

    async fn connect(&self) -> DbResult<MultiplexedConnection> {
        let conn = timeout(
            self.acquire_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            DatabaseError::connection(format!("timed out connecting to Redis '{}'", self.server))
        })?
        .map_err(|e| {
            DatabaseError::connection(format!("cannot connect to Redis '{}': {e}", self.server))
        })?;
        debug!(server = %self.server, "Opened Redis connection");
        Ok(conn)
    }

    fn lend(&self, conn: MultiplexedConnection, permit: OwnedSemaphorePermit) -> Checkout {
        Checkout {
            conn,
            idle: Arc::clone(&self.idle),
            server: self.server.clone(),
            reusable: true,
            _permit: permit,
        }
    }

    fn pop_idle(&self) -> Option<MultiplexedConnection> {
        self.idle.lock().ok().and_then(|mut idle| idle.pop())
    }

    fn push_idle(&self, conn: MultiplexedConnection) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }
}

/// A connection on loan; parked again when dropped unless marked dirty
pub struct Checkout {
    conn: MultiplexedConnection,
    idle: Arc<Mutex<Vec<MultiplexedConnection>>>,
    server: String,
    reusable: bool,
    _permit: OwnedSemaphorePermit,
}

impl Checkout {
    /// The underlying connection
    pub fn conn(&mut self) -> &mut MultiplexedConnection {
        &mut self.conn
    }

    /// Close instead of parking when returned
    pub fn discard(&mut self) {
        self.reusable = false;
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if !self.reusable {
            warn!(server = %self.server, "Closing Redis connection with pending watch state");
            return;
        }
        // Clones share the socket; the original goes away with this struct
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(self.conn.clone());
        }
    }
}
