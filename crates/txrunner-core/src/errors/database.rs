// ABOUTME: Structured error types for pooled store access and transaction execution
// ABOUTME: Carries conflict codes so the runner can classify failures without string matching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed driver error kept as the source of a [`QueryError`]
pub type DriverError = Box<dyn StdError + Send + Sync>;

/// A statement or command rejected by the backing store
///
/// `params` holds the rendered (already sanitized) parameters so that the
/// failure can be logged without access to the original values.
#[derive(Debug)]
pub struct QueryError {
    /// Statement text (SQL) or resolved command name
    pub statement: String,
    /// Rendered parameters in submission order
    pub params: Vec<String>,
    /// Store-specific conflict/status code (SQLSTATE, Redis error code, ...)
    pub code: Option<String>,
    /// Backend message
    pub message: String,
    /// Underlying driver error
    pub source: Option<DriverError>,
}

impl QueryError {
    /// Create a query error without a conflict code
    pub fn new(
        statement: impl Into<String>,
        params: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            statement: statement.into(),
            params,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the store-specific code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the driver error
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether the code is one of `codes`
    #[must_use]
    pub fn has_code_in(&self, codes: &[&str]) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| codes.contains(&code))
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{code}] in `{}`", self.message, self.statement),
            None => write!(f, "{} in `{}`", self.message, self.statement),
        }
    }
}

impl StdError for QueryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Errors produced by the pool, the query executors, and the transaction runner
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The requested server name is not declared in configuration
    #[error("server '{server}' is not declared in configuration")]
    Configuration {
        /// Logical server name that was requested
        server: String,
    },

    /// A configuration value exists but cannot be used
    #[error("invalid configuration: {message}")]
    Config {
        /// What is wrong with the value
        message: String,
    },

    /// Opening a pool or checking out a connection failed
    #[error("connection error: {message}")]
    Connection {
        /// Failure description
        message: String,
    },

    /// The store rejected a statement
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A transaction was started on a client that already runs one and cannot nest
    #[error("transaction {name} cannot be nested: this store supports a single transaction level")]
    Nesting {
        /// Transaction name, or `<unnamed>`
        name: String,
    },

    /// Every allowed attempt ended in a retryable conflict
    #[error("transaction {name} failed after {attempts} conflicting attempts")]
    RetryExhausted {
        /// Transaction name, or `<unnamed>`
        name: String,
        /// Number of conflicting attempts, including the last one
        attempts: u32,
        /// The last conflict
        #[source]
        source: Box<QueryError>,
    },

    /// A rollback was requested for a level that does not exist or with a mismatched value
    #[error("invalid rollback: {message}")]
    InvalidRollback {
        /// Failure description
        message: String,
    },
}

impl DatabaseError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a configuration value error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The query error behind this failure, if any
    #[must_use]
    pub const fn as_query(&self) -> Option<&QueryError> {
        match self {
            Self::Query(query) => Some(query),
            _ => None,
        }
    }
}

/// Result alias for store operations
pub type DbResult<T> = Result<T, DatabaseError>;
