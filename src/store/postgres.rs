// ABOUTME: PostgreSQL backend: sqlx pool connector, statement executor, transaction capabilities
// ABOUTME: Savepoints for nesting, SQLSTATE 40001 marks an attempt as retryable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::client::Client;
use crate::config::ServerConfig;
use crate::params::{interpolate, render_all, Param, ParamKind};
use crate::pool::{Pool, StoreConnector};
use crate::store::QUERY_TRACE_TARGET;
use crate::transaction::{TransactionBackend, TransactionOptions};
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Connection, Encode, Executor, PgPool, Postgres, Type};
use std::str::FromStr;
use tracing::{debug, warn};
use txrunner_core::constants::conflict::RETRYABLE_SQLSTATES;
use txrunner_core::constants::pool::POSTGRES_PORT;
use txrunner_core::errors::{DatabaseError, DbResult, QueryError};

/// Pool of `PostgreSQL` clients
pub type PostgresPool = Pool<PostgresConnector>;

/// Opens one `sqlx` pool per declared server
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    fn connect_options(config: &ServerConfig) -> DbResult<PgConnectOptions> {
        let options = match &config.url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| DatabaseError::config(format!("invalid PostgreSQL URL: {e}")))?,
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&config.host)
                    .port(config.port.unwrap_or(POSTGRES_PORT));
                if let Some(user) = &config.user {
                    options = options.username(user);
                }
                if let Some(password) = &config.password {
                    options = options.password(password);
                }
                if let Some(database) = &config.database {
                    options = options.database(&database.to_string());
                }
                options
            }
        };
        // Session time zone pinned so timestamp comparisons do not drift
        Ok(options.options([("timezone", "UTC")]))
    }
}

#[async_trait]
impl StoreConnector for PostgresConnector {
    type Handle = PgPool;
    type Backend = PostgresBackend;

    async fn open(&self, server: &str, config: &ServerConfig) -> DbResult<PgPool> {
        let server_name = server.to_owned();
        PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .test_before_acquire(false)
            .before_acquire(move |conn, meta| {
                let server = server_name.clone();
                Box::pin(async move {
                    match conn.ping().await {
                        Ok(()) => Ok(true),
                        Err(e) => {
                            warn!(
                                server = %server,
                                idle_ms = meta.idle_for.as_millis(),
                                error = %e,
                                "Discarding broken idle PostgreSQL connection"
                            );
                            Ok(false)
                        }
                    }
                })
            })
            .connect_with(Self::connect_options(config)?)
            .await
            .map_err(|e| {
                DatabaseError::connection(format!("cannot open PostgreSQL pool '{server}': {e}"))
            })
    }

    async fn checkout(&self, handle: &PgPool) -> DbResult<PostgresBackend> {
        let conn = handle.acquire().await.map_err(|e| {
            DatabaseError::connection(format!("cannot acquire PostgreSQL connection: {e}"))
        })?;
        Ok(PostgresBackend { conn })
    }
}

/// One checked-out `PostgreSQL` connection
pub struct PostgresBackend {
    conn: PoolConnection<Postgres>,
}

impl PostgresBackend {
    /// Wrap a connection checked out elsewhere
    #[must_use]
    pub const fn new(conn: PoolConnection<Postgres>) -> Self {
        Self { conn }
    }

    /// Execute a statement, returning the number of affected rows
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` carrying the SQLSTATE when the server rejects it
    pub async fn execute(&mut self, statement: &str, params: &[Param]) -> DbResult<u64> {
        trace_statement(statement, params);
        bind_all(sqlx::query(statement), params)
            .execute(&mut *self.conn)
            .await
            .map(|done| done.rows_affected())
            .map_err(|e| query_error(statement, params, e))
    }

    /// Execute a query, returning every row
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` carrying the SQLSTATE when the server rejects it
    pub async fn fetch_all(&mut self, statement: &str, params: &[Param]) -> DbResult<Vec<PgRow>> {
        trace_statement(statement, params);
        bind_all(sqlx::query(statement), params)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| query_error(statement, params, e))
    }

    /// Execute a query, returning at most one row
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` carrying the SQLSTATE when the server rejects it
    pub async fn fetch_optional(
        &mut self,
        statement: &str,
        params: &[Param],
    ) -> DbResult<Option<PgRow>> {
        trace_statement(statement, params);
        bind_all(sqlx::query(statement), params)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| query_error(statement, params, e))
    }

    /// Transaction control goes over the simple query protocol
    async fn control(&mut self, statement: &str) -> DbResult<()> {
        trace_statement(statement, &[]);
        (&mut *self.conn)
            .execute(statement)
            .await
            .map(|_| ())
            .map_err(|e| query_error(statement, &[], e))
    }
}

#[async_trait]
impl TransactionBackend for PostgresBackend {
    fn supports_savepoints(&self) -> bool {
        true
    }

    async fn begin(&mut self, options: &TransactionOptions) -> DbResult<()> {
        self.control(&options.begin_sql()).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.control("ROLLBACK").await
    }

    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        self.control(&format!("SAVEPOINT {name}")).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.control(&format!("ROLLBACK TO SAVEPOINT {name}")).await
    }

    fn is_retryable(&self, error: &QueryError) -> bool {
        error.has_code_in(RETRYABLE_SQLSTATES)
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.conn
            .ping()
            .await
            .map_err(|e| DatabaseError::connection(format!("PostgreSQL ping failed: {e}")))
    }
}

impl Client<PostgresBackend> {
    /// Execute a statement on this client's connection
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` when the server rejects the statement
    pub async fn execute(&mut self, statement: &str, params: &[Param]) -> DbResult<u64> {
        self.backend.execute(statement, params).await
    }

    /// Fetch every row of a query on this client's connection
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` when the server rejects the statement
    pub async fn fetch_all(&mut self, statement: &str, params: &[Param]) -> DbResult<Vec<PgRow>> {
        self.backend.fetch_all(statement, params).await
    }

    /// Fetch at most one row of a query on this client's connection
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Query` when the server rejects the statement
    pub async fn fetch_optional(
        &mut self,
        statement: &str,
        params: &[Param],
    ) -> DbResult<Option<PgRow>> {
        self.backend.fetch_optional(statement, params).await
    }
}

/// `NULL` sent with the unspecified type OID, so the server infers the column type
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind_null(
    query: Query<'_, Postgres, PgArguments>,
    kind: ParamKind,
) -> Query<'_, Postgres, PgArguments> {
    match kind {
        ParamKind::Unknown => query.bind(UntypedNull),
        ParamKind::Bool => query.bind(None::<bool>),
        ParamKind::Int => query.bind(None::<i64>),
        ParamKind::Float => query.bind(None::<f64>),
        ParamKind::Text => query.bind(None::<String>),
        ParamKind::Bytes => query.bind(None::<Vec<u8>>),
        ParamKind::Json => query.bind(None::<Json<Value>>),
        ParamKind::Timestamp => query.bind(None::<DateTime<Utc>>),
    }
}

fn bind_all<'q>(
    query: Query<'q, Postgres, PgArguments>,
    params: &[Param],
) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(query, |query, param| match param {
        Param::Null(kind) => bind_null(query, *kind),
        Param::Bool(value) => query.bind(*value),
        Param::Int(value) => query.bind(*value),
        Param::Float(value) => query.bind(*value),
        Param::Text(value) => query.bind(value.clone()),
        Param::Bytes(value) => query.bind(value.clone()),
        Param::Json(value) => query.bind(Json(value.clone())),
        Param::Timestamp(value) => query.bind(*value),
    })
}

fn trace_statement(statement: &str, params: &[Param]) {
    debug!(target: QUERY_TRACE_TARGET, statement = %interpolate(statement, params), "Executing statement");
}

/// Wrap a driver error, keeping the SQLSTATE for conflict classification
fn query_error(statement: &str, params: &[Param], error: sqlx::Error) -> DatabaseError {
    let database_error = error.as_database_error();
    let code = database_error
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    let message =
        database_error.map_or_else(|| error.to_string(), |db| db.message().to_owned());

    let mut query = QueryError::new(statement, render_all(params), message);
    if let Some(code) = code {
        query = query.with_code(code);
    }
    DatabaseError::Query(query.with_source(error))
}
