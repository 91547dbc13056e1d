// ABOUTME: Store backends implementing the transaction runner's capability trait
// ABOUTME: PostgreSQL through sqlx and Redis through redis-rs, each with its own connector
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// `PostgreSQL` backend: savepoint nesting, SQLSTATE conflict classification
pub mod postgres;
/// Redis backend: watch set, queued MULTI/EXEC batch, single transaction level
pub mod redis;

pub use self::postgres::{PostgresBackend, PostgresConnector, PostgresPool};
pub use self::redis::{RedisBackend, RedisConnector, RedisPool};

/// `tracing` target for statement traces
pub const QUERY_TRACE_TARGET: &str = "txrunner::query";
