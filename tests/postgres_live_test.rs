// ABOUTME: Integration tests for the PostgreSQL backend against a real server (CI-only)
// ABOUTME: Skips itself when DATABASE_URL is not set
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use common::init_test_logging;
use sqlx::Row;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;
use txrunner::config::{ServerConfig, StoreConfig};
use txrunner::store::{PostgresConnector, PostgresPool};
use txrunner::{
    params, ChaChaRandom, Param, Pool, RandomSource, RetryPolicy, TransactionOptions,
};

/// Helper: pool over `DATABASE_URL`, or None when it is not set
fn create_pool() -> Option<PostgresPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set, skipping PostgreSQL tests");
        return None;
    };
    init_test_logging();
    let config = StoreConfig::default()
        .with_server("default", ServerConfig::from_url(url))
        .with_retry(RetryPolicy {
            max_retries: 10,
            min_delay_ms: 1,
            max_delay_ms: 20,
        });
    Some(Pool::new(PostgresConnector, config))
}

/// Helper macro to skip test if PostgreSQL is not available
macro_rules! require_postgres {
    ($pool:expr) => {
        match $pool {
            Some(pool) => pool,
            None => {
                println!("Skipping test: PostgreSQL not available");
                return Ok(());
            }
        }
    };
}

async fn create_table(pool: &PostgresPool) -> Result<String> {
    let table = format!(
        "txrunner_live_{}",
        ChaChaRandom::from_entropy().random_string(10)
    );
    let mut client = pool.acquire("default").await?;
    client
        .execute(
            &format!("CREATE TABLE {table} (id BIGSERIAL PRIMARY KEY, label TEXT NOT NULL)"),
            &[],
        )
        .await?;
    client.release();
    Ok(table)
}

async fn drop_table(pool: &PostgresPool, table: &str) -> Result<()> {
    let mut client = pool.acquire("default").await?;
    client.execute(&format!("DROP TABLE {table}"), &[]).await?;
    client.release();
    Ok(())
}

async fn labels(pool: &PostgresPool, table: &str) -> Result<Vec<String>> {
    let mut client = pool.acquire("default").await?;
    let rows = client
        .fetch_all(&format!("SELECT label FROM {table} ORDER BY id"), &[])
        .await?;
    client.release();
    Ok(rows
        .iter()
        .map(|row| row.try_get::<String, _>("label"))
        .collect::<Result<_, _>>()?)
}

#[tokio::test]
async fn test_postgres_health_check() -> Result<()> {
    let pool = require_postgres!(create_pool());
    pool.health_check("default").await?;
    assert_eq!(pool.stats().outstanding(), 0);
    Ok(())
}

#[tokio::test]
async fn test_postgres_commit_rollback_and_savepoint() -> Result<()> {
    let pool = require_postgres!(create_pool());
    let table = create_table(&pool).await?;
    let insert = format!("INSERT INTO {table} (label) VALUES ($1)");

    let mut client = pool.acquire("default").await?;
    let inner = client
        .transaction(TransactionOptions::named("live-nested"), |tx, _rollback| {
            let insert = insert.clone();
            Box::pin(async move {
                tx.execute(&insert, &params!["parent-before"]).await?;
                let inner: String = tx
                    .transaction(TransactionOptions::new(), |tx, rollback| {
                        let insert = insert.clone();
                        Box::pin(async move {
                            tx.execute(&insert, &params!["child"]).await?;
                            Err(rollback.with("undone".to_owned()))
                        })
                    })
                    .await?;
                tx.execute(&insert, &params!["parent-after"]).await?;
                Ok(inner)
            })
        })
        .await?;

    let root = client
        .transaction(TransactionOptions::new(), |tx, rollback| {
            let insert = insert.clone();
            Box::pin(async move {
                tx.execute(&insert, &params!["never"]).await?;
                Err(rollback.with(42_i64))
            })
        })
        .await?;
    client.release();

    assert_eq!(inner, "undone");
    assert_eq!(root, 42);
    assert_eq!(
        labels(&pool, &table).await?,
        vec!["parent-before", "parent-after"]
    );
    drop_table(&pool, &table).await
}

#[tokio::test]
async fn test_postgres_unique_violation_carries_sqlstate() -> Result<()> {
    let pool = require_postgres!(create_pool());
    let table = create_table(&pool).await?;

    let mut client = pool.acquire("default").await?;
    let error = client
        .transaction(TransactionOptions::new(), |tx, _rollback| {
            let sql = format!("INSERT INTO {table} (id, label) VALUES ($1, $2)");
            Box::pin(async move {
                tx.execute(&sql, &params![1_i64, "a"]).await?;
                tx.execute(&sql, &params![1_i64, "b"]).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    client.release();

    let query = error
        .as_database()
        .and_then(|e| e.as_query())
        .expect("query error");
    assert_eq!(query.code.as_deref(), Some("23505"));
    assert_eq!(query.params, vec!["1".to_owned(), "b".to_owned()]);
    assert!(labels(&pool, &table).await?.is_empty());
    drop_table(&pool, &table).await
}

#[tokio::test]
async fn test_postgres_write_skew_is_retried() -> Result<()> {
    let pool = Arc::new(require_postgres!(create_pool()));
    let table = create_table(&pool).await?;
    let barrier = Arc::new(Barrier::new(2));
    let attempts = Arc::new(AtomicU32::new(0));

    let workers: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|label| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            let attempts = Arc::clone(&attempts);
            let table = table.clone();
            tokio::spawn(async move {
                let mut client = pool.acquire("default").await?;
                let mut first_attempt = true;
                let result = client
                    .transaction(TransactionOptions::named(label), |tx, _rollback| {
                        let barrier = Arc::clone(&barrier);
                        let attempts = Arc::clone(&attempts);
                        let table = table.clone();
                        let wait = std::mem::replace(&mut first_attempt, false);
                        Box::pin(async move {
                            attempts.fetch_add(1, Ordering::SeqCst);
                            tx.fetch_optional(&format!("SELECT count(*) AS n FROM {table}"), &[])
                                .await?;
                            if wait {
                                barrier.wait().await;
                            }
                            tx.execute(
                                &format!("INSERT INTO {table} (label) VALUES ($1)"),
                                &params![label],
                            )
                            .await?;
                            Ok(())
                        })
                    })
                    .await;
                client.release();
                result.map_err(anyhow::Error::from)
            })
        })
        .collect();

    for worker in workers {
        worker.await??;
    }

    assert_eq!(labels(&pool, &table).await?.len(), 2);
    assert!(
        attempts.load(Ordering::SeqCst) >= 3,
        "one side must have retried"
    );
    drop_table(&pool, &table).await
}

#[tokio::test]
async fn test_postgres_nulls_bind_to_non_text_columns() -> Result<()> {
    let pool = require_postgres!(create_pool());
    let table = format!(
        "txrunner_nulls_{}",
        ChaChaRandom::from_entropy().random_string(10)
    );
    let mut client = pool.acquire("default").await?;
    client
        .execute(
            &format!(
                "CREATE TABLE {table} (id BIGINT PRIMARY KEY, qty INTEGER, at TIMESTAMPTZ, \
                 flag BOOLEAN, meta JSONB)"
            ),
            &[],
        )
        .await?;

    let insert = format!("INSERT INTO {table} (id, qty, at, flag, meta) VALUES ($1, $2, $3, $4, $5)");
    client
        .execute(
            &insert,
            &params![
                1_i64,
                None::<i64>,
                None::<chrono::DateTime<chrono::Utc>>,
                None::<bool>,
                serde_json::Value::Null
            ],
        )
        .await?;
    // A null with no source type lets the server pick the column type
    client
        .execute(
            &insert,
            &[
                Param::from(2_i64),
                Param::null(),
                Param::null(),
                Param::null(),
                Param::null(),
            ],
        )
        .await?;

    client
        .transaction(TransactionOptions::new(), |tx, _rollback| {
            let update = format!("UPDATE {table} SET qty = $1, at = $2 WHERE id = $3");
            Box::pin(async move {
                tx.execute(
                    &update,
                    &params![None::<i32>, None::<chrono::DateTime<chrono::Utc>>, 1_i64],
                )
                .await?;
                Ok(())
            })
        })
        .await?;

    let rows = client
        .fetch_all(
            &format!("SELECT count(*) AS n FROM {table} WHERE qty IS NULL AND at IS NULL"),
            &[],
        )
        .await?;
    assert_eq!(rows[0].try_get::<i64, _>("n")?, 2);
    client.execute(&format!("DROP TABLE {table}"), &[]).await?;
    client.release();
    Ok(())
}

#[tokio::test]
async fn test_postgres_timestamp_round_trips_in_utc() -> Result<()> {
    let pool = require_postgres!(create_pool());
    let mut client = pool.acquire("default").await?;

    let at = chrono::DateTime::parse_from_rfc3339("2024-03-01T12:30:45.250+02:00")?;
    let row = client
        .fetch_optional("SELECT $1::timestamptz AS at", &params![at])
        .await?
        .expect("one row");
    client.release();

    let stored: chrono::DateTime<chrono::Utc> = row.try_get("at")?;
    assert_eq!(stored.to_rfc3339(), "2024-03-01T10:30:45.250+00:00");
    Ok(())
}
