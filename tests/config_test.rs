// ABOUTME: Integration tests for YAML configuration loading and environment fallbacks
// ABOUTME: Covers TXRUNNER_CONFIG files, store URL variables, and logging environment parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use anyhow::Result;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;
use txrunner::config::store::DEFAULT_SERVER;
use txrunner::config::{ConfigProvider, DatabaseSelector, StoreConfig};
use txrunner::constants::config::CONFIG_PATH_ENV;
use txrunner::errors::DatabaseError;
use txrunner::logging::{LogFormat, LoggingConfig};
use txrunner::RetryPolicy;

const STORES_YAML: &str = r"
postgres:
  retry: { max_retries: 7, min_delay_ms: 5 }
  servers:
    main: { host: db.internal, port: 5433, user: app, password: secret, database: app,
            min_connections: 2, max_connections: 4, acquire_timeout_secs: 3 }
redis:
  servers:
    cache: { host: cache.internal, database: 2, max_connections: 8 }
";

fn config_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

fn clear_store_env() {
    env::remove_var(CONFIG_PATH_ENV);
    env::remove_var("DATABASE_URL");
    env::remove_var("REDIS_URL");
}

#[test]
#[serial]
fn test_config_file_named_by_env_is_loaded() -> Result<()> {
    clear_store_env();
    let file = config_file(STORES_YAML)?;
    env::set_var(CONFIG_PATH_ENV, file.path());

    let postgres = StoreConfig::from_env("postgres")?;
    let main = postgres.server("main")?;
    assert_eq!(main.host, "db.internal");
    assert_eq!(main.port, Some(5433));
    assert_eq!(main.database, Some(DatabaseSelector::Name("app".into())));
    assert_eq!(main.acquire_timeout().as_secs(), 3);
    assert_eq!(
        postgres.retry,
        RetryPolicy {
            max_retries: 7,
            min_delay_ms: 5,
            ..RetryPolicy::default()
        }
    );

    let redis = StoreConfig::from_env("redis")?;
    assert_eq!(
        redis.server("cache")?.database,
        Some(DatabaseSelector::Index(2))
    );
    assert_eq!(redis.retry, RetryPolicy::default());

    clear_store_env();
    Ok(())
}

#[test]
#[serial]
fn test_store_url_declares_default_server() -> Result<()> {
    clear_store_env();
    env::set_var("DATABASE_URL", "postgres://app@localhost/app");

    let postgres = StoreConfig::from_env("postgres")?;
    assert_eq!(
        postgres.server(DEFAULT_SERVER)?.url.as_deref(),
        Some("postgres://app@localhost/app")
    );
    let redis = StoreConfig::from_env("redis")?;
    assert!(redis.servers.is_empty());

    clear_store_env();
    Ok(())
}

#[test]
#[serial]
fn test_declared_default_server_wins_over_url() -> Result<()> {
    clear_store_env();
    let file = config_file("redis:\n  servers:\n    default: { host: pinned.internal }\n")?;
    env::set_var(CONFIG_PATH_ENV, file.path());
    env::set_var("REDIS_URL", "redis://elsewhere:6379");

    let redis = StoreConfig::from_env("redis")?;
    let server = redis.server(DEFAULT_SERVER)?;
    assert_eq!(server.host, "pinned.internal");
    assert!(server.url.is_none());

    clear_store_env();
    Ok(())
}

#[test]
#[serial]
fn test_missing_config_file_is_a_config_error() {
    clear_store_env();
    env::set_var(CONFIG_PATH_ENV, "/nonexistent/txrunner.yaml");

    let error = ConfigProvider::from_env().unwrap_err();
    assert!(matches!(error, DatabaseError::Config { .. }));

    clear_store_env();
}

#[test]
fn test_missized_server_is_rejected() {
    let provider = ConfigProvider::from_yaml_str(
        "postgres:\n  servers:\n    main: { min_connections: 5, max_connections: 2 }\n",
    )
    .unwrap();
    let error = StoreConfig::load(&provider, "postgres").unwrap_err();
    assert!(error.to_string().contains("min_connections"));
}

#[test]
#[serial]
fn test_logging_config_reads_environment() {
    env::set_var("LOG_FORMAT", "json");
    env::set_var("LOG_INCLUDE_LOCATION", "1");
    env::set_var("SERVICE_NAME", "ledger");

    let config = LoggingConfig::from_env();
    assert_eq!(config.format, LogFormat::Json);
    assert!(config.include_location);
    assert_eq!(config.service_name, "ledger");

    env::remove_var("LOG_FORMAT");
    env::remove_var("LOG_INCLUDE_LOCATION");
    env::remove_var("SERVICE_NAME");
}
