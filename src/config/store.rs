// ABOUTME: Server declarations and retry overrides for one store section
// ABOUTME: Handles host/credential/pool-size settings and DATABASE_URL/REDIS_URL fallbacks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::ConfigProvider;
use crate::transaction::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;
use txrunner_core::constants::{config as sections, pool};
use txrunner_core::errors::{DatabaseError, DbResult};

/// Name of the server declared from `DATABASE_URL` / `REDIS_URL`
pub const DEFAULT_SERVER: &str = "default";

/// Database selection: a name (`PostgreSQL`) or an index (Redis)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseSelector {
    /// Numbered logical database
    Index(i64),
    /// Named database
    Name(String),
}

impl Display for DatabaseSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Connection parameters for one logical server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Full connection URL; when present it wins over the discrete fields
    #[serde(default)]
    pub url: Option<String>,
    /// Host name
    #[serde(default = "default_host")]
    pub host: String,
    /// Port; store default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// User name
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Database name or index
    #[serde(default)]
    pub database: Option<DatabaseSelector>,
    /// Connections kept open once the pool exists
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Upper bound on open connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long `acquire` waits for a free connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_host() -> String {
    "localhost".to_owned()
}

const fn default_min_connections() -> u32 {
    pool::MIN_CONNECTIONS
}

const fn default_max_connections() -> u32 {
    pool::MAX_CONNECTIONS
}

const fn default_acquire_timeout_secs() -> u64 {
    pool::ACQUIRE_TIMEOUT_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: None,
            user: None,
            password: None,
            database: None,
            min_connections: pool::MIN_CONNECTIONS,
            max_connections: pool::MAX_CONNECTIONS,
            acquire_timeout_secs: pool::ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Declare a server by URL with default pool sizing
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Acquire timeout as a `Duration`
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Reject sizing that no pool can satisfy
    ///
    /// # Errors
    ///
    /// Returns an error if `max_connections` is zero or below `min_connections`
    pub fn validate(&self, server: &str) -> DbResult<()> {
        if self.max_connections == 0 {
            return Err(DatabaseError::config(format!(
                "server '{server}': max_connections must be at least 1"
            )));
        }
        if self.min_connections > self.max_connections {
            return Err(DatabaseError::config(format!(
                "server '{server}': min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

/// Everything one store section declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Logical server name to connection parameters
    pub servers: BTreeMap<String, ServerConfig>,
    /// Retry tuning applied to clients handed out by the pool
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Read `<section>.servers` and `<section>.retry` from a provider
    ///
    /// # Errors
    ///
    /// Returns an error if either subtree has the wrong shape or a server is mis-sized
    pub fn load(provider: &ConfigProvider, section: &str) -> DbResult<Self> {
        let servers: BTreeMap<String, ServerConfig> = provider
            .get_as(&format!("{section}.servers"))?
            .unwrap_or_default();
        let retry: RetryPolicy = provider
            .get_as(&format!("{section}.retry"))?
            .unwrap_or_default();

        for (name, server) in &servers {
            server.validate(name)?;
        }

        Ok(Self { servers, retry })
    }

    /// Load from `TXRUNNER_CONFIG`, then declare `default` from the store URL variable
    ///
    /// `DATABASE_URL` feeds the `postgres` section and `REDIS_URL` the `redis`
    /// section; an explicit `default` server in the file takes precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is unreadable or invalid
    pub fn from_env(section: &str) -> DbResult<Self> {
        let provider = ConfigProvider::from_env()?;
        let mut config = Self::load(&provider, section)?;

        let url_var = match section {
            sections::POSTGRES_SECTION => Some("DATABASE_URL"),
            sections::REDIS_SECTION => Some("REDIS_URL"),
            _ => None,
        };
        if let Some(url) = url_var.and_then(|var| env::var(var).ok()) {
            config
                .servers
                .entry(DEFAULT_SERVER.to_owned())
                .or_insert_with(|| ServerConfig::from_url(url));
        }

        Ok(config)
    }

    /// Declare or replace a server
    #[must_use]
    pub fn with_server(mut self, name: impl Into<String>, server: ServerConfig) -> Self {
        self.servers.insert(name.into(), server);
        self
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parameters for a declared server
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` when the server is not declared
    pub fn server(&self, name: &str) -> DbResult<&ServerConfig> {
        self.servers
            .get(name)
            .ok_or_else(|| DatabaseError::Configuration {
                server: name.to_owned(),
            })
    }
}
