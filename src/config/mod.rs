// ABOUTME: Configuration management for pooled store servers and retry tuning
// ABOUTME: Dotted-path lookup over a YAML document with environment fallbacks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration is read-only once loaded. Lookups use dotted paths such as
//! `postgres.servers.main.host` or `redis.retry.max_retries`.

/// Per-store server declarations and retry overrides
pub mod store;

pub use store::{DatabaseSelector, ServerConfig, StoreConfig};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use txrunner_core::constants::config::CONFIG_PATH_ENV;
use txrunner_core::errors::{DatabaseError, DbResult};

/// Read-only configuration tree with dotted-path lookup
#[derive(Debug, Clone, Default)]
pub struct ConfigProvider {
    root: Value,
}

impl ConfigProvider {
    /// Wrap an already-parsed tree
    #[must_use]
    pub const fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML
    pub fn from_yaml_str(yaml: &str) -> DbResult<Self> {
        let root: Value = serde_yaml::from_str(yaml)
            .map_err(|e| DatabaseError::config(format!("invalid YAML configuration: {e}")))?;
        // An empty document parses as null
        let root = if root.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            root
        };
        Ok(Self { root })
    }

    /// Load a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            DatabaseError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        info!("Loaded store configuration from {}", path.display());
        Self::from_yaml_str(&contents)
    }

    /// Load the file named by `TXRUNNER_CONFIG`, or an empty tree when unset
    ///
    /// # Errors
    ///
    /// Returns an error if the variable names an unreadable or invalid file
    pub fn from_env() -> DbResult<Self> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => {
                debug!("{CONFIG_PATH_ENV} not set, starting from an empty configuration");
                Ok(Self::default())
            }
        }
    }

    /// Look up a dotted path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }
        path.split('.')
            .try_fold(&self.root, |node, segment| node.get(segment))
    }

    /// Look up and deserialize a dotted path
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but has the wrong shape
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> DbResult<Option<T>> {
        self.get(path)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| DatabaseError::config(format!("{path}: {e}")))
            })
            .transpose()
    }
}
