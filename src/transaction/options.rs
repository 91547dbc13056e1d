// ABOUTME: Per-call transaction options: name, isolation level, access mode, watch set
// ABOUTME: Builder-style construction shared by the relational and key-value backends
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

const UNNAMED: &str = "<unnamed>";

/// SQL isolation level for root transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// `READ UNCOMMITTED`
    ReadUncommitted,
    /// `READ COMMITTED`
    ReadCommitted,
    /// `REPEATABLE READ`
    RepeatableRead,
    /// `SERIALIZABLE`
    #[default]
    Serializable,
}

impl IsolationLevel {
    /// SQL keyword form
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_sql())
    }
}

/// Options for one `transaction()` call
///
/// Backends ignore what they cannot express: the key-value store has no
/// isolation levels and the relational store has no watch set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Name used in logs and errors
    pub name: Option<String>,
    /// Isolation level of a root transaction
    pub isolation: IsolationLevel,
    /// Start the root transaction `READ ONLY`
    pub read_only: bool,
    /// Keys whose concurrent modification aborts the attempt
    pub watch: Vec<String>,
}

impl TransactionOptions {
    /// Default options: unnamed, serializable, read-write, no watch set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with a diagnostic name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    /// Set the diagnostic name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the isolation level
    #[must_use]
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Mark the root transaction read-only
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Add keys to the watch set
    #[must_use]
    pub fn watch<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.watch.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Name for logs and errors
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED)
    }

    /// `BEGIN` statement for the relational store
    #[must_use]
    pub fn begin_sql(&self) -> String {
        let mut sql = format!("BEGIN ISOLATION LEVEL {}", self.isolation.as_sql());
        if self.read_only {
            sql.push_str(" READ ONLY");
        }
        sql
    }
}
