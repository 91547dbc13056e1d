// ABOUTME: Shared test utilities: quiet logging, a scripted in-memory backend, a fake connector
// ABOUTME: The scripted backend records every control statement and models commit/savepoint state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used
)]
//! Shared test utilities for `txrunner`
//!
//! [`ScriptedBackend`] stands in for a real store. Writes made through
//! [`ScriptedBackend::write`] stay pending until `COMMIT`, savepoints truncate
//! the pending list, and a configurable number of commits fail with a
//! serialization conflict. A [`Journal`] keeps a view of the shared state after
//! the backend has moved into a client.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use txrunner::config::{ServerConfig, StoreConfig};
use txrunner::constants::conflict::{SERIALIZATION_FAILURE, WATCH_CONFLICT};
use txrunner::errors::{DatabaseError, DbResult, QueryError};
use txrunner::{Client, RetryPolicy, StoreConnector, TransactionBackend, TransactionOptions};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // Check for TEST_LOG environment variable to control test logging level
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN, // Default to WARN for quiet tests
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Shared view of a scripted store
#[derive(Debug, Clone, Default)]
pub struct Journal {
    log: Arc<Mutex<Vec<String>>>,
    committed: Arc<Mutex<Vec<String>>>,
    commit_conflicts: Arc<AtomicU32>,
    commits: Arc<AtomicU32>,
}

impl Journal {
    /// Control statements in issue order
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Statements starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|statement| statement.starts_with(prefix))
            .count()
    }

    /// Writes made durable by a successful commit
    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }

    /// Successful commits
    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make the next `n` commits fail with a conflict
    pub fn fail_next_commits(&self, n: u32) {
        self.commit_conflicts.store(n, Ordering::SeqCst);
    }

    fn record(&self, statement: impl Into<String>) {
        self.log.lock().unwrap().push(statement.into());
    }
}

/// Flavor of store being imitated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Savepoints, SQLSTATE conflicts
    Relational,
    /// Single level, watch conflicts
    KeyValue,
}

/// In-memory backend driven by the transaction runner
pub struct ScriptedBackend {
    flavor: Flavor,
    journal: Journal,
    pending: Vec<String>,
    marks: Vec<(String, usize)>,
}

impl ScriptedBackend {
    pub fn new(flavor: Flavor) -> (Self, Journal) {
        let journal = Journal::default();
        (Self::with_journal(flavor, journal.clone()), journal)
    }

    pub fn with_journal(flavor: Flavor, journal: Journal) -> Self {
        Self {
            flavor,
            journal,
            pending: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// Stage a write in the running transaction
    pub fn write(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.journal.record(format!("WRITE {value}"));
        self.pending.push(value);
    }

    /// Pending (uncommitted) writes
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// A statement failing with the given code
    pub fn fail(&mut self, code: &str) -> DbResult<()> {
        self.journal.record(format!("FAIL {code}"));
        Err(QueryError::new("UPDATE scripted", Vec::new(), "scripted failure")
            .with_code(code)
            .into())
    }

    fn conflict_code(&self) -> &'static str {
        match self.flavor {
            Flavor::Relational => SERIALIZATION_FAILURE,
            Flavor::KeyValue => WATCH_CONFLICT,
        }
    }
}

#[async_trait]
impl TransactionBackend for ScriptedBackend {
    fn supports_savepoints(&self) -> bool {
        self.flavor == Flavor::Relational
    }

    async fn begin(&mut self, options: &TransactionOptions) -> DbResult<()> {
        match self.flavor {
            Flavor::Relational => self.journal.record(options.begin_sql()),
            Flavor::KeyValue => self.journal.record(format!("WATCH {}", options.watch.join(" "))),
        }
        self.pending.clear();
        self.marks.clear();
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.journal.record("COMMIT");
        let remaining = self.journal.commit_conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.journal
                .commit_conflicts
                .store(remaining - 1, Ordering::SeqCst);
            self.pending.clear();
            return Err(QueryError::new("COMMIT", Vec::new(), "conflict on commit")
                .with_code(self.conflict_code())
                .into());
        }
        self.journal
            .committed
            .lock()
            .unwrap()
            .extend(self.pending.drain(..));
        self.journal.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.journal.record("ROLLBACK");
        self.pending.clear();
        self.marks.clear();
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        if self.flavor == Flavor::KeyValue {
            return Err(DatabaseError::Nesting {
                name: name.to_owned(),
            });
        }
        self.journal.record(format!("SAVEPOINT {name}"));
        self.marks.push((name.to_owned(), self.pending.len()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.journal.record(format!("ROLLBACK TO SAVEPOINT {name}"));
        let Some(&(_, mark)) = self.marks.iter().find(|(existing, _)| existing == name) else {
            return Err(QueryError::new(
                format!("ROLLBACK TO SAVEPOINT {name}"),
                Vec::new(),
                "no such savepoint",
            )
            .with_code("3B001")
            .into());
        };
        self.pending.truncate(mark);
        Ok(())
    }

    fn is_retryable(&self, error: &QueryError) -> bool {
        error.has_code_in(&[self.conflict_code()])
    }

    async fn ping(&mut self) -> DbResult<()> {
        self.journal.record("PING");
        Ok(())
    }
}

/// Client over a fresh relational scripted backend, retrying without delay
pub fn relational_client(max_retries: u32) -> (Client<ScriptedBackend>, Journal) {
    init_test_logging();
    let (backend, journal) = ScriptedBackend::new(Flavor::Relational);
    let client = Client::new(backend).with_retry(RetryPolicy::immediate(max_retries));
    (client, journal)
}

/// Client over a fresh key-value scripted backend, retrying without delay
pub fn key_value_client(max_retries: u32) -> (Client<ScriptedBackend>, Journal) {
    init_test_logging();
    let (backend, journal) = ScriptedBackend::new(Flavor::KeyValue);
    let client = Client::new(backend).with_retry(RetryPolicy::immediate(max_retries));
    (client, journal)
}

/// Connector handing out scripted backends; servers on host `unreachable` fail to open
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub opens: Arc<AtomicUsize>,
    pub checkouts: Arc<AtomicUsize>,
    pub journal: Journal,
}

#[async_trait]
impl StoreConnector for FakeConnector {
    type Handle = String;
    type Backend = ScriptedBackend;

    async fn open(&self, server: &str, config: &ServerConfig) -> DbResult<String> {
        // Widen the window in which concurrent first acquisitions overlap
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.opens.fetch_add(1, Ordering::SeqCst);
        if config.host == "unreachable" {
            return Err(DatabaseError::connection(format!(
                "cannot reach server '{server}'"
            )));
        }
        Ok(server.to_owned())
    }

    async fn checkout(&self, _handle: &String) -> DbResult<ScriptedBackend> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedBackend::with_journal(
            Flavor::Relational,
            self.journal.clone(),
        ))
    }
}

/// Store config declaring `main`, `replica`, and an unreachable `down` server
pub fn fake_store_config() -> StoreConfig {
    StoreConfig::default()
        .with_server("main", ServerConfig::default())
        .with_server(
            "replica",
            ServerConfig {
                host: "replica.internal".to_owned(),
                ..ServerConfig::default()
            },
        )
        .with_server(
            "down",
            ServerConfig {
                host: "unreachable".to_owned(),
                ..ServerConfig::default()
            },
        )
        .with_retry(RetryPolicy::immediate(3))
}
