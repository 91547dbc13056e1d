// ABOUTME: Operation queue collecting Redis commands for one MULTI/EXEC batch
// ABOUTME: Resolves command names and rejects transaction-control commands
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::params::Param;
use txrunner_core::errors::{DbResult, QueryError};

/// Transaction control is owned by the runner, never by queued commands
const CONTROL_COMMANDS: &[&str] = &["MULTI", "EXEC", "DISCARD", "WATCH", "UNWATCH"];

/// Method-style names mapped to the command they stand for
const ALIASES: &[(&str, &str)] = &[("DELETE", "DEL"), ("HMSET", "HSET")];

/// Resolve a command name to the form sent on the wire
///
/// # Errors
///
/// Returns `DatabaseError::Query` for an empty name or a transaction-control command
pub fn resolve_command(command: &str) -> DbResult<String> {
    let upper = command.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(QueryError::new(command, Vec::new(), "empty command name").into());
    }
    if CONTROL_COMMANDS.contains(&upper.as_str()) {
        return Err(QueryError::new(
            upper.clone(),
            Vec::new(),
            format!("{upper} is issued by the transaction runner and cannot be queued"),
        )
        .into());
    }

    Ok(ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map_or(upper, |(_, resolved)| (*resolved).to_owned()))
}

/// One queued command
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    /// Resolved command name
    pub name: String,
    /// Arguments, rendered to bytes when sent
    pub args: Vec<Param>,
}

impl QueuedCommand {
    /// Command and rendered arguments for traces
    #[must_use]
    pub fn render(&self) -> String {
        self.args.iter().fold(self.name.clone(), |mut line, arg| {
            line.push(' ');
            line.push_str(&arg.render());
            line
        })
    }
}

/// Commands waiting for the root transaction's commit
#[derive(Debug, Default, Clone)]
pub struct OperationQueue {
    commands: Vec<QueuedCommand>,
}

impl OperationQueue {
    /// Empty queue
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append a command to the batch
    ///
    /// # Errors
    ///
    /// Returns an error when the command name cannot be queued
    pub fn add(&mut self, command: &str, params: &[Param]) -> DbResult<&mut Self> {
        let name = resolve_command(command)?;
        self.commands.push(QueuedCommand {
            name,
            args: params.to_vec(),
        });
        Ok(self)
    }

    /// Drop every queued command
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of queued commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Queued commands in order
    #[must_use]
    pub fn commands(&self) -> &[QueuedCommand] {
        &self.commands
    }

    /// Take the batch, leaving the queue empty
    pub fn take(&mut self) -> Vec<QueuedCommand> {
        std::mem::take(&mut self.commands)
    }
}

/// Summary of a batch for error reports
pub(crate) fn describe_batch(commands: &[QueuedCommand]) -> Vec<String> {
    commands.iter().map(QueuedCommand::render).collect()
}
