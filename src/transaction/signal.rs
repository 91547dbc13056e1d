// ABOUTME: Rollback capability and the error type returned by units of work
// ABOUTME: A rollback is a tagged value that resolves to success at the level it targets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::any::{self, Any};
use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use txrunner_core::errors::{AppError, DatabaseError, ErrorCode};

/// Transaction level a rollback is aimed at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RollbackTarget {
    /// The outermost transaction
    Root,
    /// A nested level, by savepoint name
    Savepoint(String),
}

impl Display for RollbackTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Savepoint(name) => write!(f, "savepoint {name}"),
        }
    }
}

/// Request to abandon one transaction level while still returning a value
///
/// The payload only has to be `Send`; the mutex keeps the signal (and so
/// `TxError`) `Sync` without asking that of the value.
pub struct RollbackSignal {
    target: RollbackTarget,
    payload: Mutex<Box<dyn Any + Send>>,
}

impl RollbackSignal {
    /// Level this signal is aimed at
    #[must_use]
    pub const fn target(&self) -> &RollbackTarget {
        &self.target
    }

    /// Recover the carried value
    ///
    /// # Errors
    ///
    /// Returns `InvalidRollback` when the value is not a `T`
    pub fn into_value<T: 'static>(self) -> Result<T, DatabaseError> {
        let target = self.target;
        self.payload
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| DatabaseError::InvalidRollback {
                message: format!(
                    "rollback of {target} carries a value that is not a {}",
                    any::type_name::<T>()
                ),
            })
    }
}

impl fmt::Debug for RollbackSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackSignal")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Capability handed to a unit of work to roll back its own level
///
/// `T` is the result type of the level the handle belongs to, so the value
/// passed to [`Rollback::with`] is checked against it at compile time. A
/// handle can be cloned into nested units of work; returning
/// `Err(outer.with(value))` from inside a nested level unwinds every level in
/// between and resolves the outer call to `value`.
pub struct Rollback<T> {
    target: RollbackTarget,
    result: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Rollback<T> {
    pub(crate) const fn root() -> Self {
        Self {
            target: RollbackTarget::Root,
            result: PhantomData,
        }
    }

    pub(crate) const fn savepoint(name: String) -> Self {
        Self {
            target: RollbackTarget::Savepoint(name),
            result: PhantomData,
        }
    }

    /// Level this handle rolls back
    #[must_use]
    pub const fn target(&self) -> &RollbackTarget {
        &self.target
    }

    /// Build the signal; return it as the unit of work's error
    pub fn with(&self, value: T) -> TxError {
        TxError::Rollback(RollbackSignal {
            target: self.target.clone(),
            payload: Mutex::new(Box::new(value)),
        })
    }
}

impl<T> Clone for Rollback<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Rollback<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rollback")
            .field("target", &self.target)
            .field("result", &any::type_name::<T>())
            .finish()
    }
}

/// Failure of a unit of work or of the transaction around it
#[derive(Debug, Error)]
pub enum TxError {
    /// A level asked to be rolled back; never escapes the level it targets
    #[error("rollback requested for {}", .0.target)]
    Rollback(RollbackSignal),
    /// Store failure, including retry exhaustion
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// Application failure raised inside the unit of work
    #[error(transparent)]
    App(#[from] AppError),
}

impl TxError {
    /// The store failure behind this error, if any
    #[must_use]
    pub const fn as_database(&self) -> Option<&DatabaseError> {
        match self {
            Self::Database(error) => Some(error),
            _ => None,
        }
    }

    /// Whether this is a rollback signal
    #[must_use]
    pub const fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback(_))
    }
}

impl From<TxError> for AppError {
    fn from(error: TxError) -> Self {
        match error {
            TxError::App(app) => app,
            TxError::Database(database) => database.into(),
            TxError::Rollback(signal) => Self::new(
                ErrorCode::InternalError,
                format!("unhandled rollback of {}", signal.target),
            ),
        }
    }
}
