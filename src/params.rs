// ABOUTME: Statement parameter model shared by the relational and key-value executors
// ABOUTME: Normalizes timestamps to UTC and renders parameters for traces and Redis arguments
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Parameters are sanitized once, here, before any executor sees them.
//!
//! Timestamps are always carried as UTC so that backend-side comparisons do not
//! depend on the session time zone. Stores that only accept strings receive the
//! fixed [`TIMESTAMP_FORMAT`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use txrunner_core::constants::params::TIMESTAMP_FORMAT;

/// Value type a parameter was built from
///
/// Nulls keep it so a typed store can bind them with the column's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// No source type; the store infers one from the statement
    Unknown,
    /// Boolean
    Bool,
    /// Signed integer
    Int,
    /// Floating point
    Float,
    /// Text
    Text,
    /// Raw bytes
    Bytes,
    /// JSON document
    Json,
    /// Point in time
    Timestamp,
}

/// A single statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL `NULL` / empty Redis argument
    Null(ParamKind),
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// JSON document
    Json(Value),
    /// Point in time, normalized to UTC
    Timestamp(DateTime<Utc>),
}

impl Param {
    /// Null with no source type
    #[must_use]
    pub const fn null() -> Self {
        Self::Null(ParamKind::Unknown)
    }

    /// Type this parameter was built from
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        match self {
            Self::Null(kind) => *kind,
            Self::Bool(_) => ParamKind::Bool,
            Self::Int(_) => ParamKind::Int,
            Self::Float(_) => ParamKind::Float,
            Self::Text(_) => ParamKind::Text,
            Self::Bytes(_) => ParamKind::Bytes,
            Self::Json(_) => ParamKind::Json,
            Self::Timestamp(_) => ParamKind::Timestamp,
        }
    }

    /// Render for stores that take string arguments and for traces
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null(_) => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::Bytes(value) => String::from_utf8_lossy(value).into_owned(),
            Self::Json(value) => value.to_string(),
            Self::Timestamp(value) => format_timestamp(value),
        }
    }

    /// Render as an SQL literal, for human-readable traces only
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null(_) => "NULL".to_owned(),
            Self::Bool(_) | Self::Int(_) | Self::Float(_) => self.render(),
            Self::Bytes(value) => format!("'\\x{}'", hex::encode(value)),
            Self::Text(_) | Self::Json(_) | Self::Timestamp(_) => {
                format!("'{}'", self.render().replace('\'', "''"))
            }
        }
    }

    /// Bytes handed to the key-value store
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bytes(value) => value.clone(),
            other => other.render().into_bytes(),
        }
    }
}

/// Format a UTC timestamp in the fixed exchange format
#[must_use]
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Render every parameter, in order
#[must_use]
pub fn render_all(params: &[Param]) -> Vec<String> {
    params.iter().map(Param::render).collect()
}

/// Substitute `$n` placeholders with literal values for a debug trace
///
/// One left-to-right scan, so text already substituted is never rescanned and
/// `$1` cannot match the prefix of `$10`. Placeholders without a parameter are
/// left as written. The output must never be executed.
#[must_use]
pub fn interpolate(statement: &str, params: &[Param]) -> String {
    let mut text = String::with_capacity(statement.len());
    let mut rest = statement;
    while let Some(at) = rest.find('$') {
        text.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let param = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|position| position.checked_sub(1))
            .and_then(|index| params.get(index));
        match param {
            Some(param) => text.push_str(&param.to_sql_literal()),
            None => {
                text.push('$');
                text.push_str(&after[..digits]);
            }
        }
        rest = &after[digits..];
    }
    text.push_str(rest);
    text
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Param {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null(ParamKind::Json),
            other => Self::Json(other),
        }
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for Param {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(value.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for Param {
    /// Naive datetimes are taken to be UTC already
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(Utc.from_utc_datetime(&value))
    }
}

/// Rust types with a fixed [`ParamKind`], so `None::<T>` still carries a type
pub trait ParamType: Into<Param> {
    /// Kind of every value of this type
    const KIND: ParamKind;
}

macro_rules! param_type {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(impl ParamType for $ty {
            const KIND: ParamKind = ParamKind::$kind;
        })+
    };
}

param_type! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    &str => Text,
    String => Text,
    Vec<u8> => Bytes,
    Value => Json,
    DateTime<Utc> => Timestamp,
    DateTime<FixedOffset> => Timestamp,
    NaiveDateTime => Timestamp,
}

impl<T: ParamType> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null(T::KIND), Into::into)
    }
}

/// Build a parameter list from heterogeneous values
///
/// ```
/// use txrunner::params;
/// let list = params![1_i64, "alice", None::<String>];
/// assert_eq!(list.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::params::Param>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::params::Param::from($value)),+]
    };
}
