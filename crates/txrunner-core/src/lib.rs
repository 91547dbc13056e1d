// ABOUTME: Core types and constants for the txrunner transaction layer
// ABOUTME: Foundation crate with error handling and retry/conflict constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # txrunner core
//!
//! Foundation crate providing the error taxonomy and constants shared by the
//! transaction runner and its store backends. This crate is designed to change
//! infrequently, enabling incremental compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError`, `ErrorCode`, and the store-level `DatabaseError`
//! - **constants**: Retry defaults, conflict codes, and parameter formatting constants

/// Unified error handling system with standard error codes
pub mod errors;

/// Transaction, pool, and store constants organized by domain
pub mod constants;
