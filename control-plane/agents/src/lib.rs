#![warn(missing_docs)]
//! Storage orchestration agents library.
//!
//! It holds the error type shared by the orchestration services and its classification into
//! the failure taxonomy reported to callers.

mod common;

/// Agent level errors.
pub use common::errors;
