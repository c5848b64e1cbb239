//! Nickclaim Common - Shared error taxonomy and retry policy
//!
//! This crate provides the foundational types used across all nickclaim components:
//! - Store error types and their classification
//! - Retry/backoff policy applied at the worker loop boundary

pub mod error;
pub mod retry;

// Re-exports for convenience
pub use error::{ErrorKind, Result, StoreError};
pub use retry::RetryConfig;

/// Name of the relation holding the candidate names
pub const NICKS_TABLE: &str = "nicks";

/// Primary key column of the `nicks` relation
pub const NICK_COLUMN: &str = "nick";

/// Holder column of the `nicks` relation
pub const STATUS_COLUMN: &str = "status";
