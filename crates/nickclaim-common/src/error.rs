//! Error types for store access
//!
//! This module defines:
//! - `StoreError`: every failure a store session can report
//! - `ErrorKind`: the coarse classification used by startup and the worker loop

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Errors reported by a store session
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("could not connect to the cluster: {0}")]
    Connection(String),

    #[error("could not prepare statements: {0}")]
    Preparation(String),

    #[error("could not perform a query: {0}")]
    Query(String),

    #[error("not enough replicas available: required {required}, alive {alive}")]
    Unavailable { required: usize, alive: usize },

    #[error("nick '{0}' not exist")]
    NickNotFound(String),
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Session could not be established or has been lost
    Connection,
    /// A statement failed to compile against the schema
    Preparation,
    /// A single operation failed at runtime
    Query,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Preparation => "preparation",
            ErrorKind::Query => "query",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::Preparation(_) => ErrorKind::Preparation,
            StoreError::Query(_) | StoreError::Unavailable { .. } | StoreError::NickNotFound(_) => {
                ErrorKind::Query
            }
        }
    }

    /// Whether this error must abort the process when raised during startup
    pub fn is_startup_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Preparation)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
