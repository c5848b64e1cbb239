//! Embedded quorum-replicated store
//!
//! This module provides:
//! - `MemoryCluster`: replicas, schema catalog, quorum reads/writes with read repair
//! - `MemorySession`: a `StoreSession` bound to one keyspace of a cluster

mod cluster;
mod session;

pub use cluster::{MemoryCluster, MemoryClusterBuilder, TableSchema};
pub use session::{MemorySession, PreparedHandle};
