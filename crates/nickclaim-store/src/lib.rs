//! Nickclaim Store - access to the replicated `nicks` relation
//!
//! This crate provides:
//! - The `StoreSession` trait shared by every contender
//! - The fixed set of prepared statements
//! - An in-process quorum-replicated memory cluster
//! - A CQL backend over the scylla driver (feature `cql`)

pub mod config;
#[cfg(feature = "cql")]
pub mod cql;
pub mod memory;
pub mod model;
pub mod session;
pub mod statement;

use std::sync::Arc;

use tracing::info;

pub use config::{StoreBackend, StoreConfig};
#[cfg(feature = "cql")]
pub use cql::CqlSession;
pub use memory::{MemoryCluster, MemorySession, TableSchema};
pub use model::{Consistency, NickRecord, StateSnapshot};
pub use nickclaim_common::{ErrorKind, Result, StoreError};
pub use session::StoreSession;
pub use statement::{PreparedStatements, StatementKind};

/// Connect to the store described by `config`.
///
/// The memory backend starts an embedded cluster with the `nicks` schema
/// already in place, so it is ready for bootstrap.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn StoreSession>> {
    info!(
        "Connecting to {} store at {} (keyspace: {})",
        config.backend, config.contact_point, config.keyspace
    );

    match config.backend {
        StoreBackend::Memory => {
            let cluster = MemoryCluster::builder()
                .replication_factor(config.replication_factor)
                .replica_latency(config.replica_latency())
                .build();
            cluster.create_keyspace(&config.keyspace);
            cluster.create_table(&config.keyspace, TableSchema::nicks())?;
            let session = MemorySession::connect(&cluster, &config.keyspace)?;
            Ok(Arc::new(session))
        }
        #[cfg(feature = "cql")]
        StoreBackend::Cql => {
            let session = CqlSession::connect(&config.contact_point, &config.keyspace).await?;
            Ok(Arc::new(session))
        }
        #[cfg(not(feature = "cql"))]
        StoreBackend::Cql => Err(StoreError::Connection(
            "cql backend requested but nickclaim-store was built without the `cql` feature"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let config = StoreConfig::default();
        let session = connect(&config).await.unwrap();
        assert!(session.list_all().await.unwrap().is_empty());
        assert!(session.describe().contains("memory"));
    }

    #[cfg(not(feature = "cql"))]
    #[tokio::test]
    async fn test_connect_cql_without_feature() {
        let config = StoreConfig {
            backend: StoreBackend::Cql,
            ..Default::default()
        };
        let err = connect(&config).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
