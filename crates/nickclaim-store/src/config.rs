//! Store connection settings

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default CQL contact point
pub const DEFAULT_CONTACT_POINT: &str = "127.0.0.1:9042";

/// Default keyspace
pub const DEFAULT_KEYSPACE: &str = "nickclaim";

/// Default number of replicas in the memory cluster
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Embedded quorum-replicated cluster
    #[default]
    Memory,
    /// Cassandra/ScyllaDB over CQL
    Cql,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Cql => "cql",
        }
    }
}

impl Display for StoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "cql" => Ok(StoreBackend::Cql),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

/// Connection settings for a store session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Contact endpoint (`host:port`)
    pub contact_point: String,
    pub keyspace: String,
    /// Replicas in the memory cluster
    pub replication_factor: usize,
    /// Upper bound of the random per-replica latency in the memory cluster (0 = none)
    pub replica_latency_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            contact_point: DEFAULT_CONTACT_POINT.to_string(),
            keyspace: DEFAULT_KEYSPACE.to_string(),
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            replica_latency_ms: 0,
        }
    }
}

impl StoreConfig {
    pub fn replica_latency(&self) -> Option<Duration> {
        (self.replica_latency_ms > 0).then(|| Duration::from_millis(self.replica_latency_ms))
    }
}
