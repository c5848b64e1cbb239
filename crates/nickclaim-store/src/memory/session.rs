//! Store session over a [`MemoryCluster`]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, trace};

use nickclaim_common::{Result, StoreError};

use super::cluster::{MemoryCluster, RowKey, StoredRow};
use crate::model::{Consistency, NickRecord};
use crate::session::StoreSession;
use crate::statement::{PreparedStatements, StatementKind};

/// A statement validated against the cluster catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    pub kind: StatementKind,
    pub keyspace: String,
    pub table: String,
}

/// Session bound to one keyspace of a memory cluster
pub struct MemorySession {
    cluster: MemoryCluster,
    keyspace: String,
    consistency: Consistency,
    statements: PreparedStatements<PreparedHandle>,
    last_timestamp: AtomicI64,
    closed: AtomicBool,
}

impl MemorySession {
    /// Connect at QUORUM consistency
    pub fn connect(cluster: &MemoryCluster, keyspace: &str) -> Result<Self> {
        Self::connect_with_consistency(cluster, keyspace, Consistency::Quorum)
    }

    pub fn connect_with_consistency(
        cluster: &MemoryCluster,
        keyspace: &str,
        consistency: Consistency,
    ) -> Result<Self> {
        if !cluster.is_running() {
            return Err(StoreError::Connection("cluster is shut down".to_string()));
        }
        if !cluster.has_keyspace(keyspace) {
            return Err(StoreError::Connection(format!(
                "keyspace '{}' does not exist",
                keyspace
            )));
        }

        let statements = Self::prepare(cluster, keyspace)?;
        info!("Statements prepared");

        Ok(Self {
            cluster: cluster.clone(),
            keyspace: keyspace.to_string(),
            consistency,
            statements,
            last_timestamp: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn prepare(
        cluster: &MemoryCluster,
        keyspace: &str,
    ) -> Result<PreparedStatements<PreparedHandle>> {
        PreparedStatements::try_build(|kind| {
            let table = cluster.table(keyspace, kind.table()).ok_or_else(|| {
                StoreError::Preparation(format!(
                    "unconfigured table {}.{} in `{}`",
                    keyspace,
                    kind.table(),
                    kind.cql()
                ))
            })?;

            if let Some(column) = kind.columns().iter().find(|c| !table.has_column(c)) {
                return Err(StoreError::Preparation(format!(
                    "undefined column name {} in `{}`",
                    column,
                    kind.cql()
                )));
            }

            Ok(PreparedHandle {
                kind,
                keyspace: keyspace.to_string(),
                table: table.name,
            })
        })
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub fn cluster(&self) -> &MemoryCluster {
        &self.cluster
    }

    /// Strictly increasing client-side write timestamp (micros)
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_micros();
        let previous = self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Connection("session is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn row_key(handle: &PreparedHandle, name: &str) -> RowKey {
        RowKey::new(&handle.keyspace, &handle.table, name)
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn list_all(&self) -> Result<Vec<NickRecord>> {
        self.ensure_open()?;
        let handle = &self.statements.select_all;
        let rows = self
            .cluster
            .scan(&handle.keyspace, &handle.table, self.consistency)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|(name, row)| row.to_record(name))
            .collect())
    }

    async fn get_status(&self, name: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        let key = Self::row_key(&self.statements.select_by_nick, name);
        let row = self
            .cluster
            .read(&key, self.consistency)
            .await?
            .and_then(|row| row.to_record(name))
            .ok_or_else(|| StoreError::NickNotFound(name.to_string()))?;

        trace!("Status: {:?}", row.status);
        Ok(row.status)
    }

    async fn set_status(&self, name: &str, holder: &str) -> Result<()> {
        self.ensure_open()?;
        let key = Self::row_key(&self.statements.set_status, name);
        let fragment = StoredRow::status_update(Some(holder.to_string()), self.next_timestamp());
        self.cluster.write(&key, &fragment, self.consistency).await?;

        debug!("Set {} status for {} nick", holder, name);
        Ok(())
    }

    async fn clear_status(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let key = Self::row_key(&self.statements.clear_status, name);
        let fragment = StoredRow::status_update(None, self.next_timestamp());
        self.cluster.write(&key, &fragment, self.consistency).await?;

        debug!("Status deleted for: {}", name);
        Ok(())
    }

    async fn upsert(&self, name: &str, status: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        let key = Self::row_key(&self.statements.upsert, name);
        let fragment = StoredRow::inserted(status.map(str::to_string), self.next_timestamp());
        self.cluster.write(&key, &fragment, self.consistency).await?;

        debug!("Nick {} upserted", name);
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Session to keyspace {} closed", self.keyspace);
        }
    }

    fn describe(&self) -> String {
        format!(
            "memory cluster (rf={}) keyspace={} consistency={}",
            self.cluster.replication_factor(),
            self.keyspace,
            self.consistency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::TableSchema;

    const NAMES: [&str; 4] = ["robert", "marcin", "maciej", "filip"];

    async fn bootstrapped() -> MemorySession {
        let cluster = MemoryCluster::with_nicks_schema(3, "nickclaim");
        let session = MemorySession::connect(&cluster, "nickclaim").unwrap();
        for name in NAMES {
            session.upsert(name, None).await.unwrap();
        }
        session
    }

    #[tokio::test]
    async fn test_bootstrap_lists_every_name_free() {
        let session = bootstrapped().await;
        let mut records = session.list_all().await.unwrap();
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let mut expected: Vec<NickRecord> = NAMES.iter().map(|n| NickRecord::free(*n)).collect();
        expected.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(records, expected);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let session = bootstrapped().await;
        session.clear_status("maciej").await.unwrap();
        session.clear_status("maciej").await.unwrap();
        assert_eq!(session.get_status("maciej").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_your_write() {
        let session = bootstrapped().await;
        session.set_status("robert", "host-3").await.unwrap();
        assert_eq!(
            session.get_status("robert").await.unwrap(),
            Some("host-3".to_string())
        );

        // Unconditional overwrite
        session.set_status("robert", "host-4").await.unwrap();
        assert_eq!(
            session.get_status("robert").await.unwrap(),
            Some("host-4".to_string())
        );
    }

    #[tokio::test]
    async fn test_clear_keeps_rows() {
        let session = bootstrapped().await;
        for name in NAMES {
            session.set_status(name, "host-0").await.unwrap();
            session.clear_status(name).await.unwrap();
        }
        let records = session.list_all().await.unwrap();
        assert_eq!(records.len(), NAMES.len());
        assert!(records.iter().all(NickRecord::is_free));
    }

    #[tokio::test]
    async fn test_missing_nick() {
        let session = bootstrapped().await;
        let err = session.get_status("zbigniew").await.unwrap_err();
        assert_eq!(err, StoreError::NickNotFound("zbigniew".to_string()));

        // Clearing a missing row does not make it visible
        session.clear_status("zbigniew").await.unwrap();
        assert_eq!(session.list_all().await.unwrap().len(), NAMES.len());

        // UPDATE creates the row
        session.set_status("zbigniew", "host-1").await.unwrap();
        assert_eq!(session.list_all().await.unwrap().len(), NAMES.len() + 1);
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let cluster = MemoryCluster::new(3);
        let err = MemorySession::connect(&cluster, "nickclaim").err().unwrap();
        assert!(matches!(err, StoreError::Connection(_)));

        // Keyspace without the nicks table fails to prepare
        cluster.create_keyspace("nickclaim");
        let err = MemorySession::connect(&cluster, "nickclaim").err().unwrap();
        assert!(matches!(err, StoreError::Preparation(_)));

        // Table missing the status column
        cluster
            .create_table("nickclaim", TableSchema::new("nicks", "nick", &["nick"]))
            .unwrap();
        let err = MemorySession::connect(&cluster, "nickclaim").err().unwrap();
        assert!(err.to_string().contains("undefined column name status"));

        cluster.create_table("nickclaim", TableSchema::nicks()).unwrap();
        assert!(MemorySession::connect(&cluster, "nickclaim").is_ok());

        cluster.shutdown();
        let err = MemorySession::connect(&cluster, "nickclaim").err().unwrap();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_close_fails_later_calls() {
        let session = bootstrapped().await;
        session.close().await;
        let err = session.list_all().await.unwrap_err();
        assert!(err.is_startup_fatal());
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_unavailable_is_query_error() {
        let session = bootstrapped().await;
        session.cluster().set_replica_up(0, false);
        session.cluster().set_replica_up(1, false);
        let err = session.set_status("filip", "host-2").await.unwrap_err();
        assert_eq!(err.kind(), nickclaim_common::ErrorKind::Query);

        session.cluster().set_replica_up(1, true);
        session.set_status("filip", "host-2").await.unwrap();
        assert_eq!(
            session.get_status("filip").await.unwrap(),
            Some("host-2".to_string())
        );
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let cluster = MemoryCluster::with_nicks_schema(1, "ks");
        let session = MemorySession::connect(&cluster, "ks").unwrap();
        let mut last = 0;
        for _ in 0..1000 {
            let ts = session.next_timestamp();
            assert!(ts > last);
            last = ts;
        }
    }
}
