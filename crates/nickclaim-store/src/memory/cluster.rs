//! In-process replicated store
//!
//! Every row lives on each of `replication_factor` replicas. Reads and
//! writes contact as many live replicas as the requested consistency level
//! needs and reconcile cells by write timestamp, last write wins. There is
//! no coordination between two operations, which is exactly what the claim
//! protocol runs into.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use nickclaim_common::{NICK_COLUMN, NICKS_TABLE, Result, STATUS_COLUMN, StoreError};

use crate::model::{Consistency, NickRecord};

/// Schema of one table in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// `nicks(nick text PRIMARY KEY, status text)`
    pub fn nicks() -> Self {
        Self::new(NICKS_TABLE, NICK_COLUMN, &[NICK_COLUMN, STATUS_COLUMN])
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[derive(Debug, Default)]
struct KeyspaceSchema {
    tables: HashMap<String, TableSchema>,
}

/// Location of a row across the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RowKey {
    pub keyspace: String,
    pub table: String,
    pub key: String,
}

impl RowKey {
    pub fn new(keyspace: &str, table: &str, key: &str) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            key: key.to_string(),
        }
    }
}

/// A single column value with its write timestamp (micros)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cell {
    pub value: Option<String>,
    pub timestamp: i64,
}

impl Cell {
    /// Whether `self` supersedes `other` under last-write-wins
    fn supersedes(&self, other: &Cell) -> bool {
        if self.timestamp != other.timestamp {
            return self.timestamp > other.timestamp;
        }
        match (&self.value, &other.value) {
            // Tombstones win timestamp ties
            (None, Some(_)) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a > b,
            (None, None) => false,
        }
    }
}

/// Replica-local state of a row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StoredRow {
    /// Primary key liveness written by INSERT
    pub liveness: Option<i64>,
    pub status: Option<Cell>,
}

impl StoredRow {
    /// Row fragment written by `INSERT (nick, status)`
    pub fn inserted(status: Option<String>, timestamp: i64) -> Self {
        Self {
            liveness: Some(timestamp),
            status: Some(Cell {
                value: status,
                timestamp,
            }),
        }
    }

    /// Row fragment written by `UPDATE ... SET status`
    pub fn status_update(status: Option<String>, timestamp: i64) -> Self {
        Self {
            liveness: None,
            status: Some(Cell {
                value: status,
                timestamp,
            }),
        }
    }

    /// Merge `other` into `self`, returning whether anything changed
    pub fn merge(&mut self, other: &StoredRow) -> bool {
        let mut changed = false;

        if other.liveness > self.liveness {
            self.liveness = other.liveness;
            changed = true;
        }

        if let Some(incoming) = &other.status {
            let replace = match &self.status {
                Some(current) => incoming.supersedes(current),
                None => true,
            };
            if replace {
                self.status = Some(incoming.clone());
                changed = true;
            }
        }

        changed
    }

    pub fn is_visible(&self) -> bool {
        self.liveness.is_some() || self.status_value().is_some()
    }

    pub fn status_value(&self) -> Option<&str> {
        self.status.as_ref().and_then(|c| c.value.as_deref())
    }

    pub fn to_record(&self, name: &str) -> Option<NickRecord> {
        self.is_visible()
            .then(|| NickRecord::new(name, self.status_value().map(str::to_string)))
    }
}

struct Replica {
    id: usize,
    up: AtomicBool,
    rows: DashMap<RowKey, StoredRow>,
}

impl Replica {
    fn new(id: usize) -> Self {
        Self {
            id,
            up: AtomicBool::new(true),
            rows: DashMap::new(),
        }
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    fn apply(&self, key: &RowKey, fragment: &StoredRow) -> bool {
        self.rows.entry(key.clone()).or_default().merge(fragment)
    }

    fn get(&self, key: &RowKey) -> Option<StoredRow> {
        self.rows.get(key).map(|r| r.clone())
    }

    fn scan(&self, keyspace: &str, table: &str) -> Vec<(RowKey, StoredRow)> {
        self.rows
            .iter()
            .filter(|e| e.key().keyspace == keyspace && e.key().table == table)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

struct ClusterInner {
    replicas: Vec<Replica>,
    catalog: RwLock<HashMap<String, KeyspaceSchema>>,
    replica_latency: Option<Duration>,
    running: AtomicBool,
}

/// Builder for [`MemoryCluster`]
#[derive(Debug, Clone)]
pub struct MemoryClusterBuilder {
    replication_factor: usize,
    replica_latency: Option<Duration>,
}

impl Default for MemoryClusterBuilder {
    fn default() -> Self {
        Self {
            replication_factor: crate::config::DEFAULT_REPLICATION_FACTOR,
            replica_latency: None,
        }
    }
}

impl MemoryClusterBuilder {
    pub fn replication_factor(mut self, replication_factor: usize) -> Self {
        self.replication_factor = replication_factor.max(1);
        self
    }

    /// Upper bound of a random delay before each replica is touched
    pub fn replica_latency(mut self, latency: Option<Duration>) -> Self {
        self.replica_latency = latency;
        self
    }

    pub fn build(self) -> MemoryCluster {
        info!(
            "Starting memory cluster with {} replicas",
            self.replication_factor
        );
        MemoryCluster {
            inner: Arc::new(ClusterInner {
                replicas: (0..self.replication_factor).map(Replica::new).collect(),
                catalog: RwLock::new(HashMap::new()),
                replica_latency: self.replica_latency,
                running: AtomicBool::new(true),
            }),
        }
    }
}

/// Handle to an in-process replicated cluster; clones share the same replicas
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

impl std::fmt::Debug for MemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCluster")
            .field("replication_factor", &self.replication_factor())
            .field("alive", &self.alive_replicas())
            .field("running", &self.is_running())
            .finish()
    }
}

impl MemoryCluster {
    pub fn builder() -> MemoryClusterBuilder {
        MemoryClusterBuilder::default()
    }

    pub fn new(replication_factor: usize) -> Self {
        Self::builder()
            .replication_factor(replication_factor)
            .build()
    }

    /// Cluster with `keyspace` and the `nicks` table already created
    pub fn with_nicks_schema(replication_factor: usize, keyspace: &str) -> Self {
        let cluster = Self::new(replication_factor);
        cluster
            .inner
            .catalog
            .write()
            .entry(keyspace.to_string())
            .or_default()
            .tables
            .insert(NICKS_TABLE.to_string(), TableSchema::nicks());
        cluster
    }

    pub fn replication_factor(&self) -> usize {
        self.inner.replicas.len()
    }

    pub fn create_keyspace(&self, name: &str) {
        let mut catalog = self.inner.catalog.write();
        if !catalog.contains_key(name) {
            catalog.insert(name.to_string(), KeyspaceSchema::default());
            debug!("Keyspace {} created", name);
        }
    }

    pub fn create_table(&self, keyspace: &str, schema: TableSchema) -> Result<()> {
        let mut catalog = self.inner.catalog.write();
        let ks = catalog
            .get_mut(keyspace)
            .ok_or_else(|| StoreError::Query(format!("keyspace '{}' does not exist", keyspace)))?;
        debug!("Table {}.{} created", keyspace, schema.name);
        ks.tables.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn has_keyspace(&self, keyspace: &str) -> bool {
        self.inner.catalog.read().contains_key(keyspace)
    }

    pub(crate) fn table(&self, keyspace: &str, table: &str) -> Option<TableSchema> {
        self.inner
            .catalog
            .read()
            .get(keyspace)
            .and_then(|ks| ks.tables.get(table).cloned())
    }

    pub fn set_replica_up(&self, replica: usize, up: bool) {
        if let Some(r) = self.inner.replicas.get(replica) {
            r.up.store(up, Ordering::SeqCst);
            info!(
                "Replica {} marked {}",
                r.id,
                if up { "up" } else { "down" }
            );
        }
    }

    pub fn alive_replicas(&self) -> usize {
        self.inner.replicas.iter().filter(|r| r.is_up()).count()
    }

    /// Stop the cluster; connected sessions lose their connection
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        info!("Memory cluster shut down");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Row as held by a single replica, ignoring consistency
    pub fn replica_record(&self, replica: usize, keyspace: &str, nick: &str) -> Option<NickRecord> {
        let key = RowKey::new(keyspace, NICKS_TABLE, nick);
        self.inner
            .replicas
            .get(replica)?
            .get(&key)?
            .to_record(nick)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(StoreError::Connection("cluster is shut down".to_string()))
        }
    }

    /// Live replicas in random coordinator order, or `Unavailable`
    fn live_replicas(&self, consistency: Consistency) -> Result<(Vec<&Replica>, usize)> {
        let required = consistency.required_acks(self.replication_factor());
        let mut live: Vec<&Replica> = self.inner.replicas.iter().filter(|r| r.is_up()).collect();
        if live.len() < required {
            return Err(StoreError::Unavailable {
                required,
                alive: live.len(),
            });
        }
        live.shuffle(&mut rand::rng());
        Ok((live, required))
    }

    /// Network hop to a replica
    async fn hop(&self) {
        match self.inner.replica_latency {
            Some(max) if !max.is_zero() => {
                let micros = rand::rng().random_range(0..=max.as_micros() as u64);
                tokio::time::sleep(Duration::from_micros(micros)).await;
            }
            _ => tokio::task::yield_now().await,
        }
    }

    /// Apply `fragment` to every live replica; succeeds once `consistency` acks arrived
    pub(crate) async fn write(
        &self,
        key: &RowKey,
        fragment: &StoredRow,
        consistency: Consistency,
    ) -> Result<()> {
        self.ensure_running()?;
        let (live, required) = self.live_replicas(consistency)?;

        let mut acks = 0;
        for replica in live {
            self.hop().await;
            // The replica may have gone down while the write was in flight
            if replica.is_up() {
                replica.apply(key, fragment);
                acks += 1;
            }
        }

        if acks < required {
            return Err(StoreError::Unavailable {
                required,
                alive: acks,
            });
        }
        Ok(())
    }

    /// Read `key` from enough replicas, reconcile and repair stale replicas
    pub(crate) async fn read(
        &self,
        key: &RowKey,
        consistency: Consistency,
    ) -> Result<Option<StoredRow>> {
        self.ensure_running()?;
        let (live, required) = self.live_replicas(consistency)?;
        let contacted = &live[..required];

        let mut responses = Vec::with_capacity(required);
        for replica in contacted {
            self.hop().await;
            responses.push(replica.get(key));
        }

        let mut merged: Option<StoredRow> = None;
        for row in responses.iter().flatten() {
            merged.get_or_insert_with(StoredRow::default).merge(row);
        }

        if let Some(newest) = &merged {
            for (replica, response) in contacted.iter().zip(&responses) {
                if response.as_ref() != Some(newest) && replica.apply(key, newest) {
                    debug!("Read repair of {} on replica {}", key.key, replica.id);
                }
            }
        }

        Ok(merged)
    }

    /// Read every row of `keyspace.table` from enough replicas, with read repair
    pub(crate) async fn scan(
        &self,
        keyspace: &str,
        table: &str,
        consistency: Consistency,
    ) -> Result<Vec<(String, StoredRow)>> {
        self.ensure_running()?;
        let (live, required) = self.live_replicas(consistency)?;
        let contacted = &live[..required];

        let mut merged: BTreeMap<String, (RowKey, StoredRow)> = BTreeMap::new();
        let mut responses = Vec::with_capacity(required);
        for replica in contacted {
            self.hop().await;
            let rows = replica.scan(keyspace, table);
            for (key, row) in &rows {
                merged
                    .entry(key.key.clone())
                    .or_insert_with(|| (key.clone(), StoredRow::default()))
                    .1
                    .merge(row);
            }
            responses.push(rows);
        }

        for (replica, rows) in contacted.iter().zip(&responses) {
            let held: HashMap<&RowKey, &StoredRow> = rows.iter().map(|(k, r)| (k, r)).collect();
            for (key, newest) in merged.values() {
                if held.get(key).copied() != Some(newest) {
                    replica.apply(key, newest);
                }
            }
        }

        Ok(merged
            .into_iter()
            .map(|(name, (_, row))| (name, row))
            .collect())
    }
}
