//! Store session trait shared by every contender

use async_trait::async_trait;
use nickclaim_common::Result;

use crate::model::NickRecord;

/// Single point of access to the replicated `nicks` relation.
///
/// One session is shared by all workers and must tolerate concurrent calls
/// without client-side locking. Every call runs at the session's fixed
/// consistency level. No two calls are atomic with respect to each other:
/// `set_status` overwrites unconditionally and is not a compare-and-swap.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Every visible row, in unspecified order
    async fn list_all(&self) -> Result<Vec<NickRecord>>;

    /// Current holder of `name`, `None` when free
    async fn get_status(&self, name: &str) -> Result<Option<String>>;

    /// Overwrite the holder of `name` regardless of its prior value
    async fn set_status(&self, name: &str, holder: &str) -> Result<()>;

    /// Mark `name` free; the row itself is kept
    async fn clear_status(&self, name: &str) -> Result<()>;

    /// Insert or replace the whole row (bootstrap only)
    async fn upsert(&self, name: &str, status: Option<&str>) -> Result<()>;

    /// Close the session; later calls fail with a connection error
    async fn close(&self);

    /// Short label naming backend, endpoint, keyspace and consistency
    fn describe(&self) -> String;
}
