//! CQL backend over the scylla driver
//!
//! Talks to a Cassandra/ScyllaDB cluster with a default execution profile
//! pinned to QUORUM, so every statement runs at that level.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::Consistency as CqlConsistency;
use scylla::statement::prepared::PreparedStatement;
use tracing::{debug, info, trace};

use nickclaim_common::{Result, StoreError};

use crate::model::NickRecord;
use crate::session::StoreSession;
use crate::statement::{PreparedStatements, StatementKind};

type NickRow = (String, Option<String>);

/// Session to a CQL cluster bound to one keyspace
pub struct CqlSession {
    session: Session,
    contact_point: String,
    keyspace: String,
    statements: PreparedStatements<PreparedStatement>,
    closed: AtomicBool,
}

fn query_error(e: impl Display) -> StoreError {
    StoreError::Query(e.to_string())
}

impl CqlSession {
    pub async fn connect(contact_point: &str, keyspace: &str) -> Result<Self> {
        let profile = ExecutionProfile::builder()
            .consistency(CqlConsistency::Quorum)
            .build();

        let session = SessionBuilder::new()
            .known_node(contact_point)
            .use_keyspace(keyspace, false)
            .default_execution_profile_handle(profile.into_handle())
            .build()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let statements = Self::prepare(&session).await?;
        info!("Statements prepared");

        Ok(Self {
            session,
            contact_point: contact_point.to_string(),
            keyspace: keyspace.to_string(),
            statements,
            closed: AtomicBool::new(false),
        })
    }

    async fn prepare(session: &Session) -> Result<PreparedStatements<PreparedStatement>> {
        Ok(PreparedStatements {
            select_all: Self::prepare_one(session, StatementKind::SelectAll).await?,
            select_by_nick: Self::prepare_one(session, StatementKind::SelectByNick).await?,
            upsert: Self::prepare_one(session, StatementKind::Upsert).await?,
            set_status: Self::prepare_one(session, StatementKind::SetStatus).await?,
            clear_status: Self::prepare_one(session, StatementKind::ClearStatus).await?,
        })
    }

    async fn prepare_one(session: &Session, kind: StatementKind) -> Result<PreparedStatement> {
        session
            .prepare(kind.cql())
            .await
            .map_err(|e| StoreError::Preparation(format!("{}: {}", kind, e)))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Connection("session is closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreSession for CqlSession {
    async fn list_all(&self) -> Result<Vec<NickRecord>> {
        self.ensure_open()?;
        let result = self
            .session
            .execute_unpaged(&self.statements.select_all, ())
            .await
            .map_err(query_error)?;
        let rows = result.into_rows_result().map_err(query_error)?;

        let mut records = Vec::new();
        for row in rows.rows::<NickRow>().map_err(query_error)? {
            let (name, status) = row.map_err(query_error)?;
            records.push(NickRecord::new(name, status));
        }
        Ok(records)
    }

    async fn get_status(&self, name: &str) -> Result<Option<String>> {
        self.ensure_open()?;
        let result = self
            .session
            .execute_unpaged(&self.statements.select_by_nick, (name,))
            .await
            .map_err(query_error)?;
        let rows = result.into_rows_result().map_err(query_error)?;

        let (_, status) = rows
            .maybe_first_row::<NickRow>()
            .map_err(query_error)?
            .ok_or_else(|| StoreError::NickNotFound(name.to_string()))?;

        trace!("Status: {:?}", status);
        Ok(status)
    }

    async fn set_status(&self, name: &str, holder: &str) -> Result<()> {
        self.ensure_open()?;
        self.session
            .execute_unpaged(&self.statements.set_status, (holder, name))
            .await
            .map_err(query_error)?;

        debug!("Set {} status for {} nick", holder, name);
        Ok(())
    }

    async fn clear_status(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.session
            .execute_unpaged(&self.statements.clear_status, (name,))
            .await
            .map_err(query_error)?;

        debug!("Status deleted for: {}", name);
        Ok(())
    }

    async fn upsert(&self, name: &str, status: Option<&str>) -> Result<()> {
        self.ensure_open()?;
        self.session
            .execute_unpaged(&self.statements.upsert, (name, status))
            .await
            .map_err(query_error)?;

        debug!("Nick {} upserted", name);
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Session to {} closed", self.contact_point);
        }
    }

    fn describe(&self) -> String {
        format!(
            "cql cluster {} keyspace={} consistency=QUORUM",
            self.contact_point, self.keyspace
        )
    }
}
