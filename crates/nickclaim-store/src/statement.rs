//! Fixed set of parameterized statements issued against `nicks`

use std::fmt::{Display, Formatter};

use nickclaim_common::{NICK_COLUMN, NICKS_TABLE, STATUS_COLUMN};

/// The statements a session prepares once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    SelectAll,
    SelectByNick,
    Upsert,
    SetStatus,
    ClearStatus,
}

impl StatementKind {
    pub const ALL: [StatementKind; 5] = [
        StatementKind::SelectAll,
        StatementKind::SelectByNick,
        StatementKind::Upsert,
        StatementKind::SetStatus,
        StatementKind::ClearStatus,
    ];

    /// CQL text of the statement
    pub fn cql(self) -> &'static str {
        match self {
            StatementKind::SelectAll => "SELECT nick, status FROM nicks",
            StatementKind::SelectByNick => "SELECT nick, status FROM nicks WHERE nick = ?",
            StatementKind::Upsert => "INSERT INTO nicks (nick, status) VALUES (?, ?)",
            StatementKind::SetStatus => "UPDATE nicks SET status = ? WHERE nick = ?",
            StatementKind::ClearStatus => "UPDATE nicks SET status = null WHERE nick = ?",
        }
    }

    /// Table the statement targets
    pub fn table(self) -> &'static str {
        NICKS_TABLE
    }

    /// Columns the statement references
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            StatementKind::SelectAll | StatementKind::SelectByNick | StatementKind::Upsert => {
                &[NICK_COLUMN, STATUS_COLUMN]
            }
            StatementKind::SetStatus | StatementKind::ClearStatus => &[STATUS_COLUMN, NICK_COLUMN],
        }
    }

    /// Number of bind markers
    pub fn bind_count(self) -> usize {
        self.cql().matches('?').count()
    }

    pub fn name(self) -> &'static str {
        match self {
            StatementKind::SelectAll => "select_all",
            StatementKind::SelectByNick => "select_by_nick",
            StatementKind::Upsert => "upsert",
            StatementKind::SetStatus => "set_status",
            StatementKind::ClearStatus => "clear_status",
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Immutable handles for every statement, owned by a session.
///
/// `H` is the backend's prepared handle type.
#[derive(Debug, Clone)]
pub struct PreparedStatements<H> {
    pub select_all: H,
    pub select_by_nick: H,
    pub upsert: H,
    pub set_status: H,
    pub clear_status: H,
}

impl<H> PreparedStatements<H> {
    /// Prepare every statement with `prepare`, stopping at the first failure
    pub fn try_build<E>(mut prepare: impl FnMut(StatementKind) -> Result<H, E>) -> Result<Self, E> {
        Ok(Self {
            select_all: prepare(StatementKind::SelectAll)?,
            select_by_nick: prepare(StatementKind::SelectByNick)?,
            upsert: prepare(StatementKind::Upsert)?,
            set_status: prepare(StatementKind::SetStatus)?,
            clear_status: prepare(StatementKind::ClearStatus)?,
        })
    }

    pub fn get(&self, kind: StatementKind) -> &H {
        match kind {
            StatementKind::SelectAll => &self.select_all,
            StatementKind::SelectByNick => &self.select_by_nick,
            StatementKind::Upsert => &self.upsert,
            StatementKind::SetStatus => &self.set_status,
            StatementKind::ClearStatus => &self.clear_status,
        }
    }
}
