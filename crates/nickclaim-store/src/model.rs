//! Data model of the `nicks` relation

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// One row of the `nicks` relation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NickRecord {
    /// Primary key, immutable after bootstrap
    pub name: String,
    /// Current claimant, `None` when the name is free
    #[serde(default)]
    pub status: Option<String>,
}

impl NickRecord {
    pub fn new(name: impl Into<String>, status: Option<String>) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    pub fn free(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn is_free(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.status.as_deref() == Some(holder)
    }
}

impl Display for NickRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Nick: {:<10},Status: {:<10}",
            self.name,
            self.status.as_deref().unwrap_or("null")
        )
    }
}

/// Snapshot of every visible row, rendered for the console
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub records: Vec<NickRecord>,
}

impl StateSnapshot {
    pub fn new(records: Vec<NickRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn held(&self) -> usize {
        self.records.iter().filter(|r| !r.is_free()).count()
    }
}

impl Display for StateSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Nicks{{ ")?;
        for record in &self.records {
            writeln!(f, "{}", record)?;
        }
        write!(f, "}}")
    }
}

/// Replica acknowledgement level applied to every read and write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    One,
    #[default]
    Quorum,
    All,
}

impl Consistency {
    /// Replica acknowledgements required for a replication factor of `rf`
    pub fn required_acks(self, rf: usize) -> usize {
        match self {
            Consistency::One => 1.min(rf),
            Consistency::Quorum => rf / 2 + 1,
            Consistency::All => rf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Consistency::One => "ONE",
            Consistency::Quorum => "QUORUM",
            Consistency::All => "ALL",
        }
    }
}

impl Display for Consistency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_display() {
        let record = NickRecord::new("robert", Some("host-0".to_string()));
        assert_eq!(record.to_string(), "Nick: robert    ,Status: host-0    ");
        assert_eq!(
            NickRecord::free("filip").to_string(),
            "Nick: filip     ,Status: null      "
        );
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = StateSnapshot::new(vec![
            NickRecord::free("robert"),
            NickRecord::new("marcin", Some("host-3".to_string())),
        ]);
        assert_eq!(
            snapshot.to_string(),
            "Nicks{ \nNick: robert    ,Status: null      \nNick: marcin    ,Status: host-3    \n}"
        );
        assert_eq!(snapshot.held(), 1);
    }

    #[test]
    fn test_required_acks() {
        assert_eq!(Consistency::Quorum.required_acks(3), 2);
        assert_eq!(Consistency::Quorum.required_acks(4), 3);
        assert_eq!(Consistency::Quorum.required_acks(1), 1);
        assert_eq!(Consistency::One.required_acks(3), 1);
        assert_eq!(Consistency::All.required_acks(5), 5);
    }

    #[test]
    fn test_record_holder() {
        let record = NickRecord::new("maciej", Some("host-1".to_string()));
        assert!(record.is_held_by("host-1"));
        assert!(!record.is_held_by("host-2"));
        assert!(!record.is_free());
    }
}
