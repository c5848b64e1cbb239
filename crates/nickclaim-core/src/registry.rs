//! Candidate name set

use std::collections::HashSet;

use rand::Rng;
use tracing::info;

use nickclaim_store::StoreSession;

use crate::error::{CoreError, Result};

/// Names contended for when none are configured
pub const DEFAULT_NAMES: [&str; 4] = ["robert", "marcin", "maciej", "filip"];

/// Fixed, validated set of names the contenders compete over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRegistry {
    names: Vec<String>,
}

impl NameRegistry {
    /// Build a registry; names must be non-blank and unique
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.into().trim().to_string()).collect();
        if names.is_empty() {
            return Err(CoreError::EmptyRegistry);
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(CoreError::BlankName);
            }
            if !seen.insert(name.as_str()) {
                return Err(CoreError::DuplicateName(name.clone()));
            }
        }

        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Pick one name uniformly at random
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.names[rng.random_range(0..self.names.len())]
    }

    /// Seed every name as free before any contender starts
    pub async fn bootstrap(&self, session: &dyn StoreSession) -> Result<()> {
        for name in &self.names {
            session.upsert(name, None).await?;
        }
        info!("Bootstrapped {} names: {}", self.len(), self.names.join(", "));
        Ok(())
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self {
            names: DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}
