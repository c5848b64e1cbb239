//! Contender identities
//!
//! A contender writes its identity into `status` to claim a name, so two
//! contenders sharing an identity would each read the other's claim as
//! their own. Identities are `<host>-<seq>` and the allocator never hands
//! out the same one twice.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{CoreError, Result};

/// Host part used when the hostname cannot be read
pub const DEFAULT_HOST_ID: &str = "nickclaim-node";

/// Hostname of this machine
pub fn local_host_id() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| DEFAULT_HOST_ID.to_string())
}

/// Label a contender writes into `status`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContenderId(String);

impl ContenderId {
    pub fn new(host: &str, seq: u64) -> Self {
        Self(format!("{}-{}", host, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContenderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContenderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hands out distinct contender identities for one host
#[derive(Debug)]
pub struct IdentityAllocator {
    host: String,
    next_seq: AtomicU64,
    issued: Mutex<HashSet<ContenderId>>,
}

impl IdentityAllocator {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            next_seq: AtomicU64::new(0),
            issued: Mutex::new(HashSet::new()),
        }
    }

    pub fn for_local_host() -> Self {
        Self::new(local_host_id())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Next free `<host>-<seq>` identity
    pub fn next_id(&self) -> ContenderId {
        let mut issued = self.issued.lock();
        loop {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let id = ContenderId::new(&self.host, seq);
            if issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Register an explicitly chosen identity, rejecting duplicates
    pub fn reserve(&self, id: ContenderId) -> Result<ContenderId> {
        if self.issued.lock().insert(id.clone()) {
            Ok(id)
        } else {
            Err(CoreError::DuplicateContender(id.0))
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.lock().len()
    }
}
