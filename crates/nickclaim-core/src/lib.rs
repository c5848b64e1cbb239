//! Nickclaim Core - the racy claim/release protocol
//!
//! This crate provides:
//! - `NameRegistry`: the fixed candidate name set and its bootstrap
//! - `ClaimWorker`: one contender running scan, select, claim, verify, hold, release
//! - `Orchestrator`: starts contenders that share one store session
//! - Contender identities, stop signal and per-worker statistics
//!
//! The claim is a plain read followed by an unconditional write. Two
//! contenders can both observe a name as free, both write their identity
//! and both briefly believe they hold it. That behavior is preserved; a
//! conditional write would be the primitive needed to remove it.

pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod registry;
pub mod shutdown;
pub mod stats;
pub mod worker;

pub use error::CoreError;
pub use identity::{ContenderId, IdentityAllocator, local_host_id};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, WorkerReport};
pub use registry::{DEFAULT_NAMES, NameRegistry};
pub use shutdown::StopSignal;
pub use stats::{WorkerStats, WorkerStatsSnapshot};
pub use worker::{
    ClaimVerdict, ClaimWorker, IterationOutcome, SelectBackoff, WorkerConfig, WorkerExit,
};
