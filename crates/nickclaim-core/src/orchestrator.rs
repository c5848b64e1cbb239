//! Starts contenders over one shared session

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use nickclaim_store::StoreSession;

use crate::error::{CoreError, Result};
use crate::identity::{ContenderId, IdentityAllocator, local_host_id};
use crate::registry::NameRegistry;
use crate::shutdown::StopSignal;
use crate::stats::{WorkerStats, WorkerStatsSnapshot};
use crate::worker::{ClaimWorker, WorkerConfig, WorkerExit};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of concurrent contenders
    pub contenders: usize,
    /// Host part of contender identities (None = this machine's hostname)
    pub host_id: Option<String>,
    /// Settings shared by every worker
    pub worker: WorkerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            contenders: 10,
            host_id: None,
            worker: WorkerConfig::default(),
        }
    }
}

/// Final state of one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: ContenderId,
    pub exit: WorkerExit,
    pub stats: WorkerStatsSnapshot,
}

struct RunningWorker {
    id: ContenderId,
    stats: Arc<WorkerStats>,
    task: JoinHandle<WorkerExit>,
}

pub struct Orchestrator {
    session: Arc<dyn StoreSession>,
    registry: Arc<NameRegistry>,
    config: OrchestratorConfig,
    identities: IdentityAllocator,
}

impl Orchestrator {
    pub fn new(
        session: Arc<dyn StoreSession>,
        registry: Arc<NameRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let host = config.host_id.clone().unwrap_or_else(local_host_id);
        Self {
            session,
            registry,
            config,
            identities: IdentityAllocator::new(host),
        }
    }

    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    pub fn identities(&self) -> &IdentityAllocator {
        &self.identities
    }

    /// Seed every registered name as free
    pub async fn bootstrap(&self) -> Result<()> {
        self.registry.bootstrap(self.session.as_ref()).await
    }

    /// Spawn the configured number of workers without bootstrapping
    pub fn spawn_workers(&self, stop: &StopSignal) -> Result<OrchestratorHandle> {
        if self.config.contenders == 0 {
            return Err(CoreError::NoContenders);
        }

        let mut workers = Vec::with_capacity(self.config.contenders);
        for _ in 0..self.config.contenders {
            let id = self.identities.next_id();
            let mut config = self.config.worker.clone();
            // Distinct, reproducible stream per worker
            config.seed = config
                .seed
                .map(|seed| seed ^ (workers.len() as u64).wrapping_mul(0x9e3779b97f4a7c15));

            let worker = ClaimWorker::new(
                id.clone(),
                self.registry.clone(),
                self.session.clone(),
                config,
                stop.clone(),
            );
            let stats = worker.stats();
            let task = tokio::spawn(worker.run());
            workers.push(RunningWorker { id, stats, task });
        }

        info!(
            "Started {} contenders for {} names on {}",
            workers.len(),
            self.registry.len(),
            self.session.describe()
        );

        Ok(OrchestratorHandle {
            stop: stop.clone(),
            workers,
        })
    }

    /// Bootstrap the names, then spawn the workers
    pub async fn start(&self) -> Result<OrchestratorHandle> {
        if self.config.contenders == 0 {
            return Err(CoreError::NoContenders);
        }
        self.bootstrap().await?;
        self.spawn_workers(&StopSignal::new())
    }
}

/// Control over a running set of workers
pub struct OrchestratorHandle {
    stop: StopSignal,
    workers: Vec<RunningWorker>,
}

impl OrchestratorHandle {
    /// Ask every worker to stop
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn ids(&self) -> Vec<ContenderId> {
        self.workers.iter().map(|w| w.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Current counters for every worker
    pub fn stats(&self) -> Vec<(ContenderId, WorkerStatsSnapshot)> {
        self.workers
            .iter()
            .map(|w| (w.id.clone(), w.stats.snapshot()))
            .collect()
    }

    /// Wait for every worker to finish
    pub async fn join(self) -> Vec<WorkerReport> {
        let (meta, tasks): (Vec<_>, Vec<_>) = self
            .workers
            .into_iter()
            .map(|w| ((w.id, w.stats), w.task))
            .unzip();

        join_all(tasks)
            .await
            .into_iter()
            .zip(meta)
            .map(|(result, (id, stats))| {
                let exit = result.unwrap_or_else(|e| {
                    warn!("Contender {} did not finish cleanly: {}", id, e);
                    WorkerExit::Aborted(e.to_string())
                });
                WorkerReport {
                    id,
                    exit,
                    stats: stats.snapshot(),
                }
            })
            .collect()
    }
}
