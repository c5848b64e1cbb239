//! Claim protocol worker
//!
//! One worker runs the check-then-act sequence over and over:
//!
//! 1. scan: log every row
//! 2. select: pick random names until one reads as free
//! 3. claim: write our identity into its `status`, unconditionally
//! 4. verify: read the status back and decide whether we hold it
//! 5. hold: keep the name for a short while
//! 6. release: clear the status and pause
//!
//! Nothing between the free read in step 2 and the write in step 3 stops
//! another worker from doing the same, so two workers can both reach step 4
//! believing they won. The second read in step 4 resolves who actually holds
//! the name; the loser simply starts over.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, trace, warn};

use nickclaim_common::{Result, RetryConfig, StoreError};
use nickclaim_store::{StateSnapshot, StoreSession};

use crate::identity::ContenderId;
use crate::registry::NameRegistry;
use crate::shutdown::StopSignal;
use crate::stats::WorkerStats;

/// Pause between select attempts: `base` plus up to `jitter` at random
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectBackoff {
    pub base: Duration,
    pub jitter: Duration,
}

impl SelectBackoff {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    fn pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            self.base
        } else {
            self.base + Duration::from_millis(rng.random_range(0..=jitter_ms))
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long a held name is kept before release
    pub hold: Duration,
    /// Pause after each release
    pub release_pause: Duration,
    /// Stop after this many iterations (None = run until stopped)
    pub max_iterations: Option<u64>,
    /// Log a second snapshot between the two verify reads
    pub show_state_after_claim: bool,
    /// Pause between select attempts (None = only yield)
    pub select_backoff: Option<SelectBackoff>,
    /// Policy applied when an iteration fails
    pub retry: RetryConfig,
    /// Seed for name selection (None = seeded from the OS)
    pub seed: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(10),
            release_pause: Duration::from_millis(1000),
            max_iterations: None,
            show_state_after_claim: true,
            select_backoff: None,
            retry: RetryConfig::default(),
            seed: None,
        }
    }
}

/// Result of the deciding read after a claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimVerdict {
    Held,
    /// Someone else holds the name, or it was already cleared (`None`)
    Lost { winner: Option<String> },
}

/// How one iteration of the protocol ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Name was held and released
    Held { name: String },
    /// Claim was overwritten before verification
    Lost { name: String, winner: Option<String> },
    /// Stop signal observed before a name was claimed
    Stopped,
}

/// Why a worker's run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Stopped,
    /// Reached `max_iterations`
    Completed,
    /// Retry policy exhausted; carries the last error
    Failed(StoreError),
    /// Task panicked or was cancelled
    Aborted(String),
}

impl Display for WorkerExit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::Stopped => write!(f, "stopped"),
            WorkerExit::Completed => write!(f, "completed"),
            WorkerExit::Failed(e) => write!(f, "failed: {}", e),
            WorkerExit::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// One contender for the shared names
pub struct ClaimWorker {
    id: ContenderId,
    registry: Arc<NameRegistry>,
    session: Arc<dyn StoreSession>,
    config: WorkerConfig,
    stop: StopSignal,
    stats: Arc<WorkerStats>,
    rng: StdRng,
}

impl ClaimWorker {
    pub fn new(
        id: ContenderId,
        registry: Arc<NameRegistry>,
        session: Arc<dyn StoreSession>,
        config: WorkerConfig,
        stop: StopSignal,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            id,
            registry,
            session,
            config,
            stop,
            stats: Arc::new(WorkerStats::new()),
            rng,
        }
    }

    pub fn id(&self) -> &ContenderId {
        &self.id
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Read and log every row
    pub async fn scan(&self) -> Result<StateSnapshot> {
        let snapshot = StateSnapshot::new(self.session.list_all().await?);
        info!("[{}] {}", self.id, snapshot);
        Ok(snapshot)
    }

    /// Pick random names until one reads as free.
    ///
    /// There is no bound on attempts. Returns `None` only when the stop
    /// signal fires while looking.
    pub async fn select_free_name(&mut self) -> Result<Option<String>> {
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }

            let name = self.registry.pick(&mut self.rng).to_string();
            self.stats.record_select_attempt();
            match self.session.get_status(&name).await? {
                None => {
                    debug!("[{}] Nick {} is free", self.id, name);
                    return Ok(Some(name));
                }
                Some(holder) => trace!("[{}] Nick {} taken by {}", self.id, name, holder),
            }

            match self.config.select_backoff {
                Some(backoff) => {
                    let pause = backoff.pause(&mut self.rng);
                    if self.stop.sleep(pause).await {
                        return Ok(None);
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }
    }

    /// Write our identity into `name`, overwriting whatever is there
    pub async fn claim(&self, name: &str) -> Result<()> {
        self.stats.record_claim();
        self.session.set_status(name, self.id.as_str()).await
    }

    /// Read the status back after a claim and decide who holds `name`
    pub async fn verify(&self, name: &str) -> Result<ClaimVerdict> {
        let first = self.session.get_status(name).await?;
        debug!("[{}] Status of {} after claim: {:?}", self.id, name, first);

        if self.config.show_state_after_claim {
            self.scan().await?;
        }

        match self.session.get_status(name).await? {
            Some(holder) if holder == self.id.as_str() => {
                info!("[{}] Nickname is owned by our node", self.id);
                Ok(ClaimVerdict::Held)
            }
            winner => {
                info!(
                    "[{}] Nickname isn't owned by us but by: {}",
                    self.id,
                    winner.as_deref().unwrap_or("nobody")
                );
                self.stats.record_race_lost();
                Ok(ClaimVerdict::Lost { winner })
            }
        }
    }

    /// Keep the held name for the configured hold time.
    ///
    /// Not interrupted by stop so a held name always gets released.
    pub async fn hold(&self) {
        tokio::time::sleep(self.config.hold).await;
    }

    /// Clear our claim on `name`
    pub async fn release(&self, name: &str) -> Result<()> {
        self.session.clear_status(name).await?;
        self.stats.record_hold();
        info!("[{}] Released {}", self.id, name);
        Ok(())
    }

    /// Run the protocol once
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome> {
        if self.stop.is_stopped() {
            return Ok(IterationOutcome::Stopped);
        }
        self.stats.record_iteration();

        self.scan().await?;

        let Some(name) = self.select_free_name().await? else {
            return Ok(IterationOutcome::Stopped);
        };

        self.claim(&name).await?;

        match self.verify(&name).await? {
            ClaimVerdict::Held => {
                self.hold().await;
                self.release(&name).await?;
                self.stop.sleep(self.config.release_pause).await;
                Ok(IterationOutcome::Held { name })
            }
            ClaimVerdict::Lost { winner } => Ok(IterationOutcome::Lost { name, winner }),
        }
    }

    /// Run iterations until stopped, bounded, or out of retries
    pub async fn run(mut self) -> WorkerExit {
        info!("Contender {} started", self.id);

        let mut iterations: u64 = 0;
        let mut failures: u32 = 0;

        let exit = loop {
            if self
                .config
                .max_iterations
                .is_some_and(|max| iterations >= max)
            {
                break WorkerExit::Completed;
            }

            match self.run_iteration().await {
                Ok(IterationOutcome::Stopped) => break WorkerExit::Stopped,
                Ok(outcome) => {
                    trace!("[{}] Iteration finished: {:?}", self.id, outcome);
                    iterations += 1;
                    failures = 0;
                }
                Err(e) => {
                    iterations += 1;
                    failures = failures.saturating_add(1);
                    self.stats.record_failure();
                    warn!(
                        "[{}] Iteration failed with {} error ({} in a row): {}",
                        self.id,
                        e.kind(),
                        failures,
                        e
                    );

                    if self.config.retry.is_exhausted(failures) {
                        error!(
                            "[{}] Giving up after {} consecutive failures",
                            self.id, failures
                        );
                        break WorkerExit::Failed(e);
                    }

                    let delay = self.config.retry.calculate_delay(failures);
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else if self.stop.sleep(delay).await {
                        break WorkerExit::Stopped;
                    }
                }
            }
        };

        info!("Contender {} {}", self.id, exit);
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nickclaim_store::{MemoryCluster, MemorySession, NickRecord};

    async fn bootstrapped(names: &[&str]) -> (Arc<dyn StoreSession>, Arc<NameRegistry>) {
        let cluster = MemoryCluster::with_nicks_schema(3, "nickclaim");
        let session: Arc<dyn StoreSession> =
            Arc::new(MemorySession::connect(&cluster, "nickclaim").unwrap());
        let registry = Arc::new(NameRegistry::new(names.iter().copied()).unwrap());
        registry.bootstrap(session.as_ref()).await.unwrap();
        (session, registry)
    }

    fn quiet_config() -> WorkerConfig {
        WorkerConfig {
            hold: Duration::from_millis(1),
            release_pause: Duration::ZERO,
            show_state_after_claim: false,
            seed: Some(7),
            ..WorkerConfig::default()
        }
    }

    fn worker(
        host_seq: u64,
        session: &Arc<dyn StoreSession>,
        registry: &Arc<NameRegistry>,
        config: WorkerConfig,
    ) -> ClaimWorker {
        ClaimWorker::new(
            ContenderId::new("host", host_seq),
            registry.clone(),
            session.clone(),
            config,
            StopSignal::new(),
        )
    }

    #[tokio::test]
    async fn test_claim_hold_release_robert() {
        let (session, registry) = bootstrapped(&["robert", "marcin", "maciej", "filip"]).await;
        let worker = worker(0, &session, &registry, quiet_config());

        worker.claim("robert").await.unwrap();
        assert_eq!(
            session.get_status("robert").await.unwrap(),
            Some("host-0".to_string())
        );
        assert_eq!(worker.verify("robert").await.unwrap(), ClaimVerdict::Held);

        worker.hold().await;
        worker.release("robert").await.unwrap();
        assert_eq!(session.get_status("robert").await.unwrap(), None);

        let stats = worker.stats().snapshot();
        assert_eq!(stats.claims, 1);
        assert_eq!(stats.holds, 1);
        assert_eq!(stats.races_lost, 0);
    }

    #[tokio::test]
    async fn test_overwritten_claim_is_lost() {
        let (session, registry) = bootstrapped(&["robert"]).await;
        let worker = worker(0, &session, &registry, quiet_config());

        worker.claim("robert").await.unwrap();
        session.set_status("robert", "host-9").await.unwrap();
        assert_eq!(
            worker.verify("robert").await.unwrap(),
            ClaimVerdict::Lost {
                winner: Some("host-9".to_string())
            }
        );

        // No compensation: the winner keeps the name
        assert_eq!(
            session.get_status("robert").await.unwrap(),
            Some("host-9".to_string())
        );

        worker.claim("robert").await.unwrap();
        session.clear_status("robert").await.unwrap();
        assert_eq!(
            worker.verify("robert").await.unwrap(),
            ClaimVerdict::Lost { winner: None }
        );
        assert_eq!(worker.stats().snapshot().races_lost, 2);
    }

    #[tokio::test]
    async fn test_select_skips_held_names() {
        let (session, registry) = bootstrapped(&["robert", "marcin", "maciej", "filip"]).await;
        for name in ["robert", "marcin", "filip"] {
            session.set_status(name, "host-5").await.unwrap();
        }

        let mut worker = worker(1, &session, &registry, quiet_config());
        for _ in 0..10 {
            assert_eq!(
                worker.select_free_name().await.unwrap(),
                Some("maciej".to_string())
            );
        }
        assert!(worker.stats().snapshot().select_attempts >= 10);
    }

    #[tokio::test]
    async fn test_scan_sees_claims() {
        let (session, registry) = bootstrapped(&["robert", "marcin"]).await;
        let worker = worker(2, &session, &registry, quiet_config());
        worker.claim("marcin").await.unwrap();

        let snapshot = worker.scan().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.held(), 1);
        assert!(
            snapshot
                .records
                .iter()
                .any(|r: &NickRecord| r.is_held_by("host-2"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_interrupts_starving_select() {
        let (session, registry) = bootstrapped(&["robert"]).await;
        session.set_status("robert", "host-9").await.unwrap();

        let stop = StopSignal::new();
        let worker = ClaimWorker::new(
            ContenderId::new("host", 0),
            registry,
            session,
            quiet_config(),
            stop.clone(),
        );
        let stats = worker.stats();
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();

        let exit = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, WorkerExit::Stopped);
        assert_eq!(stats.snapshot().claims, 0);
        assert!(stats.snapshot().select_attempts > 0);
    }

    #[tokio::test]
    async fn test_max_iterations_completes() {
        let (session, registry) = bootstrapped(&["robert", "marcin"]).await;
        let config = WorkerConfig {
            max_iterations: Some(3),
            ..quiet_config()
        };
        let worker = worker(0, &session, &registry, config);
        let stats = worker.stats();

        assert_eq!(worker.run().await, WorkerExit::Completed);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.iterations, 3);
        assert_eq!(snapshot.holds, 3);
        assert_eq!(snapshot.failures, 0);

        let records = session.list_all().await.unwrap();
        assert!(records.iter().all(NickRecord::is_free));
    }

    #[tokio::test]
    async fn test_select_backoff_pause() {
        let backoff = SelectBackoff::new(Duration::from_millis(5), Duration::from_millis(10));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let pause = backoff.pause(&mut rng);
            assert!(pause >= Duration::from_millis(5));
            assert!(pause <= Duration::from_millis(15));
        }

        let fixed = SelectBackoff::new(Duration::from_millis(3), Duration::ZERO);
        assert_eq!(fixed.pause(&mut rng), Duration::from_millis(3));
    }

    /// Store that fails every call
    struct FailingStore;

    #[async_trait]
    impl StoreSession for FailingStore {
        async fn list_all(&self) -> Result<Vec<NickRecord>> {
            Err(StoreError::Query("timed out".to_string()))
        }

        async fn get_status(&self, _name: &str) -> Result<Option<String>> {
            Err(StoreError::Query("timed out".to_string()))
        }

        async fn set_status(&self, _name: &str, _holder: &str) -> Result<()> {
            Err(StoreError::Query("timed out".to_string()))
        }

        async fn clear_status(&self, _name: &str) -> Result<()> {
            Err(StoreError::Query("timed out".to_string()))
        }

        async fn upsert(&self, _name: &str, _status: Option<&str>) -> Result<()> {
            Err(StoreError::Query("timed out".to_string()))
        }

        async fn close(&self) {}

        fn describe(&self) -> String {
            "failing store".to_string()
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_worker() {
        let session: Arc<dyn StoreSession> = Arc::new(FailingStore);
        let registry = Arc::new(NameRegistry::default());
        let config = WorkerConfig {
            retry: RetryConfig {
                max_consecutive_failures: 3,
                ..RetryConfig::default()
            },
            ..quiet_config()
        };
        let worker = worker(0, &session, &registry, config);
        let stats = worker.stats();

        assert_eq!(
            worker.run().await,
            WorkerExit::Failed(StoreError::Query("timed out".to_string()))
        );
        assert_eq!(stats.snapshot().failures, 3);
        assert_eq!(stats.snapshot().iterations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_interrupted_by_stop() {
        let session: Arc<dyn StoreSession> = Arc::new(FailingStore);
        let registry = Arc::new(NameRegistry::default());
        let stop = StopSignal::new();
        let config = WorkerConfig {
            retry: RetryConfig::exponential(60_000, 60_000, 0),
            ..quiet_config()
        };
        let worker = ClaimWorker::new(
            ContenderId::new("host", 0),
            registry,
            session,
            config,
            stop.clone(),
        );
        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop.stop();
        assert_eq!(task.await.unwrap(), WorkerExit::Stopped);
    }
}
