//! Stop signal shared by the orchestrator and its workers

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Latching stop flag; clones observe the same signal
#[derive(Clone, Debug)]
pub struct StopSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Trigger the stop; later calls are no-ops
    pub fn stop(&self) {
        if !self.sender.send_replace(true) {
            info!("Stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once the stop has been triggered
    pub async fn stopped(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration`; returns `true` if the stop fired first
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            _ = self.stopped() => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_latches() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_stopped());
        signal.stop();
        signal.stop();
        assert!(clone.is_stopped());
        clone.stopped().await;
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_stop() {
        let signal = StopSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.stop();
        });

        let started = tokio::time::Instant::now();
        assert!(signal.sleep(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_completes_without_stop() {
        let signal = StopSignal::new();
        assert!(!signal.sleep(Duration::from_millis(5)).await);
    }
}
