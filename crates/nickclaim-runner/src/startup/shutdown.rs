//! Process signal handling

use tracing::{info, warn};

use nickclaim_core::StopSignal;

/// Trigger `stop` on Ctrl+C or SIGTERM.
///
/// Spawns a background task and returns immediately.
pub fn stop_on_shutdown_signal(stop: StopSignal) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C, stopping contenders...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping contenders...");
            }
            _ = stop.stopped() => return,
        }

        stop.stop();
    });
}
