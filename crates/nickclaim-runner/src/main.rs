//! Main entry point for nickclaim.
//!
//! Connects to the store, seeds the candidate names and runs the contenders
//! until Ctrl+C, the configured duration elapses, or every contender finishes.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use nickclaim_core::{NameRegistry, Orchestrator, WorkerExit};
use nickclaim_runner::{Configuration, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new().context("Failed to load configuration")?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    let store_config = configuration.store_config()?;
    let orchestrator_config = configuration.orchestrator_config()?;
    let registry = Arc::new(NameRegistry::new(configuration.names())?);

    let session = nickclaim_store::connect(&store_config)
        .await
        .with_context(|| format!("Failed to connect to {}", store_config.contact_point))?;
    info!("Connected: {}", session.describe());

    let orchestrator = Orchestrator::new(session.clone(), registry, orchestrator_config);
    let handle = orchestrator.start().await?;

    let stop = handle.stop_signal();
    startup::stop_on_shutdown_signal(stop.clone());

    if let Some(duration) = configuration.run_duration() {
        let timer = stop.clone();
        tokio::spawn(async move {
            if !timer.sleep(duration).await {
                info!("Run duration of {:?} elapsed", duration);
                timer.stop();
            }
        });
    }

    let reports = handle.join().await;
    stop.stop();

    let mut failed = 0;
    for report in &reports {
        info!(
            "Contender {} {}: iterations={} holds={} races_lost={} failures={}",
            report.id,
            report.exit,
            report.stats.iterations,
            report.stats.holds,
            report.stats.races_lost,
            report.stats.failures
        );
        if matches!(report.exit, WorkerExit::Failed(_) | WorkerExit::Aborted(_)) {
            failed += 1;
        }
    }
    if failed > 0 {
        warn!("{} of {} contenders did not stop cleanly", failed, reports.len());
    }

    session.close().await;
    info!("Shutdown complete");
    Ok(())
}
