use anyhow::Result;
use hangar_core::prelude::*;
use hangar_scheduler::prelude::*;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

/// Runs a dispatch and a collect pass on every tick until interrupted.
pub async fn run<S: HangarServices>(scheduler: &JobScheduler<S>, interval: Duration) -> Result<()> {
    info!("Starting worker (interval: {interval:?})");
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => cycle(scheduler).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Worker stopped");
                return Ok(());
            }
        }
    }
}

async fn cycle<S: HangarServices>(scheduler: &JobScheduler<S>) {
    match scheduler.dispatch().await {
        Ok(report) => {
            for failure in &report.errors {
                error!("Job {} cannot run: {}", failure.id, failure.message);
            }
        }
        Err(e) => error!("Dispatch pass failed: {e}"),
    }

    if let Err(e) = scheduler.collect().await {
        error!("Collect pass failed: {e}");
    }
}
