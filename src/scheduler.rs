// src/scheduler.rs
//! Background tick loop.
//!
//! A tick runs to completion before the sleep starts, so two ticks never
//! overlap and the period is measured from the end of one tick to the start
//! of the next.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collect::{panic_message, Collector, TickReport};
use crate::error::TickError;

/// Sleep between the end of one tick and the start of the next.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TickRunner: Send + Sync + 'static {
    async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, TickError>;
}

#[async_trait]
impl TickRunner for Collector {
    async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        Collector::run_tick(self, now).await
    }
}

/// Spawn the loop. It exits after the current tick once `shutdown` flips to `true`
/// or its sender is dropped.
pub fn spawn_scheduler<R: TickRunner>(
    runner: Arc<R>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(target: "scheduler", period_secs = period.as_secs(), "scheduler started");
        'ticks: loop {
            if *shutdown.borrow() {
                break;
            }

            // Own task per tick, so a panic is logged and the loop keeps going.
            let tick_runner = runner.clone();
            let joined = tokio::spawn(async move { tick_runner.run_tick(Utc::now()).await }).await;
            match joined {
                Ok(Ok(report)) => tracing::info!(
                    target: "scheduler",
                    evaluated = report.evaluated,
                    run = report.run,
                    failed = report.failed,
                    items = report.items,
                    "tick finished"
                ),
                Ok(Err(e)) => {
                    counter!("collect_tick_failures_total").increment(1);
                    tracing::error!(target: "scheduler", error = %e, "tick failed");
                }
                Err(e) => {
                    counter!("collect_tick_failures_total").increment(1);
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        e.to_string()
                    };
                    tracing::error!(target: "scheduler", panic = %reason, "tick panicked");
                }
            }

            // Only a flip to `true` or a dropped sender cuts the sleep short.
            let sleep = tokio::time::sleep(period);
            tokio::pin!(sleep);
            loop {
                let woke = tokio::select! {
                    _ = &mut sleep => None,
                    changed = shutdown.changed() => Some(changed.is_ok()),
                };
                match woke {
                    None => break,
                    Some(false) => break 'ticks,
                    Some(true) if *shutdown.borrow() => break 'ticks,
                    Some(true) => {}
                }
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    })
}
