//! Scheduler Loop — drives the engine and dispatcher on a fixed wall-clock
//! cadence, decoupled from the command-handling path.
//!
//! Single-flight: the loop awaits each tick before asking the interval for
//! the next one, and `MissedTickBehavior::Skip` drops firings that a long
//! tick ran past instead of bursting to catch up. A failing tick is logged
//! and the loop keeps its schedule.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use freightbot_core::error::Result;

use crate::dispatch::Dispatcher;
use crate::engine::NotificationEngine;

/// What one tick did.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub due: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct Scheduler {
    engine: Arc<NotificationEngine>,
    dispatcher: Dispatcher,
    period: Duration,
    startup_delay: Duration,
}

impl Scheduler {
    pub fn new(
        engine: Arc<NotificationEngine>,
        dispatcher: Dispatcher,
        period: Duration,
        startup_delay: Duration,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            period,
            startup_delay,
        }
    }

    /// Run the loop as a background tokio task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::info!(
            "⏰ Reminder scheduler started (every {}s, first run in {}s)",
            self.period.as_secs(),
            self.startup_delay.as_secs()
        );
        let mut interval = interval_at(Instant::now() + self.startup_delay, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match self.tick_once().await {
                Ok(report) if report.due > 0 => {
                    tracing::info!(
                        "📣 Reminder tick: {} due, {} delivered, {} failed",
                        report.due,
                        report.delivered,
                        report.failed
                    );
                }
                Ok(_) => tracing::debug!("Reminder tick: nothing due"),
                Err(e) => tracing::warn!("⚠️ Reminder tick failed: {e}"),
            }
        }
    }

    /// One compute-and-dispatch pass. All durable state lives in the
    /// notification records; the loop itself carries nothing across ticks.
    pub async fn tick_once(&self) -> Result<TickReport> {
        let due = self.engine.compute_due(Utc::now()).await?;
        if due.is_empty() {
            return Ok(TickReport::default());
        }
        let outcomes = self.dispatcher.dispatch(&due).await;
        let delivered = outcomes.iter().filter(|o| o.success).count();
        Ok(TickReport {
            due: due.len(),
            delivered,
            failed: due.len() - delivered,
        })
    }
}
