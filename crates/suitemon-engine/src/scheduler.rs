use crate::orchestrator::PollOrchestrator;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Fires the orchestrator on a fixed cadence.
///
/// Ticks never overlap: the next poll starts only after the previous one
/// finished. A run that overran its interval is logged as overdue. Run-level
/// problems are captured inside the run summary; the only fatal errors are
/// startup configuration errors, which prevent the scheduler from being
/// constructed at all.
pub struct PollScheduler {
    orchestrator: Arc<PollOrchestrator>,
    interval_secs: u64,
}

impl PollScheduler {
    pub fn new(orchestrator: Arc<PollOrchestrator>, interval_secs: u64) -> Self {
        Self {
            orchestrator,
            interval_secs,
        }
    }

    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval_secs, "Polling scheduler started");

        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            let started = Instant::now();
            let summary = self.orchestrator.run_once().await;
            let elapsed = started.elapsed();

            if elapsed >= period {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    interval_secs = self.interval_secs,
                    "Polling run overran its schedule interval; next tick is overdue"
                );
            }

            if summary.error_message.is_some() {
                tracing::warn!(
                    status = %summary.status,
                    error = summary.error_message.as_deref().unwrap_or(""),
                    "Polling run reported a degraded status"
                );
            }
        }
    }
}
