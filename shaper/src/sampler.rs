use crate::ledger::BandwidthLedger;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between speed samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Background task recomputing the instantaneous transfer speed once per
/// second from the ledger's per-window accumulators.
///
/// The task holds the ledger lock only for the read-reset-write step of each
/// tick, never across a sleep, and stops when cancelled or when the handle
/// is shut down.
pub struct SpeedSampler {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl SpeedSampler {
    pub fn spawn(ledger: BandwidthLedger) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            let mut last_tick = Instant::now();

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        let elapsed = now - last_tick;
                        last_tick = now;
                        ledger.publish_speed_sample(elapsed);
                    }
                }
            }
            debug!("speed sampler stopped");
        });

        Self { shutdown, handle }
    }

    /// Signal the sampler to stop without waiting for the task.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Stop the sampler and wait for the task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
