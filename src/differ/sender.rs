//! Periodic flush of the diff aggregator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::differ::aggregator::DiffAggregator;

/// Flush `aggregator` every `interval` until `shutdown` fires.
///
/// The first flush happens one full interval after start.
pub async fn run_flush_loop(aggregator: Arc<DiffAggregator>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    tracing::info!(interval_secs = interval.as_secs(), "Diff sender starting");

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                aggregator.flush().await;
            }
            _ = shutdown.recv() => {
                tracing::info!("Diff sender received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
