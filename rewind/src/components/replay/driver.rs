//! The loop that advances the replay scheduler.
//!
//! The scheduler is polled on a fixed interval, and additionally woken whenever a task is
//! offered or completes so that hand-offs between tasks do not wait for the next tick.

use std::sync::Arc;

use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use super::ReplayScheduler;
use crate::components::chain::ChainClient;
use crate::error::Error;

pub(super) async fn run<C: ChainClient>(
    scheduler: Arc<ReplayScheduler<C>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let mut interval = time::interval(scheduler.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_ms = scheduler.tick_interval.as_millis() as u64,
        "Replay scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => (),
            _ = scheduler.core.wake.notified() => debug!("Replay scheduler woken"),
        }

        // A failing tick is logged inside `tick` and must not stop future ticks.
        scheduler.tick().await;
    }

    info!("Replay scheduler stopped");
    Ok(())
}
