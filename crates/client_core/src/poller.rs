use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::ChatClient;

/// Shorter intervals, zero included, are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs [`ChatClient::sync_once`] every `interval` until the handle is
/// aborted. Failures are logged and reported as events; the loop keeps going.
pub fn spawn_poller(client: Arc<ChatClient>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_POLL_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the caller has just bootstrapped.
        ticker.tick().await;
        info!(interval_ms = interval.as_millis() as u64, "poller: started");

        loop {
            ticker.tick().await;
            match client.sync_once().await {
                Ok(report) => debug!(
                    delivered = report.delivered,
                    still_queued = report.still_queued,
                    participants_updated = report.participants_updated,
                    messages_replaced = report.messages.replaced,
                    messages_inserted = report.messages.inserted,
                    "poller: sync complete"
                ),
                Err(err) => warn!("poller: sync failed: {err}"),
            }
        }
    })
}
