//! Background sync on a fixed interval.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{SyncEngine, SyncError};

/// Run [`SyncEngine::sync`] every `every` until the handle is aborted.
///
/// The first pass starts immediately. Ticks that land while a pass is still
/// running are skipped.
pub fn spawn_periodic(engine: SyncEngine, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = every.as_secs(), "periodic sync started");

        loop {
            ticker.tick().await;
            match engine.sync().await {
                Ok(report) => debug!(
                    upserted = report.push.upserted,
                    deletions = report.deletions.confirmed + report.deletions.already_absent,
                    "periodic sync finished"
                ),
                Err(SyncError::AlreadyInProgress) => debug!("sync busy, tick skipped"),
                Err(SyncError::NotAuthenticated) => debug!("signed out, tick skipped"),
                Err(e) => warn!(error = %e, "periodic sync failed"),
            }
        }
    })
}
