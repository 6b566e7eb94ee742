//! Background repair sweeper: watches the worker and room change feeds and
//! runs a debounced repair pass after each burst of writes. A bulk import of
//! hundreds of workers triggers exactly one sweep, not hundreds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::notify::ChangeEvent;
use crate::store::{ROOMS, WORKERS};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// A lagged receiver dropped events we never saw, which is itself evidence
/// of changes, so it still counts as a signal. Only a closed channel returns
/// false and ends the sweeper.
fn signal(result: Result<ChangeEvent, RecvError>) -> bool {
    match result {
        Ok(_) => true,
        Err(RecvError::Lagged(skipped)) => {
            debug!(skipped, "change feed lagged, treating as a change");
            true
        }
        Err(RecvError::Closed) => false,
    }
}

/// Run until the store's change feeds close. Heals worker statuses once at
/// startup, then loops: wait for a change, absorb the burst for `debounce`,
/// repair.
pub async fn run_sweeper(engine: Arc<Engine>, debounce: Duration) {
    match engine.heal_statuses().await {
        Ok(0) => {}
        Ok(fixed) => info!(fixed, "startup status heal complete"),
        Err(e) => warn!("startup status heal failed: {e}"),
    }

    let mut workers = engine.store().watch(WORKERS);
    let mut rooms = engine.store().watch(ROOMS);

    loop {
        // Block until something changes at all
        let open = tokio::select! {
            r = workers.recv() => signal(r),
            r = rooms.recv() => signal(r),
        };
        if !open {
            info!("change feeds closed, sweeper exiting");
            return;
        }

        // Debounce: every further change restarts the quiet-period timer
        let sleep = tokio::time::sleep(debounce);
        tokio::pin!(sleep);
        loop {
            let open = tokio::select! {
                () = &mut sleep => break,
                r = workers.recv() => signal(r),
                r = rooms.recv() => signal(r),
            };
            if !open {
                info!("change feeds closed, sweeper exiting");
                return;
            }
            sleep.as_mut().reset(Instant::now() + debounce);
        }

        match engine.repair_now().await {
            Ok(Some(report)) => {
                if report.rooms_patched > 0 || report.farms_patched > 0 {
                    info!(
                        rooms = report.rooms_patched,
                        farms = report.farms_patched,
                        "sweep repaired drift"
                    );
                } else {
                    debug!("sweep found nothing to repair");
                }
            }
            Ok(None) => debug!("sweep already in flight, skipped"),
            Err(e) => warn!("sweep failed: {e}"),
        }
    }
}
