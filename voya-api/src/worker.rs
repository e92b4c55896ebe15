use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::state::AppState;

/// Background sweep: pending bookings whose payment never came back are
/// cancelled through the normal transition, so any held capacity is
/// released exactly once. Bookings with a received payment are exempt;
/// those are waiting on manual reconciliation.
pub async fn start_sweep_worker(state: AppState) {
    let ttl = chrono::Duration::seconds(state.business_rules.pending_ttl_seconds as i64);
    let mut ticker = interval(Duration::from_secs(
        state.business_rules.sweep_interval_seconds.max(1),
    ));

    info!("Stale-booking sweeper started");
    loop {
        ticker.tick().await;
        match state.gateway.sweep_stale_pending(ttl).await {
            Ok(0) => {}
            Ok(cancelled) => info!(cancelled, "sweeper cancelled stale pending bookings"),
            Err(err) => error!("Stale sweep failed: {}", err),
        }
    }
}
