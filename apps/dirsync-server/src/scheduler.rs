//! Periodic sync and audit runs.
//!
//! The first run happens one period after startup. A run that overlaps the
//! next tick delays it rather than queueing a burst.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::state::AppState;

/// Run a full sync every `period`, sharing the lock with API-triggered runs.
pub fn spawn_sync_schedule(state: AppState, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Scheduled sync enabled");
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let _guard = state.sync_lock.lock().await;
            match state.engine.sync_all().await {
                Ok(report) if report.users.is_clean() => info!(
                    groups_created = report.departments.created,
                    users_created = report.users.created,
                    "Scheduled sync finished"
                ),
                Ok(report) => warn!(
                    groups_created = report.departments.created,
                    users_created = report.users.created,
                    users_failed = report.users.failures.len(),
                    "Scheduled sync finished with failures"
                ),
                Err(e) => error!(error = %e, transient = e.is_transient(), "Scheduled sync failed"),
            }
        }
    })
}

/// Run the consistency audit every `period`. Findings are logged by the
/// auditor itself.
pub fn spawn_audit_schedule(state: AppState, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Scheduled audit enabled");
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = state.auditor.audit().await {
                error!(error = %e, "Scheduled audit failed");
            }
        }
    })
}
