//! Application state shared across handlers and background tasks.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use dirsync_events::WebhookDispatcher;
use dirsync_sync::{ConsistencyAuditor, SyncEngine};

/// Cheap to clone; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub auditor: Arc<ConsistencyAuditor>,
    pub webhook: Arc<WebhookDispatcher>,

    /// Held for the duration of a sync run. Runs triggered while another is
    /// in progress wait for it.
    pub sync_lock: Arc<Mutex<()>>,

    pub startup_time: Arc<Instant>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        engine: Arc<SyncEngine>,
        auditor: Arc<ConsistencyAuditor>,
        webhook: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            engine,
            auditor,
            webhook,
            sync_lock: Arc::new(Mutex::new(())),
            startup_time: Arc::new(Instant::now()),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.startup_time.elapsed().as_secs()
    }
}
