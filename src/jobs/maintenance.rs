use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::db::Database;

/// Runs `run_maintenance` every `period`, starting one period after boot.
pub fn spawn_maintenance(db: Database, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "Maintenance task scheduled");
        loop {
            ticker.tick().await;
            run_maintenance(&db).await;
        }
    })
}

/// Deletes revoked tokens past their expiry and reset codes that are
/// expired or used.
pub async fn run_maintenance(db: &Database) {
    match db.delete_expired_blacklisted_tokens().await {
        Ok(count) => info!("Deleted {} expired blacklisted tokens.", count),
        Err(e) => error!("Failed to delete expired blacklisted tokens: {}", e),
    }

    match db.delete_stale_otps().await {
        Ok(count) => info!("Deleted {} stale password reset codes.", count),
        Err(e) => error!("Failed to delete stale password reset codes: {}", e),
    }
}
