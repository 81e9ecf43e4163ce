//! Background sweepers
//!
//! Two periodic tasks keep the stores bounded: the in-process attempt
//! counter is compacted, and long-dead refresh token and one-time code rows
//! are deleted after their retention period. Both are spawned on the shared
//! runtime and run until the process exits.
use crate::config::MaintenanceSettings;
use crate::db;
use crate::rate_limit::AttemptCounter;
use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Spawn the periodic sweepers. Handles are returned so a graceful shutdown
/// path can abort them; dropping them detaches the tasks.
pub fn spawn_sweepers(
    pool: PgPool,
    counter: Arc<dyn AttemptCounter>,
    settings: &MaintenanceSettings,
) -> Vec<JoinHandle<()>> {
    let interval = Duration::from_secs(settings.sweep_interval_secs);
    let retention = ChronoDuration::hours(settings.token_retention_hours);

    info!(
        interval_secs = settings.sweep_interval_secs,
        retention_hours = settings.token_retention_hours,
        "Starting maintenance sweepers"
    );

    let counter_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            counter.cleanup();
            debug!("Attempt counter compacted");
        }
    });

    let gc_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;

            match db::refresh_tokens::delete_expired(&pool, retention).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "Pruned dead refresh token rows"),
                Err(err) => error!(error = %err, "Refresh token sweep failed"),
            }

            match db::otp_codes::delete_expired(&pool, retention).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "Pruned expired verification codes"),
                Err(err) => error!(error = %err, "Verification code sweep failed"),
            }
        }
    });

    vec![counter_task, gc_task]
}
