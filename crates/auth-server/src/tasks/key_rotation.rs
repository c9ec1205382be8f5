//! Signing key rotation background task.
//!
//! Ticks immediately on start and then every `rotation_interval_seconds`.
//! Each tick rotates when there is no active key or the active key expires
//! within the configured lead time.
//!
//! # Graceful Shutdown
//!
//! The cancellation token is only observed between ticks. A check that is
//! already running finishes first, and the store's rotation transaction
//! either commits fully or not at all.

use crate::config::Config;
use crate::models::KeyEventType;
use crate::observability::metrics;
use crate::repositories::KeyStore;
use crate::services::key_management_service::{self, RotationCheck};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Start the key rotation background task.
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "auth.task.key_rotation")]
pub async fn start_key_rotation<S: KeyStore + ?Sized>(
    store: Arc<S>,
    config: Arc<Config>,
    cancel_token: CancellationToken,
) {
    info!(
        target: "auth.task.key_rotation",
        check_interval_seconds = config.rotation_interval_seconds,
        lead_time_seconds = config.rotation_lead_time_seconds,
        "Starting key rotation task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.rotation_interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_rotation_check(store.as_ref(), &config).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "auth.task.key_rotation",
                    "Key rotation task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "auth.task.key_rotation", "Key rotation task stopped");
}

/// Run a single rotation check.
///
/// Errors are logged and counted; the next tick retries.
pub(crate) async fn run_rotation_check<S: KeyStore + ?Sized>(
    store: &S,
    config: &Config,
) -> Option<RotationCheck> {
    match key_management_service::rotate_if_due(store, config, Utc::now()).await {
        Ok(check) => Some(check),
        Err(e) => {
            tracing::error!(
                target: "auth.task.key_rotation",
                event = KeyEventType::RotationFailed.as_str(),
                error = %e,
                retriable = e.is_retriable(),
                "Key rotation check failed; will retry on next tick"
            );
            metrics::record_key_rotation("error");
            None
        }
    }
}
