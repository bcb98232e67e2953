//! Background task that periodically purges idle sessions.
//!
//! Complements the check-on-write sweep in [`SessionStore`]: a quiet store
//! with no incoming writes still gets cleaned up.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::session::SessionStore;

/// Spawn a sweeper that runs every `sweep_interval_secs` from the store config.
pub fn spawn_sweeper(store: Arc<SessionStore>, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = Duration::from_secs(store.config().sweep_interval_secs.max(1));
    spawn_sweeper_every(store, period, shutdown_rx)
}

/// Spawn a sweeper with an explicit period. Stops when `true` is sent on
/// `shutdown_rx` or the sender is dropped.
pub fn spawn_sweeper_every(
    store: Arc<SessionStore>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        info!(period_ms = period.as_millis() as u64, "Session sweeper started");

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Session sweeper shutting down");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let removed = store.purge_inactive(Utc::now());
                    debug!(removed, "Sweeper tick");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::session::Role;

    #[tokio::test]
    async fn sweeper_removes_idle_sessions() {
        let store = Arc::new(SessionStore::new(SessionConfig {
            inactivity_cutoff_secs: 0,
            ..Default::default()
        }));
        store.append_message("idle", Role::User, "hello");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_sweeper_every(store.clone(), Duration::from_millis(20), shutdown_rx);

        let emptied = tokio::time::timeout(Duration::from_secs(2), async {
            while !store.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(emptied.is_ok(), "sweeper should purge the idle session");

        let _ = shutdown_tx.send(true);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn sweeper_keeps_active_sessions() {
        let store = Arc::new(SessionStore::default());
        store.append_message("active", Role::User, "hello");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_sweeper_every(store.clone(), Duration::from_millis(10), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.exists("active"));

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
