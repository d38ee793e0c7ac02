//! Background tasks for a region store
//!
//! Three periodic loops run beside the store: claim-block accrual for
//! online players, the expiration sweep, and autosave. All of them
//! stop through one broadcast shutdown signal; stopping the task set
//! flushes a final snapshot so a clean shutdown never loses state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::persist::SnapshotStore;
use crate::store::RegionStore;

/// Handle over the store's background tasks
pub struct StoreTasks {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl StoreTasks {
    /// Spawn the periodic loops
    ///
    /// The autosave loop only runs when a snapshot store is given; the
    /// accrual and sweep intervals come from the store's config.
    pub fn spawn(store: Arc<RegionStore>, snapshots: Option<Arc<SnapshotStore>>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = vec![
            tokio::spawn(accrual_loop(store.clone(), shutdown_tx.subscribe())),
            tokio::spawn(sweep_loop(store.clone(), shutdown_tx.subscribe())),
        ];
        if let Some(snapshots) = snapshots {
            handles.push(tokio::spawn(autosave_loop(
                store,
                snapshots,
                shutdown_tx.subscribe(),
            )));
        }
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal shutdown and wait for every loop to finish
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        for task in self.handles.drain(..) {
            let _ = task.await;
        }
        info!("store tasks stopped");
    }
}

/// Deposit claim blocks to every online player each tick
async fn accrual_loop(store: Arc<RegionStore>, mut shutdown_rx: broadcast::Receiver<()>) {
    let period = store.config().accrual.tick_interval;
    info!(interval_secs = period.as_secs(), "accrual task started");

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; skip it so accrual starts
    // one full interval in
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("accrual task shutting down");
                break;
            }
            _ = interval.tick() => {
                let online = store.sessions().online_players();
                if !online.is_empty() {
                    store.ledger().accrue_all(&online);
                    debug!(players = online.len(), "claim blocks accrued");
                }
            }
        }
    }
}

/// Run the expiration sweep each interval
async fn sweep_loop(store: Arc<RegionStore>, mut shutdown_rx: broadcast::Receiver<()>) {
    let period = store.config().expiration.sweep_interval;
    info!(interval_secs = period.as_secs(), "expiration sweep task started");

    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("expiration sweep task shutting down");
                break;
            }
            _ = interval.tick() => {
                store.sweep_expired();
            }
        }
    }
}

/// Snapshot every world and the ledger each interval
async fn autosave_loop(
    store: Arc<RegionStore>,
    snapshots: Arc<SnapshotStore>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let period = store.config().autosave_interval;
    info!(interval_secs = period.as_secs(), "autosave task started");

    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                // Final flush before the task goes away
                match snapshots.save_all(&store).await {
                    Ok(worlds) => info!(worlds, "final snapshot flushed"),
                    Err(e) => error!(error = %e, "final snapshot failed"),
                }
                info!("autosave task shutting down");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = snapshots.save_all(&store).await {
                    error!(error = %e, "autosave failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::store::CreateRequest;
    use chrono::Utc;
    use freehold_core::{BlockPos, Cuboid, PlayerId, WorldId};
    use std::time::Duration;
    use tempfile::TempDir;

    fn bounds() -> Cuboid {
        Cuboid::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(9, 127, 9))
    }

    fn config() -> StoreConfig {
        StoreConfig {
            min_claim_area: 25,
            ..StoreConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_accrual_pays_only_online_players() {
        let mut config = config();
        config.accrual.tick_interval = Duration::from_secs(60);
        config.accrual.blocks_per_tick = 5;
        let store = Arc::new(RegionStore::new(config));
        let alice = PlayerId::new("Alice").unwrap();
        let bob = PlayerId::new("Bob").unwrap();
        store.record_login(&alice);
        let alice_before = store.ledger().balance(&alice);
        let bob_before = store.ledger().balance(&bob);

        let tasks = StoreTasks::spawn(store.clone(), None);
        // Two ticks elapse under the paused clock
        tokio::time::sleep(Duration::from_secs(150)).await;
        tasks.stop().await;

        assert_eq!(store.ledger().balance(&alice), alice_before + 10);
        assert_eq!(store.ledger().balance(&bob), bob_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_stale_regions() {
        let mut config = config();
        config.expiration.sweep_interval = Duration::from_secs(60);
        let store = Arc::new(RegionStore::new(config));
        let alice = PlayerId::new("Alice").unwrap();
        store.ledger().deposit(&alice, 1_000);
        let world = WorldId::default();
        let region = store
            .try_create(CreateRequest::claim(alice.clone(), world.clone(), bounds()))
            .unwrap();

        // Age the region far past the inactivity threshold
        let (mut regions, defaults, last_id) = store.export_world(&world).unwrap();
        for r in &mut regions {
            r.last_activity = Utc::now() - chrono::Duration::days(90);
        }
        store.import_world(world, regions, defaults, last_id);
        let before = store.ledger().balance(&alice);

        let tasks = StoreTasks::spawn(store.clone(), None);
        tokio::time::sleep(Duration::from_secs(90)).await;
        tasks.stop().await;

        assert!(store.region(region.id).is_none());
        assert_eq!(store.ledger().balance(&alice), before + 100);
    }

    #[tokio::test]
    async fn test_stop_flushes_a_final_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(RegionStore::new(config()));
        store
            .try_create(CreateRequest::server(WorldId::default(), bounds()))
            .unwrap();
        let snapshots = Arc::new(SnapshotStore::new(temp_dir.path()).await.unwrap());

        // Stop long before the first autosave tick
        let tasks = StoreTasks::spawn(store.clone(), Some(snapshots.clone()));
        tasks.stop().await;

        let restored = RegionStore::new(config());
        let report = snapshots.load_all(&restored).await.unwrap();
        assert_eq!(report.worlds, 1);
        assert_eq!(report.regions, 1);
    }
}
