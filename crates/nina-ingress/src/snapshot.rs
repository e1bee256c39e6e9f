//! The ingress's view of the world: an immutable snapshot of active
//! deployments, refreshed on a timer by a single background task. Readers
//! clone the `Arc` under a shared lock and never hold the lock across an
//! await; the refresher swaps the whole vector at once, so a request
//! observes either the old snapshot in full or the new one in full.

use nina_core::store::Store;
use nina_core::types::Deployment;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Per-attempt deadline for listing deployments from the store.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
pub struct SnapshotCache {
    inner: RwLock<Arc<Vec<Deployment>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Arc<Vec<Deployment>> {
        self.inner.read().unwrap().clone()
    }

    /// Atomically replace the snapshot.
    pub fn install(&self, deployments: Vec<Deployment>) {
        *self.inner.write().unwrap() = Arc::new(deployments);
    }

    /// The unique deployment routed by `app_name`, if any.
    pub fn find(&self, app_name: &str) -> Option<Deployment> {
        self.load().iter().find(|d| d.app_name == app_name).cloned()
    }
}

/// One refresh attempt. On failure the previous snapshot stays installed.
pub async fn refresh_once(store: &Store, cache: &SnapshotCache) {
    match tokio::time::timeout(REFRESH_TIMEOUT, store.list_deployments()).await {
        Ok(Ok(deployments)) => {
            debug!(count = deployments.len(), "updated deployments snapshot");
            cache.install(deployments);
        }
        Ok(Err(e)) => error!(error = %e, "failed to refresh deployments"),
        Err(_) => error!(timeout = ?REFRESH_TIMEOUT, "deployment refresh timed out"),
    }
}

/// Long-lived refresher task: fetch immediately, then on every tick until
/// the shutdown channel fires.
pub async fn run_refresher(
    store: Store,
    cache: Arc<SnapshotCache>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    refresh_once(&store, &cache).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the fetch above covered it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => refresh_once(&store, &cache).await,
            _ = shutdown.changed() => {
                info!("stopping deployment refresher");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nina_core::store::{KvBackend, StoreError};
    use nina_core::types::DeploymentRequest;

    fn deploy_request(app: &str) -> DeploymentRequest {
        DeploymentRequest { app_name: app.into(), commit_hash: "c1".into(), ..Default::default() }
    }

    #[tokio::test]
    async fn refresh_installs_snapshot() {
        let store = Store::in_memory();
        store.create_deployment(&deploy_request("demo"), "").await.unwrap();

        let cache = SnapshotCache::new();
        assert!(cache.find("demo").is_none());
        refresh_once(&store, &cache).await;
        assert_eq!(cache.find("demo").unwrap().app_name, "demo");
        assert!(cache.find("other").is_none());
    }

    struct FailingBackend;

    #[async_trait]
    impl KvBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn put(&self, _key: &str, _value: Vec<u8>) -> Result<(), StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
        async fn keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn refresh_failure_serves_stale_snapshot() {
        let good = Store::in_memory();
        good.create_deployment(&deploy_request("demo"), "").await.unwrap();
        let cache = SnapshotCache::new();
        refresh_once(&good, &cache).await;

        let broken = Store::new(std::sync::Arc::new(FailingBackend));
        refresh_once(&broken, &cache).await;
        // The failed refresh must not wipe the previous snapshot.
        assert!(cache.find("demo").is_some());
    }

    #[tokio::test]
    async fn refresher_runs_until_shutdown() {
        let store = Store::in_memory();
        let cache = Arc::new(SnapshotCache::new());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_refresher(
            store.clone(),
            cache.clone(),
            Duration::from_millis(10),
            rx,
        ));

        store.create_deployment(&deploy_request("late"), "").await.unwrap();
        let mut found = false;
        for _ in 0..100 {
            if cache.find("late").is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found, "refresher never picked up the deployment");

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
