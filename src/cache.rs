use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use crate::db::Snapshot;

pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Time-bounded holder for the last successful snapshot. Owned by the caller;
/// the aggregation code never sees it.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    entry: Option<(Instant, Arc<Snapshot>)>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drops the cached snapshot so the next read reloads.
    pub fn invalidate(&mut self) {
        if self.entry.take().is_some() {
            debug!("snapshot cache invalidated");
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|(stored_at, _)| now.duration_since(*stored_at) < self.ttl)
    }

    /// Returns the cached snapshot while fresh, otherwise runs `load`.
    /// Snapshots that carry a notice are returned but never stored.
    pub async fn get_or_load<F, Fut>(&mut self, load: F) -> Arc<Snapshot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Snapshot>,
    {
        let now = Instant::now();
        if self.is_fresh(now) {
            if let Some((_, snapshot)) = &self.entry {
                debug!("snapshot cache hit");
                return Arc::clone(snapshot);
            }
        }

        debug!("snapshot cache miss, reloading");
        let snapshot = Arc::new(load().await);
        if snapshot.notice.is_none() {
            self.entry = Some((Instant::now(), Arc::clone(&snapshot)));
        } else {
            self.entry = None;
        }
        snapshot
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DashboardError;
    use chrono::Local;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_snapshot() -> Snapshot {
        Snapshot {
            records: Vec::new(),
            dropped_rows: 0,
            notice: None,
            loaded_at: Local::now(),
        }
    }

    #[tokio::test]
    async fn fresh_entries_are_reused() {
        let loads = AtomicUsize::new(0);
        let counter = &loads;
        let mut cache = SnapshotCache::new(Duration::from_secs(60));

        for _ in 0..3 {
            cache
                .get_or_load(move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ok_snapshot()
                })
                .await;
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_reload() {
        let loads = AtomicUsize::new(0);
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let counter = &loads;
        let load = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ok_snapshot()
        };

        cache.get_or_load(load).await;
        cache.invalidate();
        cache.get_or_load(load).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_reloads() {
        let loads = AtomicUsize::new(0);
        let mut cache = SnapshotCache::new(Duration::ZERO);
        let counter = &loads;
        let load = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ok_snapshot()
        };

        cache.get_or_load(load).await;
        cache.get_or_load(load).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let loads = AtomicUsize::new(0);
        let mut cache = SnapshotCache::default();
        let counter = &loads;
        let load = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Snapshot::failed(DashboardError::DataSourceUnavailable("down".into()))
        };

        let snapshot = cache.get_or_load(load).await;
        assert!(snapshot.notice.is_some());
        cache.get_or_load(load).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(!cache.is_fresh(Instant::now()));
    }
}
