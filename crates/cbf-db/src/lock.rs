use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Write lock for one stored series.
///
/// Held for the duration of a write batch (one window's bulk insert, one
/// reconciliation backfill, one fill pass). The guard releases on drop, so
/// every exit path unlocks. Never held across an upstream call or a backoff
/// sleep.
#[derive(Debug, Clone, Default)]
pub struct SeriesLock {
    inner: Arc<Mutex<()>>,
}

#[derive(Debug)]
pub struct SeriesWriteGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SeriesLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write(&self) -> SeriesWriteGuard {
        SeriesWriteGuard {
            _guard: self.inner.clone().lock_owned().await,
        }
    }

    /// Non-blocking probe, `None` while another writer holds the lock.
    pub fn try_write(&self) -> Option<SeriesWriteGuard> {
        self.inner
            .clone()
            .try_lock_owned()
            .ok()
            .map(|g| SeriesWriteGuard { _guard: g })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let lock = SeriesLock::new();
        let clone = lock.clone();
        {
            let _g = lock.write().await;
            assert!(clone.try_write().is_none());
        }
        assert!(clone.try_write().is_some());
    }
}
