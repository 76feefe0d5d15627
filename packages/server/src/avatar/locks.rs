use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutexes keyed by avatar id.
///
/// Entries exist only while someone holds or waits for the lock, so the map
/// does not grow with the number of avatars ever touched.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self
            .inner
            .entry(key.to_string())
            .or_default()
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            map: self.inner.clone(),
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or contended.
    pub fn active(&self) -> usize {
        self.inner.len()
    }
}

pub struct KeyGuard {
    map: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own handle left: nobody is waiting.
        self.map
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
