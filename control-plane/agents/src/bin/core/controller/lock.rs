use agents::errors::SvcError;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt::Display, hash::Hash, sync::Arc, time::Duration};

/// Async lock guard of a single key.
type KeyLockGuard = tokio::sync::OwnedMutexGuard<()>;

/// A lock service keyed by resource identifiers.
/// Each key is guarded by its own async mutex which is created on demand and dropped once
/// nobody holds or waits for it.
#[derive(Debug)]
pub(crate) struct KeyedLock<K> {
    locks: Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<K> Clone for KeyedLock<K> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self {
            locks: Default::default(),
        }
    }
}

impl<K: Eq + Hash + Clone + Display> KeyedLock<K> {
    /// Acquire the lock of `key`, waiting at most `timeout`.
    /// The lock is released when the returned guard is dropped.
    pub(crate) async fn lock(
        &self,
        key: &K,
        timeout: Duration,
    ) -> Result<KeyedLockGuard<K>, SvcError> {
        let mutex = self.locks.lock().entry(key.clone()).or_default().clone();
        match tokio::time::timeout(timeout, mutex.clone().lock_owned()).await {
            Ok(guard) => Ok(KeyedLockGuard {
                guard: Some(guard),
                mutex,
                key: key.clone(),
                locks: self.locks.clone(),
            }),
            Err(_) => {
                drop(mutex);
                self.release(key);
                Err(SvcError::LockTimeout {
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Check if the lock of `key` is currently held.
    pub(crate) fn is_locked(&self, key: &K) -> bool {
        match self.locks.lock().get(key) {
            Some(mutex) => mutex.try_lock().is_err(),
            None => false,
        }
    }

    /// Remove the key's mutex if it's no longer referenced by anyone but the map.
    fn release(&self, key: &K) {
        let mut locks = self.locks.lock();
        if let Some(mutex) = locks.get(key) {
            if Arc::strong_count(mutex) == 1 {
                locks.remove(key);
            }
        }
    }
}

/// Scoped acquisition of a `KeyedLock` key.
#[derive(Debug)]
pub(crate) struct KeyedLockGuard<K: Eq + Hash> {
    guard: Option<KeyLockGuard>,
    mutex: Arc<tokio::sync::Mutex<()>>,
    key: K,
    locks: Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<K: Eq + Hash> Drop for KeyedLockGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        // the map and this guard
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serializes_same_key() {
        let locks = KeyedLock::<String>::default();
        let key = "vm-1".to_string();
        let guard = locks.lock(&key, Duration::from_secs(1)).await.unwrap();
        assert!(locks.is_locked(&key));

        let error = locks
            .lock(&key, Duration::from_millis(50))
            .await
            .expect_err("already held");
        assert!(matches!(error, SvcError::LockTimeout { .. }));

        // other keys are independent
        let other = locks
            .lock(&"vm-2".to_string(), Duration::from_millis(50))
            .await;
        assert!(other.is_ok());

        drop(guard);
        assert!(!locks.is_locked(&key));
        assert!(locks.lock(&key, Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn entries_are_dropped() {
        let locks = KeyedLock::<String>::default();
        let key = "pool-1".to_string();
        drop(locks.lock(&key, Duration::from_secs(1)).await.unwrap());
        assert!(locks.locks.lock().is_empty());
    }
}
