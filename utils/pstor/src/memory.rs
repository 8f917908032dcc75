//! A persistent store backend which keeps every entry in memory.
//! Entries are kept as json values so the serialisation contract is the same as for any remote
//! key-value store, which also means a value can be read back as a different version of a type.

use crate::{
    api::{ObjectKey, StorableObject, Store, StoreKey, StoreKv, StoreObj, StoreValue},
    common::{key_prefix_obj, ApiVersion, StorableObjectType},
    error::{DeserialiseValue, MissingEntry, NotReady, SerialiseValue},
    Error, StoreWatchReceiver, WatchEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use snafu::ResultExt;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc::Sender;

type Watchers = Vec<(String, Sender<Result<WatchEvent, Error>>)>;

#[derive(Default, Debug)]
struct MemoryStoreInner {
    entries: BTreeMap<String, Value>,
    watchers: Watchers,
    offline: bool,
}

/// In-memory key-value store.
/// Clones share the same underlying entries.
#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
    /// Mark the store as offline (or back online). While offline all operations fail.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }
    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }
    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(inner: &MemoryStoreInner) -> Result<(), Error> {
        match inner.offline {
            true => NotReady {
                reason: "store is offline".to_string(),
            }
            .fail(),
            false => Ok(()),
        }
    }

    fn notify(inner: &mut MemoryStoreInner, key: &str, event: impl Fn() -> WatchEvent) {
        inner.watchers.retain(|(watched, sender)| {
            if watched != key {
                return !sender.is_closed();
            }
            match sender.try_send(Ok(event())) {
                Ok(_) => true,
                Err(error) => {
                    tracing::warn!(key, %error, "Dropping store watcher");
                    false
                }
            }
        });
    }
}

#[async_trait]
impl StoreKv for MemoryStore {
    async fn put_kv<K: StoreKey, V: StoreValue>(
        &mut self,
        key: &K,
        value: &V,
    ) -> Result<(), Error> {
        let value = serde_json::to_value(value).context(SerialiseValue)?;
        let key = key.to_string();
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        inner.entries.insert(key.clone(), value.clone());
        Self::notify(&mut inner, &key, || WatchEvent::Put(key.clone(), value.clone()));
        Ok(())
    }

    async fn get_kv<K: StoreKey>(&mut self, key: &K) -> Result<Value, Error> {
        let key = key.to_string();
        let inner = self.inner.lock();
        Self::check_online(&inner)?;
        match inner.entries.get(&key) {
            Some(value) => Ok(value.clone()),
            None => MissingEntry { key }.fail(),
        }
    }

    async fn delete_kv<K: StoreKey>(&mut self, key: &K) -> Result<(), Error> {
        let key = key.to_string();
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        if inner.entries.remove(&key).is_some() {
            Self::notify(&mut inner, &key, || WatchEvent::Delete);
        }
        Ok(())
    }

    async fn watch_kv<K: StoreKey>(&mut self, key: &K) -> Result<StoreWatchReceiver, Error> {
        let (sender, receiver) = tokio::sync::mpsc::channel(32);
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        inner.watchers.push((key.to_string(), sender));
        Ok(receiver)
    }

    async fn get_values_prefix(&mut self, key_prefix: &str) -> Result<Vec<(String, Value)>, Error> {
        let inner = self.inner.lock();
        Self::check_online(&inner)?;
        Ok(inner
            .entries
            .range(key_prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(key_prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn delete_values_prefix(&mut self, key_prefix: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        Self::check_online(&inner)?;
        inner.entries.retain(|key, _| !key.starts_with(key_prefix));
        Ok(())
    }
}

#[async_trait]
impl StoreObj for MemoryStore {
    async fn put_obj<O: StorableObject>(&mut self, object: &O) -> Result<(), Error> {
        let key = object.key().key();
        self.put_kv(&key, object).await
    }

    async fn get_obj<O: StorableObject>(&mut self, key: &O::Key) -> Result<O, Error> {
        let value = self.get_kv(&key.key()).await?;
        serde_json::from_value(value.clone()).context(DeserialiseValue {
            value: value.to_string(),
        })
    }

    async fn get_objs<O: StorableObject>(
        &mut self,
        kind: StorableObjectType,
    ) -> Result<Vec<O>, Error> {
        // the trailing separator keeps `Volume` from matching `VolumeSnapshot` entries
        let prefix = format!("{}/", key_prefix_obj(kind, ApiVersion::V0));
        self.get_values_prefix(&prefix)
            .await?
            .into_iter()
            .map(|(_, value)| {
                serde_json::from_value(value.clone()).context(DeserialiseValue {
                    value: value.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn online(&mut self) -> bool {
        !self.inner.lock().offline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TestStruct {
        name: String,
        value: u64,
    }
    struct TestKey(String);
    impl ObjectKey for TestKey {
        type Kind = StorableObjectType;
        fn version(&self) -> ApiVersion {
            ApiVersion::V0
        }
        fn key_type(&self) -> Self::Kind {
            StorableObjectType::Volume
        }
        fn key_uuid(&self) -> String {
            self.0.clone()
        }
    }
    impl StorableObject for TestStruct {
        type Key = TestKey;
        fn key(&self) -> Self::Key {
            TestKey(self.name.clone())
        }
    }

    #[tokio::test]
    async fn objects() {
        let mut store = MemoryStore::new();
        let mut data = TestStruct {
            name: "vol-1".to_string(),
            value: 100,
        };
        store.put_obj(&data).await.unwrap();
        let read: TestStruct = store.get_obj(&TestKey("vol-1".into())).await.unwrap();
        assert_eq!(read, data);

        data.value = 200;
        store.put_obj(&data).await.unwrap();
        store
            .put_obj(&TestStruct {
                name: "vol-2".to_string(),
                value: 1,
            })
            .await
            .unwrap();
        let all: Vec<TestStruct> = store.get_objs(StorableObjectType::Volume).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&data));

        let none: Vec<TestStruct> = store
            .get_objs(StorableObjectType::VolumeSnapshot)
            .await
            .unwrap();
        assert!(none.is_empty());

        store.delete_kv(&data.key().key()).await.unwrap();
        let error = store
            .get_obj::<TestStruct>(&TestKey("vol-1".into()))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::MissingEntry { .. }));
    }

    #[tokio::test]
    async fn watch_and_offline() {
        let mut store = MemoryStore::new();
        let key = "watched".to_string();
        let mut receiver = store.watch_kv(&key).await.unwrap();
        store.put_kv(&key, &serde_json::json!(1)).await.unwrap();
        match receiver.recv().await {
            Some(Ok(WatchEvent::Put(k, v))) => {
                assert_eq!(k, key);
                assert_eq!(v, serde_json::json!(1));
            }
            other => panic!("Unexpected watch event: {other:?}"),
        }

        store.set_offline(true);
        assert!(!store.online().await);
        let error = store.get_kv(&key).await.unwrap_err();
        assert!(matches!(error, Error::NotReady { .. }));
        store.set_offline(false);
        assert_eq!(store.get_kv(&key).await.unwrap(), serde_json::json!(1));
    }
}
