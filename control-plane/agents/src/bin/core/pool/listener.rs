use crate::{controller::registry::Registry, host::dispatcher::CommandDispatcher};
use agents::errors::SvcError;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::{
            definitions::{ObjectKey, StorableObject},
            host::Host,
            pool::{HostPoolRef, StoragePool, DEFAULT_POOL_PROVIDER},
        },
        transport::Command,
    },
};

/// Invoked when a host is connected to or disconnected from a pool of a storage provider.
#[async_trait::async_trait]
pub(crate) trait PoolHostListener: Send + Sync {
    /// Connect the host to the pool.
    async fn host_connect(
        &self,
        registry: &Registry,
        host: &Host,
        pool: &StoragePool,
    ) -> Result<(), SvcError>;
    /// Disconnect the host from the pool.
    async fn host_disconnect(
        &self,
        registry: &Registry,
        host: &Host,
        pool: &StoragePool,
    ) -> Result<(), SvcError>;
}

/// Sends `ModifyStoragePool` to the host and records the host pool connectivity.
#[derive(Debug, Default)]
pub(crate) struct DefaultPoolListener {}

#[async_trait::async_trait]
impl PoolHostListener for DefaultPoolListener {
    async fn host_connect(
        &self,
        registry: &Registry,
        host: &Host,
        pool: &StoragePool,
    ) -> Result<(), SvcError> {
        CommandDispatcher::new(registry)
            .send_to_host(
                &host.id,
                vec![Command::ModifyStoragePool {
                    add: true,
                    pool: pool.target(),
                }],
            )
            .await?;
        let host_pool = HostPoolRef {
            host: host.id.clone(),
            pool: pool.id.clone(),
            local_path: None,
        };
        registry.store_obj(&host_pool).await?;
        registry.specs().insert_host_pool(host_pool);
        Ok(())
    }

    async fn host_disconnect(
        &self,
        registry: &Registry,
        host: &Host,
        pool: &StoragePool,
    ) -> Result<(), SvcError> {
        let result = CommandDispatcher::new(registry)
            .send_to_host(
                &host.id,
                vec![Command::ModifyStoragePool {
                    add: false,
                    pool: pool.target(),
                }],
            )
            .await;
        let host_pool = HostPoolRef {
            host: host.id.clone(),
            pool: pool.id.clone(),
            local_path: None,
        };
        registry.delete_kv(&host_pool.key().key()).await?;
        registry.specs().remove_host_pool(&pool.id, &host.id);
        result.map(|_| ())
    }
}

/// The pool host listeners, keyed by storage provider name.
/// Populated at start-up and read-only afterwards, except through `register`.
pub(crate) struct PoolListeners {
    listeners: RwLock<HashMap<String, Arc<dyn PoolHostListener>>>,
}

impl PoolListeners {
    /// The listeners with the default provider registered.
    pub(crate) fn with_defaults() -> Self {
        let listeners = Self {
            listeners: RwLock::new(HashMap::new()),
        };
        listeners.register(DEFAULT_POOL_PROVIDER, Arc::new(DefaultPoolListener::default()));
        listeners
    }

    /// Add or replace the listener of a storage provider.
    pub(crate) fn register(&self, provider: &str, listener: Arc<dyn PoolHostListener>) {
        tracing::debug!(provider, "Registering pool host listener");
        self.listeners.write().insert(provider.to_string(), listener);
    }

    /// The listener of the storage provider, falling back to the default provider's.
    pub(crate) fn get(&self, provider: &str) -> Option<Arc<dyn PoolHostListener>> {
        let listeners = self.listeners.read();
        listeners
            .get(provider)
            .or_else(|| listeners.get(DEFAULT_POOL_PROVIDER))
            .cloned()
    }

    /// Connect the hosts to the pool, returning how many connected.
    pub(crate) async fn connect_hosts(
        &self,
        registry: &Registry,
        pool: &StoragePool,
        hosts: &[Host],
    ) -> usize {
        let listener = match self.get(&pool.provider) {
            Some(listener) => listener,
            None => {
                tracing::error!(pool.id = %pool.id, provider = %pool.provider, "No listener");
                return 0;
            }
        };
        let mut connected = 0;
        for host in hosts {
            match listener.host_connect(registry, host, pool).await {
                Ok(()) => connected += 1,
                Err(error) => tracing::warn!(
                    pool.id = %pool.id,
                    host.id = %host.id,
                    error = error.full_string(),
                    "Failed to connect host to the pool"
                ),
            }
        }
        connected
    }

    /// Disconnect every connected host from the pool, best effort.
    pub(crate) async fn disconnect_hosts(&self, registry: &Registry, pool: &StoragePool) {
        let listener = match self.get(&pool.provider) {
            Some(listener) => listener,
            None => return,
        };
        for host in registry.specs().pool_hosts(&pool.id) {
            if let Err(error) = listener.host_disconnect(registry, &host, pool).await {
                tracing::warn!(
                    pool.id = %pool.id,
                    host.id = %host.id,
                    error = error.full_string(),
                    "Failed to disconnect host from the pool"
                );
            }
        }
    }
}

impl std::fmt::Debug for PoolListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolListeners")
            .field("providers", &self.listeners.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
