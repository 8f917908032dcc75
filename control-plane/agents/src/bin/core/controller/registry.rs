//! Registry containing every resource known to the control-plane along with the collaborators
//! used to act on them: the persistent store, the host transport, the resource limits and the
//! usage event sink.
//!
//! All specs are cached in memory and written through to the persistent store. On start-up the
//! cache is reloaded from the store, so maintenance work items and vm work jobs outlive the
//! control-plane process which created them.
use super::{lock::KeyedLock, resources::operations_helper::*};
use crate::{
    accounting::{ResourceAccountant, ResourceLimits},
    capacity::stats::StatsCache,
    host::{hypervisor::HypervisorRegistry, transport::HostTransport},
    pool::listener::PoolListeners,
    usage::UsageEventSink,
    vm_work::VmWorkQueue,
};
use agents::errors::SvcError;
use std::{future::Future, ops::Deref, sync::Arc, time::Duration};
use stor_port::{
    pstor::memory::MemoryStore,
    types::v0::{
        store::definitions::{StorableObject, Store, StoreError, StoreKv, StoreObj},
        transport::{NodeId, PoolId, VmId},
    },
};
use tokio::sync::Mutex;

/// Tunables of the core agent.
#[derive(Debug, Clone)]
pub(crate) struct CoreConfig {
    /// Identity of this control-plane node.
    pub(crate) node_id: NodeId,
    /// Pools whose used/total ratio reaches this are not allocated.
    pub(crate) used_threshold: f64,
    /// Pools whose (allocated + asking)/total ratio exceeds this are not allocated.
    pub(crate) allocated_threshold: f64,
    /// Over-provisioning factor of network filesystem pools.
    pub(crate) over_provisioning: f64,
    /// Maximum age of a stats sample to be considered recent.
    pub(crate) stats_max_age: Duration,
    /// Period of the pool stats poller.
    pub(crate) stats_period: Duration,
    /// Custom data volume size bounds.
    pub(crate) min_volume_size: u64,
    pub(crate) max_volume_size: u64,
    /// Interval at which queued vm work jobs are polled.
    pub(crate) job_poll_period: Duration,
    /// Keyed lock acquisition timeout.
    pub(crate) lock_timeout: Duration,
    /// Host agent request timeout.
    pub(crate) request_timeout: Duration,
    /// Control-plane node heartbeat period and departure deadline.
    pub(crate) heartbeat_period: Duration,
    pub(crate) node_deadline: Duration,
    /// Persistent store operation timeout.
    pub(crate) store_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(),
            used_threshold: 1.0,
            allocated_threshold: 1.0,
            over_provisioning: 2.0,
            stats_max_age: Duration::from_secs(120),
            stats_period: Duration::from_secs(60),
            min_volume_size: utils::bytes::GIB,
            max_volume_size: 2 * utils::bytes::TIB,
            job_poll_period: Duration::from_secs(3),
            lock_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(10),
            node_deadline: Duration::from_secs(30),
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// The collaborators of the registry which live outside of the control-plane.
pub(crate) struct Collaborators {
    pub(crate) transport: Arc<dyn HostTransport>,
    pub(crate) limits: Arc<dyn ResourceLimits>,
    pub(crate) usage: Arc<dyn UsageEventSink>,
}

/// Registry containing all resources.
#[derive(Clone, Debug)]
pub(crate) struct Registry {
    inner: Arc<RegistryInner<MemoryStore>>,
}

impl Deref for Registry {
    type Target = Arc<RegistryInner<MemoryStore>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Generic Registry Inner with a Store trait.
pub(crate) struct RegistryInner<S: Store> {
    /// spec of the various resources.
    specs: ResourceSpecsLocked,
    store: Arc<Mutex<S>>,
    config: CoreConfig,
    transport: Arc<dyn HostTransport>,
    limits: Arc<dyn ResourceLimits>,
    usage: Arc<dyn UsageEventSink>,
    hypervisors: HypervisorRegistry,
    listeners: PoolListeners,
    stats: StatsCache,
    vm_work: VmWorkQueue,
    /// serializes the mutating operations of a vm.
    vm_locks: KeyedLock<VmId>,
    /// guards the deletion of a pool.
    pool_locks: KeyedLock<PoolId>,
}

impl<S: Store> std::fmt::Debug for RegistryInner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryInner")
            .field("specs", &self.specs)
            .field("config", &self.config)
            .finish()
    }
}

impl Registry {
    /// Create a new registry backed by `store` and initialise it with the store's content.
    pub(crate) async fn new(
        config: CoreConfig,
        store: MemoryStore,
        collaborators: Collaborators,
    ) -> Result<Self, SvcError> {
        let registry = Self {
            inner: Arc::new(RegistryInner {
                specs: ResourceSpecsLocked::new(),
                store: Arc::new(Mutex::new(store)),
                config,
                transport: collaborators.transport,
                limits: collaborators.limits,
                usage: collaborators.usage,
                hypervisors: HypervisorRegistry::with_defaults(),
                listeners: PoolListeners::with_defaults(),
                stats: StatsCache::default(),
                vm_work: VmWorkQueue::default(),
                vm_locks: KeyedLock::default(),
                pool_locks: KeyedLock::default(),
            }),
        };
        registry.init().await?;
        Ok(registry)
    }

    /// Get the `CoreConfig`.
    pub(crate) fn config(&self) -> &CoreConfig {
        &self.config
    }
    /// Identity of this control-plane node.
    pub(crate) fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }
    /// Get a reference to the locked resource specs object.
    pub(crate) fn specs(&self) -> &ResourceSpecsLocked {
        &self.specs
    }
    /// The host command transport.
    pub(crate) fn transport(&self) -> &Arc<dyn HostTransport> {
        &self.transport
    }
    /// The account resource counters.
    pub(crate) fn accountant(&self) -> ResourceAccountant {
        ResourceAccountant::new(self.limits.clone())
    }
    /// The usage event sink.
    pub(crate) fn usage(&self) -> &Arc<dyn UsageEventSink> {
        &self.usage
    }
    /// The hypervisor capabilities.
    pub(crate) fn hypervisors(&self) -> &HypervisorRegistry {
        &self.hypervisors
    }
    /// The pool host listeners, keyed by storage provider.
    pub(crate) fn listeners(&self) -> &PoolListeners {
        &self.listeners
    }
    /// The latest pool and host stats samples.
    pub(crate) fn stats(&self) -> &StatsCache {
        &self.stats
    }
    /// The vm work job queue.
    pub(crate) fn vm_work(&self) -> &VmWorkQueue {
        &self.vm_work
    }
    /// The per vm lock service.
    pub(crate) fn vm_locks(&self) -> &KeyedLock<VmId> {
        &self.vm_locks
    }
    /// The per pool lock service.
    pub(crate) fn pool_locks(&self) -> &KeyedLock<PoolId> {
        &self.pool_locks
    }

    /// Serialized write to the persistent store.
    pub(crate) async fn store_obj<O: StorableObject>(&self, object: &O) -> Result<(), SvcError> {
        let store = self.store.clone();
        let timeout = self.config.store_timeout;
        match tokio::time::timeout(timeout, async move {
            let mut store = store.lock().await;
            Self::op_with_threshold(async move { store.put_obj(object).await }).await
        })
        .await
        {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(StoreError::Timeout {
                operation: "Put".to_string(),
                timeout,
            }
            .into()),
        }
    }

    /// Serialized delete to the persistent store.
    pub(crate) async fn delete_kv(&self, key: &str) -> Result<(), SvcError> {
        let store = self.store.clone();
        let timeout = self.config.store_timeout;
        match tokio::time::timeout(timeout, async move {
            let mut store = store.lock().await;
            Self::op_with_threshold(async move { store.delete_kv(&key).await }).await
        })
        .await
        {
            Ok(result) => match result {
                Ok(_) => Ok(()),
                // already deleted, no problem
                Err(StoreError::MissingEntry { .. }) => {
                    tracing::warn!("Entry with key {} missing from store.", key);
                    Ok(())
                }
                Err(error) => Err(SvcError::from(error)),
            },
            Err(_) => Err(SvcError::from(StoreError::Timeout {
                operation: "Delete".to_string(),
                timeout,
            })),
        }
    }

    async fn op_with_threshold<F, O>(future: F) -> O
    where
        F: Future<Output = O>,
    {
        let start = std::time::Instant::now();
        let result = future.await;
        let warn_threshold = std::time::Duration::from_secs(1);
        if start.elapsed() > warn_threshold {
            tracing::warn!("Store operation took longer than {:?}", warn_threshold);
        }
        result
    }

    /// Start the background tasks: the pool stats poller and the control-plane node
    /// membership heartbeat/watcher.
    pub(crate) async fn start(&self) {
        let registry = self.clone();
        tokio::spawn(async move {
            crate::capacity::stats::poller(registry).await;
        });
        let registry = self.clone();
        tokio::spawn(async move {
            crate::cluster::membership(registry).await;
        });
    }

    /// Initialise the registry with the content of the persistent store.
    async fn init(&self) -> Result<(), SvcError> {
        let mut store = self.store.lock().await;
        self.specs.init(&mut *store).await
    }
}
