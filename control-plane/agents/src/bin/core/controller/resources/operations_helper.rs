use super::{
    super::registry::Registry, resource_map::ResourceMap, OperationGuardArc, ResourceMutex,
    ResourceUid,
};
use agents::errors::SvcError;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use std::{fmt::Debug, ops::Deref, sync::Arc};
use stor_port::{
    pstor::ApiVersion,
    transport_api::ResourceKind,
    types::v0::{
        store::{
            capacity::{CapacityKind, CapacityRecord},
            definitions::{key_prefix_obj, StorableObject, StorableObjectType, Store, StoreError},
            host::Host,
            node::ControlPlaneNode,
            offering::DiskOffering,
            pool::{HostPoolRef, StoragePool},
            snapshot::VolumeSnapshot,
            vm::VmInstance,
            vm_work::VmWorkJob,
            volume::VolumeSpec,
            work_item::StoragePoolWorkItem,
            AsOperationSequencer,
        },
        transport::{
            ClusterId, DiskOfferingId, HostId, JobId, NodeId, PoolId, SnapshotId, VmId, VolumeId,
            ZoneId,
        },
    },
};

#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
enum SpecError {
    /// Failed to get entries from the persistent store.
    #[snafu(display("Failed to get entries from store. Error {}", source))]
    StoreGet { source: Box<StoreError> },
    /// Failed to deserialise the entries from the persistent store.
    #[snafu(display("Failed to deserialise object type {}", obj_type))]
    Deserialise {
        obj_type: StorableObjectType,
        source: serde_json::Error,
    },
}

/// Operations are locked
#[async_trait::async_trait]
pub(crate) trait OperationSequenceGuard<T: AsOperationSequencer + Clone + Debug> {
    /// Attempt to obtain an exclusive guard.
    fn operation_guard(&self) -> Result<OperationGuardArc<T>, SvcError>;
    /// Attempt to obtain an exclusive guard.
    /// A few attempts are made with an async sleep in case something else is already running.
    async fn operation_guard_wait(&self) -> Result<OperationGuardArc<T>, SvcError>;
}

#[async_trait::async_trait]
impl<T> OperationSequenceGuard<T> for ResourceMutex<T>
where
    T: AsOperationSequencer + ResourceUid + Clone + Debug + Send + Sync,
    T::Uid: std::fmt::Display,
{
    fn operation_guard(&self) -> Result<OperationGuardArc<T>, SvcError> {
        let get_value = |s: &Self| s.lock().clone();

        match OperationGuardArc::try_sequence(self, get_value) {
            Ok(guard) => Ok(guard),
            Err((error, log)) => {
                if log {
                    tracing::debug!("Resource '{}' is busy: {}", self.immutable_ref().uid(), error);
                }
                Err(SvcError::Conflict {})
            }
        }
    }
    async fn operation_guard_wait(&self) -> Result<OperationGuardArc<T>, SvcError> {
        let mut tries = 5;
        loop {
            tries -= 1;
            match self.operation_guard() {
                Ok(guard) => return Ok(guard),
                Err(error) if tries == 0 => {
                    return Err(error);
                }
                Err(_) => {}
            };

            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }
}

impl<T: StorableObject + Clone> ResourceMutex<T> {
    /// Apply `update` to a copy of the resource, persist it and only then publish it
    /// to the in-memory cache. Returns the updated copy.
    pub(crate) async fn persist_with<F>(
        &self,
        registry: &Registry,
        update: F,
    ) -> Result<T, SvcError>
    where
        F: FnOnce(&mut T) -> Result<(), SvcError> + Send,
    {
        let mut value = self.lock().clone();
        update(&mut value)?;
        registry.store_obj(&value).await?;
        *self.lock() = value.clone();
        Ok(value)
    }
}

/// Locked Resource Specs
#[derive(Default, Clone, Debug)]
pub(crate) struct ResourceSpecsLocked(Arc<RwLock<ResourceSpecs>>);

impl Deref for ResourceSpecsLocked {
    type Target = Arc<RwLock<ResourceSpecs>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Resource Specs
#[derive(Default, Debug)]
pub(crate) struct ResourceSpecs {
    pub(crate) pools: ResourceMap<PoolId, StoragePool>,
    pub(crate) volumes: ResourceMap<VolumeId, VolumeSpec>,
    pub(crate) snapshots: ResourceMap<SnapshotId, VolumeSnapshot>,
    pub(crate) hosts: ResourceMap<HostId, Host>,
    pub(crate) vms: ResourceMap<VmId, VmInstance>,
    pub(crate) offerings: ResourceMap<DiskOfferingId, DiskOffering>,
    pub(crate) jobs: ResourceMap<JobId, VmWorkJob>,
    pub(crate) nodes: ResourceMap<NodeId, ControlPlaneNode>,
    pub(crate) host_pools: IndexMap<(PoolId, HostId), HostPoolRef>,
    pub(crate) work_items: IndexMap<(PoolId, VmId), StoragePoolWorkItem>,
    pub(crate) capacity: IndexMap<(PoolId, CapacityKind), CapacityRecord>,
}

impl ResourceSpecsLocked {
    pub(crate) fn new() -> Self {
        ResourceSpecsLocked::default()
    }

    /// Initialise the resource specs with the content from the persistent store.
    pub(crate) async fn init<S: Store>(&self, store: &mut S) -> Result<(), SvcError> {
        let spec_types = [
            StorableObjectType::StoragePool,
            StorableObjectType::HostPoolRef,
            StorableObjectType::Volume,
            StorableObjectType::VolumeSnapshot,
            StorableObjectType::StoragePoolWorkItem,
            StorableObjectType::CapacityRecord,
            StorableObjectType::VmWorkJob,
            StorableObjectType::Host,
            StorableObjectType::VmInstance,
            StorableObjectType::DiskOffering,
            StorableObjectType::ControlPlaneNode,
        ];
        for spec in &spec_types {
            if let Err(error) = self.populate_specs(store, *spec).await {
                return Err(SvcError::Internal {
                    details: format!("Failed to initialise resource specs. Err {error}."),
                });
            }
        }
        Ok(())
    }

    /// Deserialise a vector of serde_json values into specific spec types.
    /// If deserialisation fails for any object, return an error.
    fn deserialise_specs<T>(values: Vec<serde_json::Value>) -> Result<Vec<T>, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        values.into_iter().map(serde_json::from_value).collect()
    }

    /// Populate the resource specs with data from the persistent store.
    async fn populate_specs<S: Store>(
        &self,
        store: &mut S,
        spec_type: StorableObjectType,
    ) -> Result<(), SpecError> {
        let prefix = format!("{}/", key_prefix_obj(spec_type, ApiVersion::V0));
        let store_entries =
            store
                .get_values_prefix(&prefix)
                .await
                .map_err(|e| SpecError::StoreGet {
                    source: Box::new(e),
                })?;
        let store_values = store_entries.into_iter().map(|e| e.1).collect();
        let ctx = Deserialise {
            obj_type: spec_type,
        };

        let mut specs = self.0.write();
        match spec_type {
            StorableObjectType::StoragePool => {
                let values = Self::deserialise_specs::<StoragePool>(store_values).context(ctx)?;
                specs.pools.populate(values);
            }
            StorableObjectType::HostPoolRef => {
                let values = Self::deserialise_specs::<HostPoolRef>(store_values).context(ctx)?;
                for value in values {
                    specs
                        .host_pools
                        .insert((value.pool.clone(), value.host.clone()), value);
                }
            }
            StorableObjectType::Volume => {
                let values = Self::deserialise_specs::<VolumeSpec>(store_values).context(ctx)?;
                specs.volumes.populate(values);
            }
            StorableObjectType::VolumeSnapshot => {
                let values =
                    Self::deserialise_specs::<VolumeSnapshot>(store_values).context(ctx)?;
                specs.snapshots.populate(values);
            }
            StorableObjectType::StoragePoolWorkItem => {
                let values =
                    Self::deserialise_specs::<StoragePoolWorkItem>(store_values).context(ctx)?;
                for value in values {
                    specs
                        .work_items
                        .insert((value.pool.clone(), value.vm.clone()), value);
                }
            }
            StorableObjectType::CapacityRecord => {
                let values =
                    Self::deserialise_specs::<CapacityRecord>(store_values).context(ctx)?;
                for value in values {
                    specs.capacity.insert((value.pool.clone(), value.kind), value);
                }
            }
            StorableObjectType::VmWorkJob => {
                let values = Self::deserialise_specs::<VmWorkJob>(store_values).context(ctx)?;
                specs.jobs.populate(values);
            }
            StorableObjectType::Host => {
                let values = Self::deserialise_specs::<Host>(store_values).context(ctx)?;
                specs.hosts.populate(values);
            }
            StorableObjectType::VmInstance => {
                let values = Self::deserialise_specs::<VmInstance>(store_values).context(ctx)?;
                specs.vms.populate(values);
            }
            StorableObjectType::DiskOffering => {
                let values = Self::deserialise_specs::<DiskOffering>(store_values).context(ctx)?;
                specs.offerings.populate(values);
            }
            StorableObjectType::ControlPlaneNode => {
                let values =
                    Self::deserialise_specs::<ControlPlaneNode>(store_values).context(ctx)?;
                specs.nodes.populate(values);
            }
        };
        Ok(())
    }

    /// Get the pool with the given id.
    pub(crate) fn pool_rsc(&self, id: &PoolId) -> Result<ResourceMutex<StoragePool>, SvcError> {
        match self.read().pools.get(id) {
            Some(pool) => Ok(pool.clone()),
            None => Err(SvcError::PoolNotFound { pool_id: id.clone() }),
        }
    }
    /// Get a copy of the pool with the given id.
    pub(crate) fn pool(&self, id: &PoolId) -> Result<StoragePool, SvcError> {
        Ok(self.pool_rsc(id)?.lock().clone())
    }
    /// Get a copy of all pools.
    pub(crate) fn pools(&self) -> Vec<StoragePool> {
        self.read().pools.cloned()
    }
    /// Get a copy of all pools in the given zone.
    pub(crate) fn zone_pools(&self, zone: &ZoneId) -> Vec<StoragePool> {
        self.pools()
            .into_iter()
            .filter(|p| &p.zone == zone)
            .collect()
    }
    /// Get a copy of all pools in the given cluster.
    pub(crate) fn cluster_pools(&self, cluster: &ClusterId) -> Vec<StoragePool> {
        self.pools()
            .into_iter()
            .filter(|p| p.cluster.as_ref() == Some(cluster))
            .collect()
    }

    /// Get the volume with the given id.
    pub(crate) fn volume_rsc(&self, id: &VolumeId) -> Result<ResourceMutex<VolumeSpec>, SvcError> {
        match self.read().volumes.get(id) {
            Some(volume) => Ok(volume.clone()),
            None => Err(SvcError::VolumeNotFound { vol_id: id.clone() }),
        }
    }
    /// Get a copy of the volume with the given id.
    pub(crate) fn volume(&self, id: &VolumeId) -> Result<VolumeSpec, SvcError> {
        Ok(self.volume_rsc(id)?.lock().clone())
    }
    /// Get a copy of all volumes.
    pub(crate) fn volumes(&self) -> Vec<VolumeSpec> {
        self.read().volumes.cloned()
    }
    /// Get a copy of all volumes placed on the given pool.
    pub(crate) fn pool_volumes(&self, pool: &PoolId) -> Vec<VolumeSpec> {
        self.volumes()
            .into_iter()
            .filter(|v| v.pool.as_ref() == Some(pool))
            .collect()
    }
    /// Get a copy of all volumes attached to the given vm.
    pub(crate) fn vm_volumes(&self, vm: &VmId) -> Vec<VolumeSpec> {
        self.volumes()
            .into_iter()
            .filter(|v| v.attached_to(vm))
            .collect()
    }
    /// Remove the volume from the cache.
    pub(crate) fn remove_volume(&self, id: &VolumeId) {
        self.write().volumes.remove(id);
    }

    /// Get the snapshot with the given id.
    pub(crate) fn snapshot_rsc(
        &self,
        id: &SnapshotId,
    ) -> Result<ResourceMutex<VolumeSnapshot>, SvcError> {
        match self.read().snapshots.get(id) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => Err(SvcError::NotFound {
                kind: ResourceKind::VolumeSnapshot,
                id: id.to_string(),
            }),
        }
    }
    /// Get a copy of all snapshots of the given volume.
    pub(crate) fn volume_snapshots(&self, volume: &VolumeId) -> Vec<VolumeSnapshot> {
        self.read()
            .snapshots
            .cloned()
            .into_iter()
            .filter(|s| &s.volume == volume)
            .collect()
    }

    /// Get a copy of the host with the given id.
    pub(crate) fn host(&self, id: &HostId) -> Result<Host, SvcError> {
        match self.read().hosts.get(id) {
            Some(host) => Ok(host.lock().clone()),
            None => Err(SvcError::NotFound {
                kind: ResourceKind::Host,
                id: id.to_string(),
            }),
        }
    }
    /// Get a copy of all hosts.
    pub(crate) fn hosts(&self) -> Vec<Host> {
        self.read().hosts.cloned()
    }
    /// Get a copy of all hosts in the given cluster.
    pub(crate) fn cluster_hosts(&self, cluster: &ClusterId) -> Vec<Host> {
        self.hosts()
            .into_iter()
            .filter(|h| &h.cluster == cluster)
            .collect()
    }
    /// Get a copy of all hosts connected to the given pool.
    pub(crate) fn pool_hosts(&self, pool: &PoolId) -> Vec<Host> {
        let specs = self.read();
        specs
            .host_pools
            .keys()
            .filter(|(p, _)| p == pool)
            .filter_map(|(_, h)| specs.hosts.get(h).map(|h| h.lock().clone()))
            .collect()
    }
    /// Add or replace a host pool connectivity record.
    pub(crate) fn insert_host_pool(&self, host_pool: HostPoolRef) {
        self.write()
            .host_pools
            .insert((host_pool.pool.clone(), host_pool.host.clone()), host_pool);
    }
    /// Remove a host pool connectivity record.
    pub(crate) fn remove_host_pool(&self, pool: &PoolId, host: &HostId) {
        self.write()
            .host_pools
            .shift_remove(&(pool.clone(), host.clone()));
    }
    /// Get the host pool connectivity records of the given pool.
    pub(crate) fn host_pool_refs(&self, pool: &PoolId) -> Vec<HostPoolRef> {
        self.read()
            .host_pools
            .values()
            .filter(|r| &r.pool == pool)
            .cloned()
            .collect()
    }

    /// Get the vm with the given id.
    pub(crate) fn vm_rsc(&self, id: &VmId) -> Result<ResourceMutex<VmInstance>, SvcError> {
        match self.read().vms.get(id) {
            Some(vm) => Ok(vm.clone()),
            None => Err(SvcError::VmNotFound { vm_id: id.clone() }),
        }
    }
    /// Get a copy of the vm with the given id.
    pub(crate) fn vm(&self, id: &VmId) -> Result<VmInstance, SvcError> {
        Ok(self.vm_rsc(id)?.lock().clone())
    }

    /// Get a copy of the disk offering with the given id.
    pub(crate) fn offering(&self, id: &DiskOfferingId) -> Result<DiskOffering, SvcError> {
        match self.read().offerings.get(id) {
            Some(offering) => Ok(offering.lock().clone()),
            None => Err(SvcError::NotFound {
                kind: ResourceKind::DiskOffering,
                id: id.to_string(),
            }),
        }
    }

    /// Get the vm work job with the given id.
    pub(crate) fn job_rsc(&self, id: &JobId) -> Result<ResourceMutex<VmWorkJob>, SvcError> {
        match self.read().jobs.get(id) {
            Some(job) => Ok(job.clone()),
            None => Err(SvcError::NotFound {
                kind: ResourceKind::VmWorkJob,
                id: id.to_string(),
            }),
        }
    }
    /// Get a copy of all vm work jobs.
    pub(crate) fn jobs(&self) -> Vec<VmWorkJob> {
        self.read().jobs.cloned()
    }

    /// Get all the control-plane nodes.
    pub(crate) fn control_plane_nodes(&self) -> Vec<ResourceMutex<ControlPlaneNode>> {
        self.read().nodes.to_vec()
    }

    /// Get a copy of the maintenance work items of the given pool.
    pub(crate) fn work_items(&self, pool: &PoolId) -> Vec<StoragePoolWorkItem> {
        self.read()
            .work_items
            .values()
            .filter(|w| &w.pool == pool)
            .cloned()
            .collect()
    }
    /// Get a copy of every maintenance work item.
    pub(crate) fn all_work_items(&self) -> Vec<StoragePoolWorkItem> {
        self.read().work_items.values().cloned().collect()
    }
    /// Add or replace a maintenance work item.
    pub(crate) fn insert_work_item(&self, item: StoragePoolWorkItem) {
        self.write()
            .work_items
            .insert((item.pool.clone(), item.vm.clone()), item);
    }
    /// Remove a maintenance work item.
    pub(crate) fn remove_work_item(&self, pool: &PoolId, vm: &VmId) {
        self.write()
            .work_items
            .shift_remove(&(pool.clone(), vm.clone()));
    }

    /// Get a copy of the capacity record of the given pool and kind.
    pub(crate) fn capacity(&self, pool: &PoolId, kind: CapacityKind) -> Option<CapacityRecord> {
        self.read().capacity.get(&(pool.clone(), kind)).cloned()
    }
    /// Add or replace a capacity record.
    pub(crate) fn insert_capacity(&self, record: CapacityRecord) {
        self.write()
            .capacity
            .insert((record.pool.clone(), record.kind), record);
    }
    /// Remove every capacity record of the given pool.
    pub(crate) fn remove_capacity(&self, pool: &PoolId) -> Vec<CapacityRecord> {
        let mut specs = self.write();
        let keys = specs
            .capacity
            .keys()
            .filter(|(p, _)| p == pool)
            .cloned()
            .collect::<Vec<_>>();
        keys.iter()
            .filter_map(|key| specs.capacity.shift_remove(key))
            .collect()
    }

    /// Add or replace a pool in the cache.
    pub(crate) fn insert_pool(&self, pool: StoragePool) -> ResourceMutex<StoragePool> {
        self.write().pools.insert(pool)
    }
    /// Remove the pool from the cache.
    pub(crate) fn remove_pool(&self, id: &PoolId) {
        self.write().pools.remove(id);
    }
    /// Add or replace a volume in the cache.
    pub(crate) fn insert_volume(&self, volume: VolumeSpec) -> ResourceMutex<VolumeSpec> {
        self.write().volumes.insert(volume)
    }
    /// Add or replace a snapshot in the cache.
    pub(crate) fn insert_snapshot(
        &self,
        snapshot: VolumeSnapshot,
    ) -> ResourceMutex<VolumeSnapshot> {
        self.write().snapshots.insert(snapshot)
    }
    /// Add or replace a host in the cache.
    pub(crate) fn insert_host(&self, host: Host) {
        self.write().hosts.insert(host);
    }
    /// Add or replace a vm in the cache.
    pub(crate) fn insert_vm(&self, vm: VmInstance) {
        self.write().vms.insert(vm);
    }
    /// Add or replace a disk offering in the cache.
    pub(crate) fn insert_offering(&self, offering: DiskOffering) {
        self.write().offerings.insert(offering);
    }
    /// Add or replace a vm work job in the cache.
    pub(crate) fn insert_job(&self, job: VmWorkJob) -> ResourceMutex<VmWorkJob> {
        self.write().jobs.insert(job)
    }
    /// Remove the vm work job from the cache.
    pub(crate) fn remove_job(&self, id: &JobId) {
        self.write().jobs.remove(id);
    }
    /// Add or replace a control-plane node in the cache.
    pub(crate) fn insert_node(&self, node: ControlPlaneNode) -> ResourceMutex<ControlPlaneNode> {
        self.write().nodes.insert(node)
    }
}
