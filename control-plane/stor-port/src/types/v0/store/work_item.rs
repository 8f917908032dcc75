//! Durable per-vm work records of a pool maintenance transition.

use crate::types::v0::{
    store::definitions::{ObjectKey, StorableObject, StorableObjectType},
    transport::{NodeId, PoolId, VmId},
};
use pstor::ApiVersion;
use serde::{Deserialize, Serialize};

/// Record of a vm which is affected by the maintenance of a pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoragePoolWorkItem {
    pub pool: PoolId,
    pub vm: VmId,
    /// The vm was stopped because of the maintenance.
    pub stopped_for_maintenance: bool,
    /// The vm was started again after being stopped.
    pub started_after_maintenance: bool,
    /// The control-plane node which owns the item.
    pub owner: NodeId,
}

impl StoragePoolWorkItem {
    /// Return a new pending `Self`.
    pub fn new(pool: &PoolId, vm: &VmId, owner: &NodeId) -> Self {
        Self {
            pool: pool.clone(),
            vm: vm.clone(),
            stopped_for_maintenance: false,
            started_after_maintenance: false,
            owner: owner.clone(),
        }
    }
    /// Pending work when entering maintenance: the vm has not been stopped yet.
    pub fn pending_prepare(&self) -> bool {
        !self.stopped_for_maintenance
    }
    /// Pending work when cancelling maintenance: the vm was stopped but not restarted.
    pub fn pending_cancel(&self) -> bool {
        self.stopped_for_maintenance && !self.started_after_maintenance
    }
}

/// Key for a `StoragePoolWorkItem`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoragePoolWorkItemKey {
    pool: PoolId,
    vm: VmId,
}
impl StoragePoolWorkItemKey {
    /// Return a new `Self` for the given pool and vm.
    pub fn new(pool: &PoolId, vm: &VmId) -> Self {
        Self {
            pool: pool.clone(),
            vm: vm.clone(),
        }
    }
}

impl ObjectKey for StoragePoolWorkItemKey {
    type Kind = StorableObjectType;

    fn version(&self) -> ApiVersion {
        ApiVersion::V0
    }
    fn key_type(&self) -> StorableObjectType {
        StorableObjectType::StoragePoolWorkItem
    }
    fn key_uuid(&self) -> String {
        format!("{}/{}", self.pool, self.vm)
    }
}

impl StorableObject for StoragePoolWorkItem {
    type Key = StoragePoolWorkItemKey;

    fn key(&self) -> Self::Key {
        StoragePoolWorkItemKey::new(&self.pool, &self.vm)
    }
}
