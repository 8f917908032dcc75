//! Definition of vm instance types that can be saved to the persistent store.

use crate::{
    impl_object_key,
    types::v0::{
        store::definitions::StorableObject,
        transport::{AccountId, DomainId, HostId, Hypervisor, VmId, VmState, VmType, ZoneId},
    },
};
use serde::{Deserialize, Serialize};

/// A virtual machine instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VmInstance {
    pub id: VmId,
    pub name: String,
    pub vm_type: VmType,
    pub state: VmState,
    pub zone: ZoneId,
    /// The host the vm is currently running on.
    pub host: Option<HostId>,
    /// The host the vm last ran on.
    pub last_host: Option<HostId>,
    pub hypervisor: Hypervisor,
    pub account: AccountId,
    pub domain: DomainId,
}

impl VmInstance {
    /// The vm has never been started anywhere.
    pub fn never_started(&self) -> bool {
        self.host.is_none() && self.last_host.is_none()
    }
    /// The current host, or else the last known host.
    pub fn host_or_last(&self) -> Option<&HostId> {
        self.host.as_ref().or(self.last_host.as_ref())
    }
    /// Check if the vm is running.
    pub fn running(&self) -> bool {
        self.state == VmState::Running
    }
}

impl_object_key!(VmInstanceKey, VmId, VmInstance);

impl StorableObject for VmInstance {
    type Key = VmInstanceKey;

    fn key(&self) -> Self::Key {
        VmInstanceKey::from(&self.id)
    }
}
