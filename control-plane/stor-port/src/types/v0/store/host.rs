//! Definition of compute host types that can be saved to the persistent store.

use crate::{
    impl_object_key,
    types::v0::{
        store::definitions::StorableObject,
        transport::{ClusterId, HostId, HostStatus, Hypervisor, ZoneId},
    },
};
use serde::{Deserialize, Serialize};

/// A compute host running a hypervisor and a host agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    /// Base url of the host agent.
    pub endpoint: String,
    pub zone: ZoneId,
    pub cluster: ClusterId,
    pub hypervisor: Hypervisor,
    pub status: HostStatus,
}

impl Host {
    /// Check if the host can receive commands.
    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

impl_object_key!(HostKey, HostId, Host);

impl StorableObject for Host {
    type Key = HostKey;

    fn key(&self) -> Self::Key {
        HostKey::from(&self.id)
    }
}
