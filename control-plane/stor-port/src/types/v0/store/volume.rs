//! Definition of volume types that can be saved to the persistent store.

use crate::{
    impl_object_key,
    types::v0::{
        store::{
            definitions::StorableObject,
            AsOperationSequencer, OperationSequence,
        },
        transport::{
            AccountId, DiskOfferingId, DomainId, PoolId, SnapshotId, TemplateId, VmId,
            VolumeEvent, VolumeFormat, VolumeId, VolumeState, VolumeTarget, VolumeType, ZoneId,
        },
    },
};
use serde::{Deserialize, Serialize};

/// A volume (virtual disk), as owned by the control-plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VolumeSpec {
    /// Id of the volume.
    pub id: VolumeId,
    pub name: String,
    pub volume_type: VolumeType,
    /// Size in bytes.
    pub size: u64,
    pub min_iops: Option<u64>,
    pub max_iops: Option<u64>,
    pub account: AccountId,
    pub domain: DomainId,
    pub zone: ZoneId,
    /// The pool backing the volume, once provisioned.
    pub pool: Option<PoolId>,
    /// The vm which the volume is attached to.
    pub vm: Option<VmId>,
    /// Device id in the vm's numbering space, while attached.
    pub device_id: Option<u32>,
    pub disk_offering: Option<DiskOfferingId>,
    /// Template which a root volume is cloned from.
    pub template: Option<TemplateId>,
    /// Snapshot which the volume is restored from.
    pub snapshot: Option<SnapshotId>,
    /// Url of an uploaded image.
    pub url: Option<String>,
    pub format: Option<VolumeFormat>,
    /// Path of the volume on its pool.
    pub path: Option<String>,
    /// Displayed to the account (and emits usage events).
    pub display: bool,
    /// Owned by the platform rather than by an account.
    pub system: bool,
    /// Lifecycle state.
    pub state: VolumeState,
    /// The resource counters were released by a failed create.
    #[serde(default)]
    pub uncounted: bool,
    /// Update in progress.
    #[serde(skip)]
    pub sequencer: OperationSequence,
}

impl VolumeSpec {
    /// Volume identification.
    pub fn id(&self) -> &VolumeId {
        &self.id
    }
    /// Check if the volume is attached to a vm.
    pub fn attached(&self) -> bool {
        self.vm.is_some()
    }
    /// Check if the volume is attached to the given vm.
    pub fn attached_to(&self, vm: &VmId) -> bool {
        self.vm.as_ref() == Some(vm)
    }
    /// Check if the volume is a root disk.
    pub fn is_root(&self) -> bool {
        self.volume_type == VolumeType::Root
    }
    /// Check if the volume has been provisioned on a pool.
    pub fn provisioned(&self) -> bool {
        self.pool.is_some() && !matches!(self.state, VolumeState::Allocated)
    }
    /// Apply the event to the state machine.
    /// Returns the previous state, or None if the event is not allowed.
    pub fn transition(&mut self, event: VolumeEvent) -> Option<VolumeState> {
        let next = self.state.next(event)?;
        let previous = self.state;
        self.state = next;
        Some(previous)
    }
    /// The volume information sent with host commands.
    pub fn target(&self) -> VolumeTarget {
        VolumeTarget {
            id: self.id.clone(),
            size: self.size,
            path: self.path.clone(),
            format: self.format,
            min_iops: self.min_iops,
            max_iops: self.max_iops,
        }
    }
}

impl AsOperationSequencer for VolumeSpec {
    fn as_ref(&self) -> &OperationSequence {
        &self.sequencer
    }

    fn as_mut(&mut self) -> &mut OperationSequence {
        &mut self.sequencer
    }
}

impl_object_key!(VolumeSpecKey, VolumeId, Volume);

impl StorableObject for VolumeSpec {
    type Key = VolumeSpecKey;

    fn key(&self) -> Self::Key {
        VolumeSpecKey::from(&self.id)
    }
}
