//! Definition of volume snapshot types that can be saved to the persistent store.

use crate::{
    impl_object_key,
    types::v0::{
        store::definitions::StorableObject,
        transport::{AccountId, DomainId, SnapshotId, SnapshotPolicyId, VolumeId},
    },
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// State of a volume snapshot.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Display, AsRefStr)]
pub enum SnapshotState {
    /// Being taken on primary storage.
    Creating,
    /// Being copied to secondary storage.
    BackingUp,
    BackedUp,
    Error,
}

/// A snapshot of a volume.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VolumeSnapshot {
    pub id: SnapshotId,
    /// The volume which the snapshot was taken from.
    pub volume: VolumeId,
    pub account: AccountId,
    pub domain: DomainId,
    /// The policy which triggered the snapshot, if any.
    pub policy: Option<SnapshotPolicyId>,
    /// Size of the source volume when the snapshot was taken.
    pub size: u64,
    /// Size of the snapshot on secondary storage, once backed up.
    pub physical_size: Option<u64>,
    /// Location of the snapshot, on primary and then on secondary storage.
    pub path: Option<String>,
    pub state: SnapshotState,
    pub created: chrono::DateTime<chrono::Utc>,
}

impl VolumeSnapshot {
    /// Check if the snapshot can be used to restore a volume.
    pub fn backed_up(&self) -> bool {
        self.state == SnapshotState::BackedUp
    }
    /// Check if the snapshot is still being taken or backed up.
    pub fn in_progress(&self) -> bool {
        matches!(self.state, SnapshotState::Creating | SnapshotState::BackingUp)
    }
}

impl_object_key!(VolumeSnapshotKey, SnapshotId, VolumeSnapshot);

impl StorableObject for VolumeSnapshot {
    type Key = VolumeSnapshotKey;

    fn key(&self) -> Self::Key {
        VolumeSnapshotKey::from(&self.id)
    }
}
