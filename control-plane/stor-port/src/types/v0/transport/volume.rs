use super::*;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Type of a volume.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum VolumeType {
    /// The boot disk of a vm, always attached at device id 0.
    Root,
    Data,
    /// An attached iso image, never persisted as a volume.
    Iso,
}

impl Default for VolumeType {
    fn default() -> Self {
        Self::Data
    }
}

/// Lifecycle state of a volume.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum VolumeState {
    /// Persisted but not yet provisioned on any pool.
    Allocated,
    Creating,
    Ready,
    Snapshotting,
    Migrating,
    Resizing,
    /// Being copied to secondary storage for extraction.
    UploadOp,
    /// Imported from a url, sitting in secondary storage.
    Uploaded,
    /// Destroyed but not yet expunged, may still be recovered.
    Destroy,
    Expunging,
    Expunged,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self::Allocated
    }
}

/// Events which drive the volume state machine.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum VolumeEvent {
    CreateRequested,
    OperationSucceeded,
    OperationFailed,
    SnapshotRequested,
    MigrationRequested,
    ResizeRequested,
    ExtractRequested,
    DestroyRequested,
    ExpungingRequested,
    RecoverRequested,
}

impl VolumeState {
    /// Get the next state when `event` is applied to `self`.
    /// Returns None if the event is not allowed in the current state.
    pub fn next(&self, event: VolumeEvent) -> Option<VolumeState> {
        use VolumeEvent as E;
        use VolumeState as S;
        let next = match (self, event) {
            (S::Allocated, E::CreateRequested) => S::Creating,
            (S::Uploaded, E::CreateRequested) => S::Creating,
            (S::Creating, E::OperationSucceeded) => S::Ready,
            (S::Creating, E::OperationFailed) => S::Allocated,

            (S::Ready, E::SnapshotRequested) => S::Snapshotting,
            (S::Ready, E::MigrationRequested) => S::Migrating,
            (S::Ready, E::ResizeRequested) => S::Resizing,
            (S::Ready, E::ExtractRequested) => S::UploadOp,
            (
                S::Snapshotting | S::Migrating | S::Resizing | S::UploadOp,
                E::OperationSucceeded | E::OperationFailed,
            ) => S::Ready,

            (S::Allocated | S::Ready | S::Uploaded, E::DestroyRequested) => S::Destroy,
            (S::Destroy, E::RecoverRequested) => S::Ready,
            (S::Destroy, E::ExpungingRequested) => S::Expunging,
            (S::Expunging, E::OperationSucceeded) => S::Expunged,
            (S::Expunging, E::OperationFailed) => S::Destroy,
            _ => return None,
        };
        Some(next)
    }
    /// Check if the volume is undergoing a transient operation.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Creating
                | Self::Snapshotting
                | Self::Migrating
                | Self::Resizing
                | Self::UploadOp
                | Self::Expunging
        )
    }
    /// Check if the volume is gone or on its way to being gone.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroy | Self::Expunging | Self::Expunged)
    }
}

/// Allocate a new volume (metadata only, nothing is provisioned).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AllocateVolume {
    pub name: String,
    pub account: AccountId,
    pub domain: DomainId,
    pub zone: ZoneId,
    /// Disk offering of a fresh volume.
    pub disk_offering: Option<DiskOfferingId>,
    /// Source snapshot of a restored volume.
    pub snapshot: Option<SnapshotId>,
    /// Size in bytes, required when the offering allows custom sizes.
    pub size: Option<u64>,
    pub min_iops: Option<u64>,
    pub max_iops: Option<u64>,
    /// Whether the volume is displayed to (and billed to) the account.
    pub display: bool,
}

/// Provision an allocated or uploaded volume onto a pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateVolume {
    pub volume: VolumeId,
    /// Place the volume where this vm can reach it.
    pub vm: Option<VmId>,
    /// Pools which must not be selected.
    pub avoid: Vec<PoolId>,
}

/// Attach a volume to a vm.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttachVolume {
    pub volume: VolumeId,
    pub vm: VmId,
    /// Explicit device id, otherwise the lowest free one is picked.
    pub device_id: Option<u32>,
}

/// Detach a volume from its vm.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DetachVolume {
    pub volume: VolumeId,
}

/// Resize a volume or change its disk offering.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeVolume {
    pub volume: VolumeId,
    pub new_size: Option<u64>,
    pub new_offering: Option<DiskOfferingId>,
    pub min_iops: Option<u64>,
    pub max_iops: Option<u64>,
    /// Shrinking must be confirmed explicitly.
    pub shrink_ok: bool,
}

/// Move a volume to another pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MigrateVolume {
    pub volume: VolumeId,
    pub pool: PoolId,
    /// Migrate while the vm keeps running.
    pub live_migrate: bool,
}

/// Take a snapshot of a volume.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateVolumeSnapshot {
    pub volume: VolumeId,
    pub policy: Option<SnapshotPolicyId>,
    pub quiesce: bool,
}

/// Destroy a volume, optionally expunging it straight away.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DestroyVolume {
    pub volume: VolumeId,
    pub expunge: bool,
}

/// Recover a destroyed but not yet expunged volume.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecoverVolume {
    pub volume: VolumeId,
}

/// Register a disk image to be imported from a url.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadVolume {
    pub name: String,
    pub account: AccountId,
    pub domain: DomainId,
    pub zone: ZoneId,
    pub url: String,
    pub format: VolumeFormat,
    pub disk_offering: Option<DiskOfferingId>,
    /// Size of the image in bytes.
    pub size: u64,
}

/// Copy a volume to secondary storage and get a download url.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtractVolume {
    pub volume: VolumeId,
    pub zone: ZoneId,
}

#[cfg(test)]
mod tests {
    use super::{VolumeEvent as E, VolumeState as S};

    #[test]
    fn create_lifecycle() {
        assert_eq!(S::Allocated.next(E::CreateRequested), Some(S::Creating));
        assert_eq!(S::Creating.next(E::OperationSucceeded), Some(S::Ready));
        assert_eq!(S::Creating.next(E::OperationFailed), Some(S::Allocated));
        assert_eq!(S::Uploaded.next(E::CreateRequested), Some(S::Creating));
    }

    #[test]
    fn transient_operations_return_to_ready() {
        for (event, busy) in [
            (E::SnapshotRequested, S::Snapshotting),
            (E::MigrationRequested, S::Migrating),
            (E::ResizeRequested, S::Resizing),
            (E::ExtractRequested, S::UploadOp),
        ] {
            assert_eq!(S::Ready.next(event), Some(busy));
            assert!(busy.is_busy());
            assert_eq!(busy.next(E::OperationSucceeded), Some(S::Ready));
            assert_eq!(busy.next(E::OperationFailed), Some(S::Ready));
            // only one transient operation at a time
            assert_eq!(busy.next(event), None);
        }
    }

    #[test]
    fn destroy_and_expunge() {
        assert_eq!(S::Ready.next(E::DestroyRequested), Some(S::Destroy));
        assert_eq!(S::Destroy.next(E::RecoverRequested), Some(S::Ready));
        assert_eq!(S::Destroy.next(E::ExpungingRequested), Some(S::Expunging));
        assert_eq!(S::Expunging.next(E::OperationFailed), Some(S::Destroy));
        assert_eq!(S::Expunging.next(E::OperationSucceeded), Some(S::Expunged));
        assert_eq!(S::Expunged.next(E::RecoverRequested), None);
        assert_eq!(S::Snapshotting.next(E::DestroyRequested), None);
    }
}
