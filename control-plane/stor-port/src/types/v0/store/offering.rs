//! Disk offerings.

use crate::{
    impl_object_key,
    types::v0::{store::definitions::StorableObject, transport::DiskOfferingId},
};
use serde::{Deserialize, Serialize};

/// Size, iops and tag constraints of a volume.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskOffering {
    pub id: DiskOfferingId,
    pub name: String,
    /// Fixed size in bytes, if not customizable.
    pub disk_size: Option<u64>,
    /// The size is chosen by the caller.
    pub custom_size: bool,
    /// The iops are chosen by the caller.
    pub custom_iops: bool,
    pub min_iops: Option<u64>,
    pub max_iops: Option<u64>,
    /// Tags which a pool must carry to host the volume.
    pub tags: Vec<String>,
    /// Place on host local storage.
    pub use_local_storage: bool,
    /// Reserved for system vm's.
    pub system_use: bool,
}

impl_object_key!(DiskOfferingKey, DiskOfferingId, DiskOffering);

impl StorableObject for DiskOffering {
    type Key = DiskOfferingKey;

    fn key(&self) -> Self::Key {
        DiskOfferingKey::from(&self.id)
    }
}
