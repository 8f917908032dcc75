use super::*;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Type of the storage backend of a pool.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum PoolType {
    /// A network filesystem export (eg: nfs), the only type which is over-provisioned.
    NetworkFilesystem,
    /// A filesystem on a host's local disk.
    Filesystem,
    Iscsi,
    SharedMountPoint,
    Rbd,
    Lvm,
    /// A raw local device.
    Local,
}

impl PoolType {
    /// Check if the pool is a network filesystem backed pool.
    pub fn is_network_filesystem(&self) -> bool {
        self == &Self::NetworkFilesystem
    }
    /// Check if the pool type is only reachable from a single host.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Filesystem | Self::Local)
    }
}

/// The breadth of sharing of a pool.
/// Ordered from the narrowest to the broadest scope.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    AsRefStr,
    EnumString,
)]
pub enum ScopeType {
    Host,
    Cluster,
    Zone,
}

/// A concrete scope instance.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash)]
pub enum PoolScope {
    Host(HostId),
    Cluster(ClusterId),
    Zone(ZoneId),
}
impl PoolScope {
    /// Get the type of the scope.
    pub fn scope_type(&self) -> ScopeType {
        match self {
            PoolScope::Host(_) => ScopeType::Host,
            PoolScope::Cluster(_) => ScopeType::Cluster,
            PoolScope::Zone(_) => ScopeType::Zone,
        }
    }
}

/// Operational status of a storage pool.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum PoolStatus {
    Up,
    Maintenance,
    PrepareForMaintenance,
    ErrorInMaintenance,
    CancelMaintenance,
    Disabled,
}
impl Default for PoolStatus {
    fn default() -> Self {
        Self::Up
    }
}
impl PoolStatus {
    /// Is the pool undergoing (or stuck in) a maintenance transition.
    pub fn in_maintenance_transition(&self) -> bool {
        matches!(
            self,
            Self::PrepareForMaintenance | Self::ErrorInMaintenance | Self::CancelMaintenance
        )
    }
}

/// Create a storage pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreatePool {
    /// Id of the pool.
    pub id: PoolId,
    /// Human friendly name.
    pub name: String,
    /// The zone which the pool belongs to.
    pub zone: ZoneId,
    /// The cluster for cluster and host scoped pools.
    pub cluster: Option<ClusterId>,
    /// The host for host scoped pools.
    pub host: Option<HostId>,
    /// The scope of the pool.
    pub scope: ScopeType,
    /// Backend type.
    pub pool_type: PoolType,
    /// Name of the storage provider, which selects the host listener.
    pub provider: Option<String>,
    /// Total capacity in bytes.
    pub capacity_bytes: u64,
    /// Total capacity in iops.
    pub capacity_iops: Option<u64>,
    /// Storage tags.
    pub tags: Vec<String>,
    /// Location of the backend (eg: `nfs://server/export`).
    pub url: String,
}

/// Update a storage pool's mutable attributes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UpdatePool {
    pub id: PoolId,
    pub tags: Option<Vec<String>>,
    pub capacity_bytes: Option<u64>,
    pub capacity_iops: Option<u64>,
    /// Overrides the global over-provisioning factor for this pool.
    pub over_provisioning: Option<f64>,
}

/// Delete a storage pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeletePool {
    pub id: PoolId,
    /// Tolerate volumes which are destroyed but not yet expunged.
    pub forced: bool,
}

/// Enable or disable a storage pool for allocation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SetPoolEnabled {
    pub id: PoolId,
    pub enabled: bool,
}

/// Put a storage pool into maintenance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PrepareMaintenance {
    pub id: PoolId,
}

/// Take a storage pool out of maintenance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CancelMaintenance {
    pub id: PoolId,
}

/// Capacity statistics of a pool, as reported by a host.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub capacity_bytes: u64,
    pub used_bytes: u64,
}
