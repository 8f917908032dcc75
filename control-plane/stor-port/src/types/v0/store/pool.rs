//! Definition of pool types that can be saved to the persistent store.

use crate::{
    impl_object_key,
    types::v0::{
        store::{
            definitions::{ObjectKey, StorableObject, StorableObjectType},
            AsOperationSequencer, OperationSequence,
        },
        transport::{
            ClusterId, CreatePool, HostId, PoolId, PoolScope, PoolStatus, PoolTarget, PoolType,
            ScopeType, ZoneId,
        },
    },
};
use pstor::ApiVersion;
use serde::{Deserialize, Serialize};

/// A storage pool, as owned by the control-plane.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoragePool {
    /// id of the pool.
    pub id: PoolId,
    /// Human friendly name.
    pub name: String,
    /// The zone which the pool belongs to.
    pub zone: ZoneId,
    /// The cluster, for cluster and host scoped pools.
    pub cluster: Option<ClusterId>,
    /// The host, for host scoped pools.
    pub host: Option<HostId>,
    /// Breadth of sharing.
    pub scope: ScopeType,
    /// Type of the backend.
    pub pool_type: PoolType,
    /// Name of the storage provider.
    pub provider: String,
    /// Location of the backend.
    pub url: String,
    /// Total capacity in bytes.
    /// Owned by the capacity tracker.
    pub capacity_bytes: u64,
    /// Total capacity in iops.
    pub capacity_iops: Option<u64>,
    /// Storage tags.
    pub tags: Vec<String>,
    /// Operational status.
    pub status: PoolStatus,
    /// Overrides the configured over-provisioning factor.
    pub over_provisioning: Option<f64>,
    /// Update in progress.
    #[serde(skip)]
    pub sequencer: OperationSequence,
}

/// The provider used when none is specified.
pub const DEFAULT_POOL_PROVIDER: &str = "default";

impl From<&CreatePool> for StoragePool {
    fn from(request: &CreatePool) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            zone: request.zone.clone(),
            cluster: request.cluster.clone(),
            host: request.host.clone(),
            scope: request.scope,
            pool_type: request.pool_type,
            provider: request
                .provider
                .clone()
                .unwrap_or_else(|| DEFAULT_POOL_PROVIDER.to_string()),
            url: request.url.clone(),
            capacity_bytes: request.capacity_bytes,
            capacity_iops: request.capacity_iops,
            tags: request.tags.clone(),
            status: PoolStatus::Up,
            over_provisioning: None,
            sequencer: OperationSequence::new(request.id.as_str()),
        }
    }
}

impl StoragePool {
    /// Pool identification.
    pub fn id(&self) -> &PoolId {
        &self.id
    }
    /// The concrete scope instance of the pool.
    /// Returns None if the pool is missing the id of its scope.
    pub fn pool_scope(&self) -> Option<PoolScope> {
        match self.scope {
            ScopeType::Host => self.host.clone().map(PoolScope::Host),
            ScopeType::Cluster => self.cluster.clone().map(PoolScope::Cluster),
            ScopeType::Zone => Some(PoolScope::Zone(self.zone.clone())),
        }
    }
    /// Check if the pool is scoped to a single host.
    pub fn is_local(&self) -> bool {
        self.scope == ScopeType::Host
    }
    /// Check if the pool is shared by more than one host.
    pub fn is_shared(&self) -> bool {
        !self.is_local()
    }
    /// Check if every one of `tags` is carried by the pool.
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.tags.contains(tag))
    }
    /// Check if the pool status allows new allocations.
    pub fn is_up(&self) -> bool {
        self.status == PoolStatus::Up
    }
    /// The pool information sent with host commands.
    pub fn target(&self) -> PoolTarget {
        PoolTarget {
            id: self.id.clone(),
            pool_type: self.pool_type,
            url: self.url.clone(),
        }
    }
}

impl AsOperationSequencer for StoragePool {
    fn as_ref(&self) -> &OperationSequence {
        &self.sequencer
    }

    fn as_mut(&mut self) -> &mut OperationSequence {
        &mut self.sequencer
    }
}

impl_object_key!(StoragePoolKey, PoolId, StoragePool);

impl StorableObject for StoragePool {
    type Key = StoragePoolKey;

    fn key(&self) -> Self::Key {
        StoragePoolKey::from(&self.id)
    }
}

/// Connectivity record between a host and a pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostPoolRef {
    pub host: HostId,
    pub pool: PoolId,
    /// Where the pool is mounted on the host, if reported.
    pub local_path: Option<String>,
}

/// Key for a `HostPoolRef`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HostPoolRefKey {
    host: HostId,
    pool: PoolId,
}
impl HostPoolRefKey {
    /// Return a new `Self` for the given host and pool.
    pub fn new(host: &HostId, pool: &PoolId) -> Self {
        Self {
            host: host.clone(),
            pool: pool.clone(),
        }
    }
}

impl ObjectKey for HostPoolRefKey {
    type Kind = StorableObjectType;

    fn version(&self) -> ApiVersion {
        ApiVersion::V0
    }
    fn key_type(&self) -> StorableObjectType {
        StorableObjectType::HostPoolRef
    }
    fn key_uuid(&self) -> String {
        format!("{}/{}", self.pool, self.host)
    }
}

impl StorableObject for HostPoolRef {
    type Key = HostPoolRefKey;

    fn key(&self) -> Self::Key {
        HostPoolRefKey::new(&self.host, &self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(scope: ScopeType) -> StoragePool {
        StoragePool::from(&CreatePool {
            id: "p1".into(),
            name: "p1".into(),
            zone: "z1".into(),
            cluster: Some("c1".into()),
            host: Some("h1".into()),
            scope,
            pool_type: PoolType::NetworkFilesystem,
            provider: None,
            capacity_bytes: 100,
            capacity_iops: None,
            tags: vec!["ssd".into(), "fast".into()],
            url: "nfs://server/export".into(),
        })
    }

    #[test]
    fn scope_instance() {
        assert_eq!(
            pool(ScopeType::Cluster).pool_scope(),
            Some(PoolScope::Cluster("c1".into()))
        );
        assert_eq!(
            pool(ScopeType::Zone).pool_scope(),
            Some(PoolScope::Zone("z1".into()))
        );
        assert!(pool(ScopeType::Host).is_local());
    }

    #[test]
    fn tags_subset() {
        let pool = pool(ScopeType::Cluster);
        assert!(pool.has_tags(&[]));
        assert!(pool.has_tags(&["ssd".into()]));
        assert!(!pool.has_tags(&["ssd".into(), "hdd".into()]));
    }
}
