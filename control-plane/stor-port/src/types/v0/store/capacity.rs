//! Per pool capacity rows.

use crate::types::v0::{
    store::definitions::{ObjectKey, StorableObject, StorableObjectType},
    transport::PoolId,
};
use pstor::ApiVersion;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Kind of capacity tracked for a pool.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr)]
pub enum CapacityKind {
    /// Bytes in use on the backend, from the stats samples.
    StorageUsed,
    /// Bytes promised to volumes placed on the pool.
    StorageAllocated,
}

/// A capacity row of a pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CapacityRecord {
    pub pool: PoolId,
    pub kind: CapacityKind,
    /// Used or allocated bytes, depending on the kind.
    pub used: u64,
    /// Total bytes, over-provisioned for the allocated kind of network filesystem pools.
    pub total: u64,
}

/// Key for a `CapacityRecord`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CapacityRecordKey {
    pool: PoolId,
    kind: CapacityKind,
}
impl CapacityRecordKey {
    /// Return a new `Self` for the given pool and kind.
    pub fn new(pool: &PoolId, kind: CapacityKind) -> Self {
        Self {
            pool: pool.clone(),
            kind,
        }
    }
}

impl ObjectKey for CapacityRecordKey {
    type Kind = StorableObjectType;

    fn version(&self) -> ApiVersion {
        ApiVersion::V0
    }
    fn key_type(&self) -> StorableObjectType {
        StorableObjectType::CapacityRecord
    }
    fn key_uuid(&self) -> String {
        format!("{}/{}", self.pool, self.kind)
    }
}

impl StorableObject for CapacityRecord {
    type Key = CapacityRecordKey;

    fn key(&self) -> Self::Key {
        CapacityRecordKey::new(&self.pool, self.kind)
    }
}
