//! Control-plane node membership records.

use crate::{
    impl_object_key,
    types::v0::{store::definitions::StorableObject, transport::NodeId},
};
use serde::{Deserialize, Serialize};

/// A control-plane node, heartbeating its record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneNode {
    pub id: NodeId,
    pub heartbeat: chrono::DateTime<chrono::Utc>,
    /// The node missed its deadline and its work has been recovered.
    pub departed: bool,
}

impl ControlPlaneNode {
    /// Return a new `Self` with a fresh heartbeat.
    pub fn new(id: &NodeId) -> Self {
        Self {
            id: id.clone(),
            heartbeat: chrono::Utc::now(),
            departed: false,
        }
    }
    /// Check if the heartbeat is older than the deadline.
    pub fn expired(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        deadline: std::time::Duration,
    ) -> bool {
        match chrono::Duration::from_std(deadline) {
            Ok(deadline) => now - self.heartbeat > deadline,
            Err(_) => false,
        }
    }
}

impl_object_key!(ControlPlaneNodeKey, NodeId, ControlPlaneNode);

impl StorableObject for ControlPlaneNode {
    type Key = ControlPlaneNodeKey;

    fn key(&self) -> Self::Key {
        ControlPlaneNodeKey::from(&self.id)
    }
}
