//! Queued per-vm work.

use crate::{
    impl_object_key,
    types::v0::{
        store::definitions::StorableObject,
        transport::{JobId, NodeId, VmId},
    },
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Status of a vm work job.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Display, AsRefStr)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// A queued unit of work bound to one vm.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VmWorkJob {
    pub id: JobId,
    pub vm: VmId,
    /// The service which dispatches the job.
    pub dispatcher: String,
    /// The operation which handles the payload.
    pub handler: String,
    /// The requested operation and its original parameters.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// The serialized result, once succeeded.
    pub result: Option<serde_json::Value>,
    /// The error, once failed.
    pub error: Option<String>,
    /// The control-plane node executing the job.
    pub owner: NodeId,
    pub created: chrono::DateTime<chrono::Utc>,
}

impl VmWorkJob {
    /// Check if the job has completed, one way or another.
    pub fn completed(&self) -> bool {
        self.status != JobStatus::InProgress
    }
}

impl_object_key!(VmWorkJobKey, JobId, VmWorkJob);

impl StorableObject for VmWorkJob {
    type Key = VmWorkJobKey;

    fn key(&self) -> Self::Key {
        VmWorkJobKey::from(&self.id)
    }
}
