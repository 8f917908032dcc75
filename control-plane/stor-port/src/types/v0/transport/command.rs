//! The abstract Command/Answer contract used to talk to the host agents.
//! The encoding of a command for a particular hypervisor is the agent's business.

use super::*;

use serde::{Deserialize, Serialize};

/// Pool information carried by a command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PoolTarget {
    pub id: PoolId,
    pub pool_type: PoolType,
    pub url: String,
}

/// Volume information carried by a command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VolumeTarget {
    pub id: VolumeId,
    pub size: u64,
    /// Path of the volume on its pool, once provisioned.
    pub path: Option<String>,
    pub format: Option<VolumeFormat>,
    pub min_iops: Option<u64>,
    pub max_iops: Option<u64>,
}

/// A command sent to a host agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, strum_macros::AsRefStr)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Connect (add) or disconnect the host to/from a pool.
    ModifyStoragePool { add: bool, pool: PoolTarget },
    /// Enable or disable the host's storage heartbeat on a pool.
    StoragePoolHeartbeat { enable: bool, pool: PoolTarget },
    GetStorageStats { pool: PoolTarget },
    /// Provision a blank volume, or a clone of a template.
    CreateVolume {
        volume: VolumeTarget,
        pool: PoolTarget,
        template: Option<TemplateId>,
    },
    CreateVolumeFromSnapshot {
        volume: VolumeTarget,
        pool: PoolTarget,
        snapshot_path: String,
    },
    /// Import an uploaded image from secondary storage onto a pool.
    CopyVolumeFromSecondary {
        volume: VolumeTarget,
        pool: PoolTarget,
        url: String,
    },
    DestroyVolume { volume: VolumeTarget, pool: PoolTarget },
    AttachVolume {
        volume: VolumeTarget,
        pool: PoolTarget,
        vm: VmId,
        device_id: u32,
    },
    DetachVolume {
        volume: VolumeTarget,
        pool: PoolTarget,
        vm: VmId,
        device_id: Option<u32>,
    },
    ResizeVolume {
        volume: VolumeTarget,
        pool: PoolTarget,
        vm: Option<VmId>,
        new_size: u64,
        shrink_ok: bool,
    },
    /// Offline copy of a volume between pools.
    CopyVolume {
        volume: VolumeTarget,
        source: PoolTarget,
        destination: PoolTarget,
    },
    /// Live storage motion of a running vm's volume.
    MigrateVolume {
        volume: VolumeTarget,
        destination: PoolTarget,
        vm: VmId,
    },
    TakeSnapshot {
        volume: VolumeTarget,
        pool: PoolTarget,
        snapshot: SnapshotId,
        quiesce: bool,
    },
    BackupSnapshot {
        snapshot: SnapshotId,
        snapshot_path: String,
        pool: PoolTarget,
    },
    DeleteFromSecondary { volume: VolumeId },
    DeleteFromCache { volume: VolumeId },
    CopyVolumeToSecondary { volume: VolumeTarget, pool: PoolTarget },
    StopVm { vm: VmId, forced: bool },
    StartVm { vm: VmId },
}

impl Command {
    /// Name of the command, for logging.
    pub fn name(&self) -> &str {
        self.as_ref()
    }
}

/// The answer returned by a host agent for a command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "answer", rename_all = "snake_case")]
pub enum Answer {
    /// The command succeeded and carries no data.
    Success,
    /// The agent executed the command and it failed.
    Failure { details: String },
    StorageStats { stats: StorageStats },
    /// A volume was provisioned at `path`.
    VolumeCreated { path: String, size: u64 },
    /// A volume was copied; `path` is the new location (or a download url).
    Copied { path: String },
    Snapshot { path: String, size: u64 },
}

impl Answer {
    /// Check if the answer represents a successful command.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }
    /// Get the failure details, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failure { details } => Some(details.as_str()),
            _ => None,
        }
    }
}
