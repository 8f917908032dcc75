use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Status of a compute host, as reported by its agent.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Display, AsRefStr)]
pub enum HostStatus {
    Up,
    Down,
    Disconnected,
    Maintenance,
    Alert,
}

impl HostStatus {
    /// Only hosts which are Up can receive commands.
    pub fn is_up(&self) -> bool {
        self == &HostStatus::Up
    }
}

/// Hypervisor running on a host.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum Hypervisor {
    Kvm,
    XenServer,
    VMware,
    Simulator,
}

/// On-disk format of a volume.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum VolumeFormat {
    Qcow2,
    Raw,
    Vhd,
    Ova,
}
