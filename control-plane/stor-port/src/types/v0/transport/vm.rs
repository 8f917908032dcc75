use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Type of a virtual machine instance.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum VmType {
    User,
    ConsoleProxy,
    SecondaryStorageVm,
    DomainRouter,
}

impl VmType {
    /// System vm's are owned by the platform rather than by an account.
    pub fn is_system(&self) -> bool {
        !matches!(self, Self::User)
    }
}

/// Lifecycle state of a virtual machine instance.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
pub enum VmState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Migrating,
    Error,
    Destroyed,
    Expunging,
}

impl VmState {
    /// States in which a vm holds its volumes open and must be stopped before
    /// the storage underneath it can go away.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Starting | Self::Stopping)
    }
    /// The vm no longer exists or is on its way out.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Destroyed | Self::Expunging)
    }
}
