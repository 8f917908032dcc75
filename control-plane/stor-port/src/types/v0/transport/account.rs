use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The kinds of resources which are counted (and limited) per account.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash, Display, AsRefStr, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Number of volumes.
    Volume,
    /// Bytes of primary storage.
    PrimaryStorage,
    /// Bytes of secondary storage.
    SecondaryStorage,
}
