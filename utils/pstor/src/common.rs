use crate::api::ObjectKey;
use strum_macros::{AsRefStr, Display, EnumString};

/// All types of objects which are storable in our store.
#[derive(Display, AsRefStr, Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorableObjectType {
    StoragePool,
    HostPoolRef,
    Volume,
    VolumeSnapshot,
    StoragePoolWorkItem,
    CapacityRecord,
    VmWorkJob,
    Host,
    VmInstance,
    DiskOffering,
    ControlPlaneNode,
}

/// Control plane api versions.
#[derive(EnumString, Display, Copy, Clone, Debug)]
#[strum(serialize_all = "lowercase")]
pub enum ApiVersion {
    V0,
}

/// Prefix for all keys stored in the persistent store.
const KEY_PREFIX: &str = "/storage-orchestrator";

/// Returns the key prefix that is used for the keys of the given api version.
pub fn key_prefix(api_version: ApiVersion) -> String {
    format!("{KEY_PREFIX}/apis/{api_version}")
}

/// Returns the control plane prefix that should be used for the keys, in conjunction
/// with a `StorableObjectType` type.
pub fn key_prefix_obj<K: AsRef<str>>(key_type: K, api_version: ApiVersion) -> String {
    format!("{}/{}", key_prefix(api_version), key_type.as_ref())
}

/// Create a key based on the object's key trait.
pub fn generate_key<K: ObjectKey + ?Sized>(k: &K) -> String {
    format!(
        "{}/{}",
        key_prefix_obj(k.key_type(), k.version()),
        k.key_uuid()
    )
}
