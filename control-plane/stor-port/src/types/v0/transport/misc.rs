use serde::{Deserialize, Serialize};

#[macro_export]
macro_rules! impl_string_id_inner {
    ($Name:ident, $Doc:literal) => {
        #[doc = $Doc]
        #[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $Name(String);

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl $Name {
            /// Get the id as a string slice.
            pub fn as_str<'a>(&'a self) -> &'a str {
                self.0.as_str()
            }
        }

        impl From<&str> for $Name {
            fn from(id: &str) -> Self {
                $Name::from(id)
            }
        }
        impl From<String> for $Name {
            fn from(id: String) -> Self {
                $Name::from(id.as_str())
            }
        }
        impl From<&$Name> for $Name {
            fn from(id: &$Name) -> $Name {
                id.clone()
            }
        }
        impl From<$Name> for String {
            fn from(id: $Name) -> String {
                id.to_string()
            }
        }
    };
}

#[macro_export]
macro_rules! impl_string_id {
    ($Name:ident, $Doc:literal) => {
        impl_string_id_inner!($Name, $Doc);
        impl Default for $Name {
            /// Generates new blank identifier.
            fn default() -> Self {
                $Name(uuid::Uuid::default().to_string())
            }
        }
        impl $Name {
            /// Build Self from a string trait id.
            pub fn from<T: Into<String>>(id: T) -> Self {
                $Name(id.into())
            }
            /// Generates new random identifier.
            pub fn new() -> Self {
                $Name(uuid::Uuid::new_v4().to_string())
            }
        }
    };
}

impl_string_id!(ZoneId, "ID of a zone (availability zone / data center)");
impl_string_id!(ClusterId, "ID of a cluster of hosts");
impl_string_id!(HostId, "ID of a compute host");
impl_string_id!(PoolId, "ID of a storage pool");
impl_string_id!(VolumeId, "ID of a volume");
impl_string_id!(VmId, "ID of a virtual machine instance");
impl_string_id!(SnapshotId, "ID of a volume snapshot");
impl_string_id!(SnapshotPolicyId, "ID of a snapshot policy");
impl_string_id!(TemplateId, "ID of a template");
impl_string_id!(DiskOfferingId, "ID of a disk offering");
impl_string_id!(AccountId, "ID of an account");
impl_string_id!(DomainId, "ID of a domain");
impl_string_id!(JobId, "ID of a vm work job");
impl_string_id!(NodeId, "ID of a control-plane node");
