//! The persistent stor is an interface to a datastore which suits the projects needs.
//! We may have various implementations, depending on where we're running.

/// Error exposed by the pstor.
pub mod error;
/// Export error module.
pub use error::Error;

/// The stor interface.
mod api;
/// Export pstor module.
pub use api::{
    ObjectKey, StorableObject, Store, StoreKey, StoreKv, StoreObj, StoreValue, StoreWatchReceiver,
    WatchEvent,
};

mod common;
pub use common::{generate_key, key_prefix, key_prefix_obj, ApiVersion, StorableObjectType};

/// A particular implementation of the persistent store, kept in memory.
pub mod memory;
