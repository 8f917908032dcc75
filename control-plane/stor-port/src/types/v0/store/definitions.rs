/// Re-export the pstor types.
pub use pstor::{
    key_prefix, key_prefix_obj, Error as StoreError, ObjectKey, StorableObject,
    StorableObjectType, Store, StoreKv, StoreObj,
};
