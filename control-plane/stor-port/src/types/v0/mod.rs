/// Types which are saved in the persistent store.
pub mod store;
/// Types which are sent between the control-plane components and to the host agents.
pub mod transport;
