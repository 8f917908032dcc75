/// Sends command batches to the hosts attached to a pool, failing over between them.
pub(crate) mod dispatcher;
/// Per hypervisor capabilities.
pub(crate) mod hypervisor;
/// The host agent transport.
pub(crate) mod transport;
