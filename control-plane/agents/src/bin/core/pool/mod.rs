/// Provider specific host connection of pools.
pub(crate) mod listener;
/// Pool maintenance state machine.
pub(crate) mod maintenance;
mod pool_operations;
/// Storage pool administration.
pub(crate) mod service;

use crate::controller::registry::Registry;
use stor_port::types::v0::{
    store::{host::Host, pool::StoragePool},
    transport::ScopeType,
};

/// The Up hosts within the scope of the pool.
pub(crate) fn scope_hosts(registry: &Registry, pool: &StoragePool) -> Vec<Host> {
    registry
        .specs()
        .hosts()
        .into_iter()
        .filter(Host::is_up)
        .filter(|host| match pool.scope {
            ScopeType::Host => pool.host.as_ref() == Some(&host.id),
            ScopeType::Cluster => pool.cluster.as_ref() == Some(&host.cluster),
            ScopeType::Zone => host.zone == pool.zone,
        })
        .collect()
}
