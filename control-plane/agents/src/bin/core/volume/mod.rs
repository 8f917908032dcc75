mod attach;
mod operations;
/// Volume administration.
pub(crate) mod service;
mod snapshot;
mod transfer;

pub(crate) use attach::{attach_volume, detach_volume};
pub(crate) use operations::{migrate_volume, resize_volume};
pub(crate) use snapshot::snapshot_volume;
pub(crate) use transfer::extract_volume;

use crate::controller::{
    registry::Registry,
    resources::{operations_helper::OperationSequenceGuard, OperationGuardArc},
    scheduling::pool::DeploymentContext,
};
use agents::errors::SvcError;
use std::collections::BTreeSet;
use stor_port::types::v0::{
    store::{host::Host, pool::StoragePool, vm::VmInstance, volume::VolumeSpec},
    transport::{VolumeId, ZoneId},
};

/// Get the guarded volume for the given volume `id`.
pub(crate) async fn volume_guard(
    registry: &Registry,
    id: &VolumeId,
) -> Result<OperationGuardArc<VolumeSpec>, SvcError> {
    registry.specs().volume_rsc(id)?.operation_guard_wait().await
}

fn invalid_state(volume: &VolumeSpec, operation: &str) -> SvcError {
    SvcError::InvalidVolumeState {
        vol_id: volume.id.clone(),
        state: volume.state,
        operation: operation.to_string(),
    }
}

/// The pool backing a provisioned volume.
fn volume_pool(registry: &Registry, volume: &VolumeSpec) -> Result<StoragePool, SvcError> {
    match &volume.pool {
        Some(pool) => registry.specs().pool(pool),
        None => Err(SvcError::InvalidVolumeState {
            vol_id: volume.id.clone(),
            state: volume.state,
            operation: "use a pool".to_string(),
        }),
    }
}

/// The host the vm runs on, or else the host it last ran on.
fn vm_host(registry: &Registry, vm: &VmInstance) -> Option<Host> {
    vm.host_or_last()
        .and_then(|host| registry.specs().host(host).ok())
}

/// Where a volume may be placed: next to the vm's host when it has one, otherwise in any
/// cluster of the zone, and the zone itself when it has no clusters.
pub(crate) fn deployments(
    registry: &Registry,
    zone: &ZoneId,
    vm: Option<&VmInstance>,
) -> Vec<DeploymentContext> {
    if let Some(host) = vm.and_then(|vm| vm_host(registry, vm)) {
        return vec![DeploymentContext {
            zone: zone.clone(),
            cluster: Some(host.cluster),
            host: Some(host.id),
        }];
    }
    let clusters = registry
        .specs()
        .hosts()
        .into_iter()
        .filter(|host| &host.zone == zone)
        .map(|host| host.cluster)
        .collect::<BTreeSet<_>>();
    if clusters.is_empty() {
        return vec![DeploymentContext::zone(zone)];
    }
    clusters
        .iter()
        .map(|cluster| DeploymentContext::cluster(zone, cluster))
        .collect()
}

/// Any Up host of the zone, used for the secondary storage commands.
fn zone_host(registry: &Registry, zone: &ZoneId) -> Option<Host> {
    registry
        .specs()
        .hosts()
        .into_iter()
        .find(|host| &host.zone == zone && host.is_up())
}
