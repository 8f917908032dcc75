//! Attach and detach of volumes.
//!
//! Device ids live in the vm's numbering space: the root volume sits at 0, data volumes take
//! the lowest free id of 1 to 15, and 3 is reserved.
use super::{invalid_state, vm_host, volume_guard, volume_pool};
use crate::{
    capacity::CapacityTracker,
    controller::{
        registry::Registry,
        resources::{OperationGuardArc, TraceStrLog},
    },
    host::dispatcher::CommandDispatcher,
};
use agents::errors::SvcError;
use std::collections::HashSet;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::{host::Host, pool::StoragePool, vm::VmInstance, volume::VolumeSpec},
        transport::{
            AttachVolume, Command, DetachVolume, ScopeType, VmId, VolumeState, VolumeType,
        },
    },
};

const ROOT_DEVICE_ID: u32 = 0;
const RESERVED_DEVICE_ID: u32 = 3;
const MAX_DEVICE_ID: u32 = 15;

/// Pick the device id of the volume on the vm, given the volumes already attached to it.
pub(crate) fn allocate_device_id(
    vm: &VmId,
    volume: &VolumeSpec,
    attached: &[VolumeSpec],
    requested: Option<u32>,
    max_data_volumes: usize,
) -> Result<u32, SvcError> {
    if volume.is_root() {
        if attached.iter().any(VolumeSpec::is_root) {
            return Err(SvcError::DeviceIdInUse {
                vm_id: vm.clone(),
                device_id: ROOT_DEVICE_ID,
            });
        }
        return match requested {
            None | Some(ROOT_DEVICE_ID) => Ok(ROOT_DEVICE_ID),
            Some(device_id) => Err(SvcError::InvalidDeviceId { device_id }),
        };
    }

    let data_volumes = attached.iter().filter(|volume| !volume.is_root()).count();
    if data_volumes >= max_data_volumes {
        return Err(SvcError::MaxDataVolumes {
            vm_id: vm.clone(),
            max: max_data_volumes,
        });
    }
    let used = attached
        .iter()
        .filter_map(|volume| volume.device_id)
        .collect::<HashSet<_>>();
    match requested {
        Some(device_id)
            if device_id == ROOT_DEVICE_ID
                || device_id == RESERVED_DEVICE_ID
                || device_id > MAX_DEVICE_ID =>
        {
            Err(SvcError::InvalidDeviceId { device_id })
        }
        Some(device_id) if used.contains(&device_id) => Err(SvcError::DeviceIdInUse {
            vm_id: vm.clone(),
            device_id,
        }),
        Some(device_id) => Ok(device_id),
        None => (1 ..= MAX_DEVICE_ID)
            .filter(|id| *id != RESERVED_DEVICE_ID)
            .find(|id| !used.contains(id))
            .ok_or_else(|| SvcError::NoFreeDeviceId { vm_id: vm.clone() }),
    }
}

/// Whether a volume on `pool` must move to be used by a vm whose reference volume is on
/// `reference`.
/// Pools of the same scope type must be the same scope instance. A broader pool never needs to
/// move while a narrower one has to, unless its scope contains the vm's host.
pub(crate) fn needs_move(reference: &StoragePool, pool: &StoragePool, host: Option<&Host>) -> bool {
    if reference.scope == pool.scope {
        return reference.pool_scope() != pool.pool_scope();
    }
    if pool.scope > reference.scope {
        return false;
    }
    let reachable = match (pool.scope, host) {
        (ScopeType::Host, Some(host)) => pool.host.as_ref() == Some(&host.id),
        (ScopeType::Cluster, Some(host)) => pool.cluster.as_ref() == Some(&host.cluster),
        (ScopeType::Zone, _) => true,
        (_, None) => false,
    };
    !reachable
}

/// The pool a volume must move to before being attached to the vm, if any.
fn move_destination(
    registry: &Registry,
    vm: &VmInstance,
    volume: &VolumeSpec,
    attached: &[VolumeSpec],
) -> Result<Option<StoragePool>, SvcError> {
    let reference = attached
        .iter()
        .filter(|other| other.pool.is_some())
        .min_by_key(|other| !other.is_root());
    let reference = match reference {
        Some(reference) => volume_pool(registry, reference)?,
        None => return Ok(None),
    };
    let pool = volume_pool(registry, volume)?;
    if !needs_move(&reference, &pool, vm_host(registry, vm).as_ref()) {
        return Ok(None);
    }
    if reference.is_local() {
        return Err(SvcError::LocalStorageMove {
            vol_id: volume.id.clone(),
            pool_id: reference.id,
        });
    }
    let capacity = CapacityTracker::new(registry);
    let allocated = capacity.allocated_bytes(&reference.id);
    if !reference.is_up()
        || !capacity.has_used_space(&reference)
        || !capacity.has_allocated_space(&reference, allocated, volume.size)
    {
        return Err(SvcError::NoSuitablePool {
            vol_id: volume.id.clone(),
        });
    }
    Ok(Some(reference))
}

/// Attach a volume to a vm, creating or moving it first when needed.
#[tracing::instrument(
    level = "info",
    skip(registry),
    err,
    fields(volume.id = %request.volume, vm.id = %request.vm)
)]
pub(crate) async fn attach_volume(
    registry: &Registry,
    request: &AttachVolume,
) -> Result<VolumeSpec, SvcError> {
    let specs = registry.specs();
    let vm = specs.vm(&request.vm)?;
    if vm.state.is_gone() {
        return Err(SvcError::VmNotFound {
            vm_id: vm.id.clone(),
        });
    }
    let mut guard = volume_guard(registry, &request.volume).await?;
    let volume = guard.lock().clone();
    if let Some(other) = &volume.vm {
        return Err(SvcError::AlreadyAttached {
            vol_id: volume.id.clone(),
            vm_id: other.clone(),
        });
    }
    if volume.state.is_destroyed() || volume.state.is_busy() {
        return Err(invalid_state(&volume, "attach"));
    }
    let incompatible = |reason: String| SvcError::IncompatibleVolume {
        vol_id: volume.id.clone(),
        reason,
    };
    if volume.volume_type == VolumeType::Iso {
        return Err(incompatible("iso images are not attached as volumes".into()));
    }
    if volume.zone != vm.zone {
        return Err(incompatible(format!("the vm is in zone {}", vm.zone)));
    }
    let capabilities = registry
        .hypervisors()
        .get(vm.hypervisor)
        .ok_or_else(|| incompatible(format!("unknown hypervisor {}", vm.hypervisor)))?;
    if let Some(format) = volume.format {
        if !capabilities.supports(format) {
            return Err(incompatible(format!(
                "{} does not support the {format} format",
                vm.hypervisor
            )));
        }
    }
    let attached = specs
        .vm_volumes(&vm.id)
        .into_iter()
        .filter(|other| other.id != volume.id && !other.state.is_destroyed())
        .collect::<Vec<_>>();
    let device_id = allocate_device_id(
        &vm.id,
        &volume,
        &attached,
        request.device_id,
        capabilities.max_data_volumes,
    )?;

    let placed = match volume.state {
        VolumeState::Allocated | VolumeState::Uploaded => {
            guard.provision(registry, Some(&vm), &[]).await?;
            Some("create")
        }
        VolumeState::Ready => match move_destination(registry, &vm, &volume, &attached)? {
            Some(destination) => {
                guard.relocate(registry, &destination).await?;
                Some("move")
            }
            None => None,
        },
        _ => return Err(invalid_state(&volume, "attach")),
    };

    match send_attach(registry, &guard, &vm, device_id).await {
        Ok(()) => {}
        Err(error) => {
            return Err(match placed {
                Some(completed) => SvcError::PartialFailure {
                    operation: "attach".to_string(),
                    completed: completed.to_string(),
                    step: "attach".to_string(),
                    reason: error.full_string(),
                },
                None => error,
            })
        }
    }
    let attached = guard
        .modify(registry, |volume| {
            volume.vm = Some(vm.id.clone());
            volume.device_id = Some(device_id);
        })
        .await?;
    guard.info(&format!("Attached volume to vm '{}' as device {device_id}", vm.id));
    Ok(attached)
}

/// Tell the vm's host about the new volume. A vm which is not running on any host picks the
/// volume up when it starts.
async fn send_attach(
    registry: &Registry,
    guard: &OperationGuardArc<VolumeSpec>,
    vm: &VmInstance,
    device_id: u32,
) -> Result<(), SvcError> {
    let host = match &vm.host {
        Some(host) => host,
        None => return Ok(()),
    };
    let volume = guard.lock().clone();
    let pool = volume_pool(registry, &volume)?;
    let command = Command::AttachVolume {
        volume: volume.target(),
        pool: pool.target(),
        vm: vm.id.clone(),
        device_id,
    };
    CommandDispatcher::new(registry)
        .send_to_host(host, vec![command])
        .await?;
    Ok(())
}

/// Detach a volume from its vm.
#[tracing::instrument(level = "info", skip(registry), err, fields(volume.id = %request.volume))]
pub(crate) async fn detach_volume(
    registry: &Registry,
    request: &DetachVolume,
) -> Result<VolumeSpec, SvcError> {
    let mut guard = volume_guard(registry, &request.volume).await?;
    let volume = guard.lock().clone();
    let vm_id = volume.vm.clone().ok_or_else(|| SvcError::NotAttached {
        vol_id: volume.id.clone(),
    })?;
    let vm = registry.specs().vm(&vm_id).ok();

    if let Some(vm) = vm.as_ref().filter(|vm| vm.running()) {
        if volume.is_root() {
            return Err(SvcError::InvalidArguments {
                message: format!(
                    "root volume '{}' can only be detached from a stopped vm",
                    volume.id
                ),
            });
        }
        if let Some(host) = &vm.host {
            let pool = volume_pool(registry, &volume)?;
            let command = Command::DetachVolume {
                volume: volume.target(),
                pool: pool.target(),
                vm: vm.id.clone(),
                device_id: volume.device_id,
            };
            CommandDispatcher::new(registry)
                .send_to_host(host, vec![command])
                .await?;
        }
    }

    let detached = guard
        .modify(registry, |volume| {
            volume.vm = None;
            volume.device_id = None;
        })
        .await?;
    guard.info(&format!("Detached volume from vm '{vm_id}'"));
    Ok(detached)
}
