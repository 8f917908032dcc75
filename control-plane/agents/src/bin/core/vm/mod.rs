//! Stop and start of virtual machines, as used by the pool maintenance.
//! Every vm type uses the same primitives.
use crate::{
    controller::registry::Registry,
    host::dispatcher::CommandDispatcher,
    vm_work::{VmWork, VmWorkQueue},
};
use agents::errors::SvcError;
use stor_port::{
    transport_api::ResourceKind,
    types::v0::{
        store::vm::VmInstance,
        transport::{Command, HostId, VmId, VmState},
    },
};

/// Stop the vm through its work queue.
pub(crate) async fn stop(
    registry: &Registry,
    vm: &VmId,
    forced: bool,
) -> Result<VmInstance, SvcError> {
    VmWorkQueue::run(
        registry,
        vm,
        VmWork::StopVm {
            vm: vm.clone(),
            forced,
        },
    )
    .await
}

/// Start the vm through its work queue.
pub(crate) async fn start(registry: &Registry, vm: &VmId) -> Result<VmInstance, SvcError> {
    VmWorkQueue::run(registry, vm, VmWork::StartVm { vm: vm.clone() }).await
}

/// Stop the vm on its current host.
#[tracing::instrument(level = "info", skip(registry), err, fields(vm.id = %vm_id))]
pub(crate) async fn stop_vm(
    registry: &Registry,
    vm_id: &VmId,
    forced: bool,
) -> Result<VmInstance, SvcError> {
    let vm = registry.specs().vm_rsc(vm_id)?;
    let current = vm.lock().clone();
    if current.state == VmState::Stopped {
        return Ok(current);
    }
    if let Some(host) = &current.host {
        CommandDispatcher::new(registry)
            .send_to_host(
                host,
                vec![Command::StopVm {
                    vm: vm_id.clone(),
                    forced,
                }],
            )
            .await?;
    }
    vm.persist_with(registry, |vm| {
        vm.state = VmState::Stopped;
        if let Some(host) = vm.host.take() {
            vm.last_host = Some(host);
        }
        Ok(())
    })
    .await
}

/// Start the vm on its last host if that's Up, otherwise on any Up host of its zone.
#[tracing::instrument(level = "info", skip(registry), err, fields(vm.id = %vm_id))]
pub(crate) async fn start_vm(registry: &Registry, vm_id: &VmId) -> Result<VmInstance, SvcError> {
    let vm = registry.specs().vm_rsc(vm_id)?;
    let current = vm.lock().clone();
    if current.running() {
        return Ok(current);
    }
    let host = start_host(registry, &current)?;
    CommandDispatcher::new(registry)
        .send_to_host(&host, vec![Command::StartVm { vm: vm_id.clone() }])
        .await?;
    vm.persist_with(registry, |vm| {
        vm.state = VmState::Running;
        vm.host = Some(host.clone());
        vm.last_host = Some(host.clone());
        Ok(())
    })
    .await
}

fn start_host(registry: &Registry, vm: &VmInstance) -> Result<HostId, SvcError> {
    let hosts = registry.specs().hosts();
    if let Some(last) = &vm.last_host {
        if hosts.iter().any(|host| &host.id == last && host.is_up()) {
            return Ok(last.clone());
        }
    }
    hosts
        .into_iter()
        .find(|host| host.zone == vm.zone && host.hypervisor == vm.hypervisor && host.is_up())
        .map(|host| host.id)
        .ok_or(SvcError::NotFound {
            kind: ResourceKind::Host,
            id: format!("Up {} host in zone {}", vm.hypervisor, vm.zone),
        })
}
