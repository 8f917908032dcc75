//! Pool maintenance.
//!
//! `Up -> PrepareForMaintenance -> Maintenance` and back through `CancelMaintenance`, with any
//! failure parking the pool in `ErrorInMaintenance` until an operator retries.
//! Every active vm with a root volume on the pool gets a durable work item, so a transition
//! which is cut short by a departed control-plane node can be found and flagged.
use super::scope_hosts;
use crate::{
    controller::{
        registry::Registry,
        resources::{
            operations::ResourceMaintenance, operations_helper::OperationSequenceGuard,
            OperationGuardArc, TraceStrLog,
        },
    },
    host::dispatcher::CommandDispatcher,
    vm,
};
use agents::errors::SvcError;
use std::collections::HashSet;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::{
            definitions::{ObjectKey, StorableObject},
            host::Host,
            pool::StoragePool,
            work_item::StoragePoolWorkItem,
        },
        transport::{Command, NodeId, PoolId, PoolStatus},
    },
};

#[async_trait::async_trait]
impl ResourceMaintenance for OperationGuardArc<StoragePool> {
    type MaintenanceOutput = StoragePool;

    async fn prepare_maintenance(
        &mut self,
        registry: &Registry,
    ) -> Result<Self::MaintenanceOutput, SvcError> {
        let pool = self.lock().clone();
        if !matches!(
            pool.status,
            PoolStatus::Up | PoolStatus::ErrorInMaintenance
        ) {
            return Err(SvcError::InvalidPoolStatus {
                pool_id: pool.id.clone(),
                status: pool.status,
                operation: "prepare_maintenance".to_string(),
            });
        }
        if let Some(other) = registry.specs().zone_pools(&pool.zone).into_iter().find(|other| {
            other.id != pool.id
                && pool.cluster.is_some()
                && other.cluster == pool.cluster
                && other.status == PoolStatus::PrepareForMaintenance
        }) {
            return Err(SvcError::MaintenanceConflict {
                pool_id: pool.id.clone(),
                other: other.id,
            });
        }

        let hosts = scope_hosts(registry, &pool);
        if hosts.is_empty() {
            self.info("No Up host can reach the pool, entering maintenance directly");
            return self.set_status(registry, PoolStatus::Maintenance).await;
        }

        self.set_status(registry, PoolStatus::PrepareForMaintenance)
            .await?;
        match quiesce(registry, &pool, &hosts).await {
            Ok(()) => self.set_status(registry, PoolStatus::Maintenance).await,
            Err(error) => {
                self.error(&format!(
                    "Failed to prepare for maintenance: {}",
                    error.full_string()
                ));
                self.park_in_error(registry).await;
                Err(error)
            }
        }
    }

    async fn cancel_maintenance(
        &mut self,
        registry: &Registry,
    ) -> Result<Self::MaintenanceOutput, SvcError> {
        let pool = self.lock().clone();
        if !matches!(
            pool.status,
            PoolStatus::Maintenance
                | PoolStatus::ErrorInMaintenance
                | PoolStatus::PrepareForMaintenance
        ) {
            return Err(SvcError::InvalidPoolStatus {
                pool_id: pool.id.clone(),
                status: pool.status,
                operation: "cancel_maintenance".to_string(),
            });
        }

        self.set_status(registry, PoolStatus::CancelMaintenance)
            .await?;
        match resume(registry, &pool).await {
            Ok(()) => self.set_status(registry, PoolStatus::Up).await,
            Err(error) => {
                self.error(&format!(
                    "Failed to cancel maintenance: {}",
                    error.full_string()
                ));
                self.park_in_error(registry).await;
                Err(error)
            }
        }
    }
}

impl OperationGuardArc<StoragePool> {
    async fn park_in_error(&mut self, registry: &Registry) {
        if let Err(error) = self
            .set_status(registry, PoolStatus::ErrorInMaintenance)
            .await
        {
            self.error(&format!(
                "Failed to persist the ErrorInMaintenance status: {}",
                error.full_string()
            ));
        }
    }
}

/// Stop (and possibly restart elsewhere) every active vm which boots off the pool.
async fn quiesce(registry: &Registry, pool: &StoragePool, hosts: &[Host]) -> Result<(), SvcError> {
    set_heartbeat(registry, pool, hosts, false).await;

    let specs = registry.specs();
    for volume in specs.pool_volumes(&pool.id) {
        if !volume.is_root() || volume.state.is_destroyed() {
            continue;
        }
        let vm = match volume.vm.as_ref().map(|vm| specs.vm(vm)) {
            Some(Ok(vm)) if vm.state.is_active() => vm,
            _ => continue,
        };
        let item = specs
            .work_items(&pool.id)
            .into_iter()
            .find(|item| item.vm == vm.id);
        match item {
            Some(item) if &item.owner == registry.node_id() => {}
            Some(mut item) => {
                item.owner = registry.node_id().clone();
                store_work_item(registry, item).await?;
            }
            None => {
                let item = StoragePoolWorkItem::new(&pool.id, &vm.id, registry.node_id());
                store_work_item(registry, item).await?;
            }
        }
    }

    let restart = specs
        .zone_pools(&pool.zone)
        .iter()
        .any(|other| other.id != pool.id && other.is_up());
    for mut item in specs.work_items(&pool.id) {
        if !item.pending_prepare() {
            continue;
        }
        vm::stop(registry, &item.vm, false).await?;
        item.stopped_for_maintenance = true;
        store_work_item(registry, item.clone()).await?;

        if restart {
            vm::start(registry, &item.vm).await?;
            item.started_after_maintenance = true;
            store_work_item(registry, item).await?;
        }
    }
    Ok(())
}

/// Restart the vm's stopped for the maintenance and drop the pool's work items.
async fn resume(registry: &Registry, pool: &StoragePool) -> Result<(), SvcError> {
    let hosts = scope_hosts(registry, pool);
    set_heartbeat(registry, pool, &hosts, true).await;

    for mut item in registry.specs().work_items(&pool.id) {
        if !item.pending_cancel() {
            continue;
        }
        vm::start(registry, &item.vm).await?;
        item.started_after_maintenance = true;
        store_work_item(registry, item).await?;
    }
    for item in registry.specs().work_items(&pool.id) {
        delete_work_item(registry, &item).await?;
    }
    Ok(())
}

/// Push the heartbeat change to every host, best effort.
async fn set_heartbeat(registry: &Registry, pool: &StoragePool, hosts: &[Host], enable: bool) {
    let dispatcher = CommandDispatcher::new(registry);
    for host in hosts {
        let command = Command::StoragePoolHeartbeat {
            enable,
            pool: pool.target(),
        };
        if let Err(error) = dispatcher.send_to_host(&host.id, vec![command]).await {
            tracing::warn!(
                pool.id = %pool.id,
                host.id = %host.id,
                enable,
                error = error.full_string(),
                "Failed to change the pool heartbeat"
            );
        }
    }
}

async fn store_work_item(registry: &Registry, item: StoragePoolWorkItem) -> Result<(), SvcError> {
    registry.store_obj(&item).await?;
    registry.specs().insert_work_item(item);
    Ok(())
}

async fn delete_work_item(registry: &Registry, item: &StoragePoolWorkItem) -> Result<(), SvcError> {
    registry.delete_kv(&item.key().key()).await?;
    registry.specs().remove_work_item(&item.pool, &item.vm);
    Ok(())
}

/// Force every pool whose maintenance transition was driven by the departed node into
/// `ErrorInMaintenance`, purging the node's work items on it.
/// An operator has to retry the transition explicitly.
#[tracing::instrument(level = "info", skip(registry), err)]
pub(crate) async fn recover_departed(registry: &Registry, node: &NodeId) -> Result<(), SvcError> {
    let pools = registry
        .specs()
        .all_work_items()
        .into_iter()
        .filter(|item| &item.owner == node)
        .map(|item| item.pool)
        .collect::<HashSet<PoolId>>();

    for pool_id in pools {
        let mut pool = match registry.specs().pool_rsc(&pool_id) {
            Ok(pool) => pool.operation_guard_wait().await?,
            Err(_) => continue,
        };
        let status = pool.lock().status;
        if !status.in_maintenance_transition() {
            continue;
        }
        if status != PoolStatus::ErrorInMaintenance {
            pool.set_status(registry, PoolStatus::ErrorInMaintenance)
                .await?;
        }
        for item in registry.specs().work_items(&pool_id) {
            if &item.owner == node {
                delete_work_item(registry, &item).await?;
            }
        }
        pool.warn(&format!(
            "Maintenance transition orphaned by departed node '{node}', operator action required"
        ));
    }
    Ok(())
}
