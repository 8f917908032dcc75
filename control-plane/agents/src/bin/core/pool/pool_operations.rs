use super::scope_hosts;
use crate::{
    capacity::CapacityTracker,
    controller::{
        registry::Registry,
        resources::{
            operations::ResourceLifecycle, operations_helper::OperationSequenceGuard,
            OperationGuardArc, TraceStrLog, UpdateInnerValue,
        },
    },
};
use agents::errors::SvcError;
use stor_port::{
    transport_api::ResourceKind,
    types::v0::{
        store::{
            definitions::{ObjectKey, StorableObject},
            pool::StoragePool,
            volume::VolumeSpec,
        },
        transport::{
            CreatePool, DeletePool, PoolStatus, ScopeType, SetPoolEnabled, UpdatePool,
            VolumeState,
        },
    },
};

#[async_trait::async_trait]
impl ResourceLifecycle for OperationGuardArc<StoragePool> {
    type Create = CreatePool;
    type CreateOutput = StoragePool;
    type Destroy = DeletePool;

    async fn create(
        registry: &Registry,
        request: &Self::Create,
    ) -> Result<Self::CreateOutput, SvcError> {
        let specs = registry.specs();
        if specs.pool(&request.id).is_ok() {
            return Err(SvcError::AlreadyExists {
                kind: ResourceKind::StoragePool,
                id: request.id.to_string(),
            });
        }
        let mut pool = StoragePool::from(request);
        validate_scope(registry, &mut pool)?;

        registry.store_obj(&pool).await?;
        let mut pool = specs.insert_pool(pool).operation_guard_wait().await?;

        let spec = pool.as_ref().clone();
        let hosts = scope_hosts(registry, &spec);
        let connected = registry
            .listeners()
            .connect_hosts(registry, &spec, &hosts)
            .await;
        if connected == 0 {
            pool.warn("No host could connect to the pool, removing it");
            registry.delete_kv(&spec.key().key()).await?;
            specs.remove_pool(&spec.id);
            return Err(SvcError::StorageUnavailable {
                pool_id: spec.id.clone(),
            });
        }

        CapacityTracker::new(registry).recalculate(&spec.id).await?;
        pool.update();
        pool.info(&format!("Created pool, connected to {connected} host(s)"));
        Ok(pool.as_ref().clone())
    }

    async fn destroy(
        &mut self,
        registry: &Registry,
        request: &Self::Destroy,
    ) -> Result<(), SvcError> {
        let pool = self.lock().clone();
        if matches!(
            pool.status,
            PoolStatus::PrepareForMaintenance | PoolStatus::CancelMaintenance
        ) {
            return Err(SvcError::InvalidPoolStatus {
                pool_id: pool.id.clone(),
                status: pool.status,
                operation: "delete".to_string(),
            });
        }

        let volumes = registry
            .specs()
            .pool_volumes(&pool.id)
            .into_iter()
            .filter(|volume| volume.state != VolumeState::Expunged)
            .collect::<Vec<_>>();
        let destroyed = |volume: &VolumeSpec| volume.state == VolumeState::Destroy;
        let in_use = volumes.iter().any(|volume| !destroyed(volume));
        if in_use || (!volumes.is_empty() && !request.forced) {
            return Err(SvcError::InUse {
                kind: ResourceKind::StoragePool,
                id: pool.id.to_string(),
            });
        }
        // forced: the destroyed volumes go away along with the pool
        for volume in volumes {
            registry.delete_kv(&volume.key().key()).await?;
            registry.specs().remove_volume(&volume.id);
        }

        registry.listeners().disconnect_hosts(registry, &pool).await;
        CapacityTracker::new(registry).remove(&pool.id).await?;
        for item in registry.specs().work_items(&pool.id) {
            registry.delete_kv(&item.key().key()).await?;
            registry.specs().remove_work_item(&item.pool, &item.vm);
        }
        registry.delete_kv(&pool.key().key()).await?;
        registry.specs().remove_pool(&pool.id);
        self.info("Deleted pool");
        Ok(())
    }
}

/// Check the scope of the pool against its host and cluster, filling in the cluster of a
/// host local pool.
fn validate_scope(registry: &Registry, pool: &mut StoragePool) -> Result<(), SvcError> {
    let pool_id = pool.id.clone();
    let invalid = |message: &str| SvcError::InvalidArguments {
        message: format!("pool '{pool_id}': {message}"),
    };
    match pool.scope {
        ScopeType::Host => {
            let host_id = pool.host.clone().ok_or_else(|| invalid("host scope needs a host"))?;
            let host = registry.specs().host(&host_id)?;
            if host.zone != pool.zone {
                return Err(invalid("host is not in the pool's zone"));
            }
            if matches!(&pool.cluster, Some(cluster) if cluster != &host.cluster) {
                return Err(invalid("host is not in the pool's cluster"));
            }
            pool.cluster = Some(host.cluster);
        }
        ScopeType::Cluster => {
            if pool.cluster.is_none() {
                return Err(invalid("cluster scope needs a cluster"));
            }
            if pool.host.is_some() {
                return Err(invalid("cluster scope must not name a host"));
            }
        }
        ScopeType::Zone => {
            if pool.cluster.is_some() || pool.host.is_some() {
                return Err(invalid("zone scope must not name a cluster or host"));
            }
        }
    }
    Ok(())
}

impl OperationGuardArc<StoragePool> {
    /// Update the tags, capacity and over-provisioning of the pool.
    pub(crate) async fn update_pool(
        &mut self,
        registry: &Registry,
        request: &UpdatePool,
    ) -> Result<StoragePool, SvcError> {
        let pool = self.lock().clone();
        if let Some(factor) = request.over_provisioning {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(SvcError::InvalidArguments {
                    message: format!("invalid over-provisioning factor {factor}"),
                });
            }
        }
        if let Some(capacity) = request.capacity_bytes {
            let allocated = CapacityTracker::new(registry).allocated_bytes(&pool.id);
            if capacity < allocated {
                return Err(SvcError::InvalidArguments {
                    message: format!(
                        "capacity {capacity} is below the {allocated} bytes already allocated"
                    ),
                });
            }
        }

        let spec = self
            .persist_with(registry, |pool| {
                if let Some(tags) = &request.tags {
                    pool.tags = tags.clone();
                }
                if let Some(capacity) = request.capacity_bytes {
                    pool.capacity_bytes = capacity;
                }
                if let Some(iops) = request.capacity_iops {
                    pool.capacity_iops = Some(iops);
                }
                if let Some(factor) = request.over_provisioning {
                    pool.over_provisioning = Some(factor);
                }
                Ok(())
            })
            .await?;
        self.update();
        CapacityTracker::new(registry).recalculate(&spec.id).await?;
        Ok(spec)
    }

    /// Enable a disabled pool or disable an Up pool.
    pub(crate) async fn set_enabled(
        &mut self,
        registry: &Registry,
        request: &SetPoolEnabled,
    ) -> Result<StoragePool, SvcError> {
        let (from, to) = match request.enabled {
            true => (PoolStatus::Disabled, PoolStatus::Up),
            false => (PoolStatus::Up, PoolStatus::Disabled),
        };
        let status = self.lock().status;
        if status == to {
            return Ok(self.lock().clone());
        }
        if status != from {
            return Err(SvcError::InvalidPoolStatus {
                pool_id: request.id.clone(),
                status,
                operation: if request.enabled { "enable" } else { "disable" }.to_string(),
            });
        }
        self.set_status(registry, to).await
    }

    /// Persist a new status of the pool.
    pub(crate) async fn set_status(
        &mut self,
        registry: &Registry,
        status: PoolStatus,
    ) -> Result<StoragePool, SvcError> {
        let spec = self
            .persist_with(registry, |pool| {
                pool.status = status;
                Ok(())
            })
            .await?;
        self.update();
        self.debug(&format!("Pool status is now {status}"));
        Ok(spec)
    }
}
