use crate::controller::{
    registry::Registry,
    resources::{
        operations::{ResourceLifecycle, ResourceMaintenance},
        operations_helper::{OperationSequenceGuard, ResourceSpecsLocked},
        OperationGuardArc,
    },
};
use agents::errors::SvcError;
use stor_port::types::v0::{
    store::pool::StoragePool,
    transport::{
        CancelMaintenance, CreatePool, DeletePool, PoolId, PrepareMaintenance, SetPoolEnabled,
        UpdatePool,
    },
};

/// Storage pool administration.
#[derive(Debug, Clone)]
pub(crate) struct Service {
    registry: Registry,
}

impl Service {
    pub(crate) fn new(registry: Registry) -> Self {
        Self { registry }
    }
    fn specs(&self) -> &ResourceSpecsLocked {
        self.registry.specs()
    }

    /// Get the guarded pool for the given pool `id`.
    async fn pool_guard(&self, pool: &PoolId) -> Result<OperationGuardArc<StoragePool>, SvcError> {
        self.specs().pool_rsc(pool)?.operation_guard_wait().await
    }

    /// Get every pool, or just the given one.
    pub(crate) fn get_pools(&self, pool: Option<&PoolId>) -> Result<Vec<StoragePool>, SvcError> {
        match pool {
            Some(id) => Ok(vec![self.specs().pool(id)?]),
            None => Ok(self.specs().pools()),
        }
    }

    /// Create a pool using the given parameters.
    #[tracing::instrument(level = "info", skip(self), err, fields(pool.id = %request.id))]
    pub(crate) async fn create_pool(&self, request: &CreatePool) -> Result<StoragePool, SvcError> {
        OperationGuardArc::<StoragePool>::create(&self.registry, request).await
    }

    /// Update the mutable attributes of a pool.
    #[tracing::instrument(level = "info", skip(self), err, fields(pool.id = %request.id))]
    pub(crate) async fn update_pool(&self, request: &UpdatePool) -> Result<StoragePool, SvcError> {
        let mut pool = self.pool_guard(&request.id).await?;
        pool.update_pool(&self.registry, request).await
    }

    /// Enable or disable the pool for new allocations.
    #[tracing::instrument(level = "info", skip(self), err, fields(pool.id = %request.id))]
    pub(crate) async fn set_pool_enabled(
        &self,
        request: &SetPoolEnabled,
    ) -> Result<StoragePool, SvcError> {
        let mut pool = self.pool_guard(&request.id).await?;
        pool.set_enabled(&self.registry, request).await
    }

    /// Delete a pool, holding the pool's keyed lock throughout.
    #[tracing::instrument(level = "info", skip(self), err, fields(pool.id = %request.id))]
    pub(crate) async fn delete_pool(&self, request: &DeletePool) -> Result<(), SvcError> {
        let _lock = self
            .registry
            .pool_locks()
            .lock(&request.id, self.registry.config().lock_timeout)
            .await?;
        let mut pool = self.pool_guard(&request.id).await?;
        pool.destroy(&self.registry, request).await
    }

    /// Put the pool into maintenance.
    #[tracing::instrument(level = "info", skip(self), err, fields(pool.id = %request.id))]
    pub(crate) async fn prepare_maintenance(
        &self,
        request: &PrepareMaintenance,
    ) -> Result<StoragePool, SvcError> {
        let mut pool = self.pool_guard(&request.id).await?;
        pool.prepare_maintenance(&self.registry).await
    }

    /// Take the pool out of maintenance.
    #[tracing::instrument(level = "info", skip(self), err, fields(pool.id = %request.id))]
    pub(crate) async fn cancel_maintenance(
        &self,
        request: &CancelMaintenance,
    ) -> Result<StoragePool, SvcError> {
        let mut pool = self.pool_guard(&request.id).await?;
        pool.cancel_maintenance(&self.registry).await
    }
}
