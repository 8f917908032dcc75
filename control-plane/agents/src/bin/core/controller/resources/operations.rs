use crate::controller::registry::Registry;
use agents::errors::SvcError;

/// Resource Lifecycle Operations.
#[async_trait::async_trait]
pub(crate) trait ResourceLifecycle {
    type Create: Sync + Send;
    type CreateOutput: Sync + Send + Sized;
    type Destroy: Sync + Send;
    /// Create the `Self` Resource itself.
    async fn create(
        registry: &Registry,
        request: &Self::Create,
    ) -> Result<Self::CreateOutput, SvcError>;
    /// Destroy the resource itself.
    async fn destroy(
        &mut self,
        registry: &Registry,
        request: &Self::Destroy,
    ) -> Result<(), SvcError>;
}

/// Resource Maintenance Operations.
#[async_trait::async_trait]
pub(crate) trait ResourceMaintenance {
    type MaintenanceOutput: Sync + Send + Sized;
    /// Drive the resource into maintenance.
    async fn prepare_maintenance(
        &mut self,
        registry: &Registry,
    ) -> Result<Self::MaintenanceOutput, SvcError>;
    /// Bring the resource back from maintenance.
    async fn cancel_maintenance(
        &mut self,
        registry: &Registry,
    ) -> Result<Self::MaintenanceOutput, SvcError>;
}
