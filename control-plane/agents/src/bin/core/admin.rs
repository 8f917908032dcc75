//! The administrative surface: every pool and volume verb as a serializable request, dispatched
//! to the pool and volume services.
use crate::{controller::registry::Registry, pool, volume};
use agents::errors::SvcError;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use stor_port::types::v0::transport::{
    AllocateVolume, AttachVolume, CancelMaintenance, CreatePool, CreateVolume,
    CreateVolumeSnapshot, DeletePool, DestroyVolume, DetachVolume, ExtractVolume, MigrateVolume,
    PoolId, PrepareMaintenance, RecoverVolume, ResizeVolume, SetPoolEnabled, UpdatePool,
    UploadVolume, VolumeId,
};
use strum_macros::AsRefStr;

/// An administrative request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, AsRefStr)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub(crate) enum AdminRequest {
    GetPools { id: Option<PoolId> },
    CreatePool(CreatePool),
    UpdatePool(UpdatePool),
    SetPoolEnabled(SetPoolEnabled),
    DeletePool(DeletePool),
    PrepareMaintenance(PrepareMaintenance),
    CancelMaintenance(CancelMaintenance),
    GetVolumes { id: Option<VolumeId> },
    GetSnapshots { volume: VolumeId },
    AllocateVolume(AllocateVolume),
    CreateVolume(CreateVolume),
    UploadVolume(UploadVolume),
    AttachVolume(AttachVolume),
    DetachVolume(DetachVolume),
    ResizeVolume(ResizeVolume),
    MigrateVolume(MigrateVolume),
    SnapshotVolume(CreateVolumeSnapshot),
    ExtractVolume(ExtractVolume),
    DestroyVolume(DestroyVolume),
    RecoverVolume(RecoverVolume),
}

fn reply<T: Serialize>(value: T) -> Result<serde_json::Value, SvcError> {
    serde_json::to_value(value).context(agents::errors::Serde {
        what: "admin reply",
    })
}

/// Handles the administrative requests.
#[derive(Debug, Clone)]
pub(crate) struct AdminService {
    pools: pool::service::Service,
    volumes: volume::service::Service,
}

impl AdminService {
    pub(crate) fn new(registry: &Registry) -> Self {
        Self {
            pools: pool::service::Service::new(registry.clone()),
            volumes: volume::service::Service::new(registry.clone()),
        }
    }

    /// Handle the request, returning the updated entity as json.
    pub(crate) async fn handle(
        &self,
        request: &AdminRequest,
    ) -> Result<serde_json::Value, SvcError> {
        tracing::debug!(verb = request.as_ref(), "Handling admin request");
        match request {
            AdminRequest::GetPools { id } => reply(self.pools.get_pools(id.as_ref())?),
            AdminRequest::CreatePool(request) => reply(self.pools.create_pool(request).await?),
            AdminRequest::UpdatePool(request) => reply(self.pools.update_pool(request).await?),
            AdminRequest::SetPoolEnabled(request) => {
                reply(self.pools.set_pool_enabled(request).await?)
            }
            AdminRequest::DeletePool(request) => reply(self.pools.delete_pool(request).await?),
            AdminRequest::PrepareMaintenance(request) => {
                reply(self.pools.prepare_maintenance(request).await?)
            }
            AdminRequest::CancelMaintenance(request) => {
                reply(self.pools.cancel_maintenance(request).await?)
            }
            AdminRequest::GetVolumes { id } => reply(self.volumes.get_volumes(id.as_ref())?),
            AdminRequest::GetSnapshots { volume } => {
                reply(self.volumes.get_snapshots(volume)?)
            }
            AdminRequest::AllocateVolume(request) => {
                reply(self.volumes.allocate_volume(request).await?)
            }
            AdminRequest::CreateVolume(request) => {
                reply(self.volumes.create_volume(request).await?)
            }
            AdminRequest::UploadVolume(request) => {
                reply(self.volumes.upload_volume(request).await?)
            }
            AdminRequest::AttachVolume(request) => {
                reply(self.volumes.attach_volume(request).await?)
            }
            AdminRequest::DetachVolume(request) => {
                reply(self.volumes.detach_volume(request).await?)
            }
            AdminRequest::ResizeVolume(request) => {
                reply(self.volumes.resize_volume(request).await?)
            }
            AdminRequest::MigrateVolume(request) => {
                reply(self.volumes.migrate_volume(request).await?)
            }
            AdminRequest::SnapshotVolume(request) => {
                reply(self.volumes.snapshot_volume(request).await?)
            }
            AdminRequest::ExtractVolume(request) => {
                reply(self.volumes.extract_volume(request).await?)
            }
            AdminRequest::DestroyVolume(request) => {
                reply(self.volumes.destroy_volume(request).await?)
            }
            AdminRequest::RecoverVolume(request) => {
                reply(self.volumes.recover_volume(request).await?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_tagged_requests() {
        let request: AdminRequest = serde_json::from_value(serde_json::json!({
            "verb": "destroy_volume",
            "volume": "vol-1",
            "expunge": true
        }))
        .unwrap();
        assert_eq!(
            request,
            AdminRequest::DestroyVolume(DestroyVolume {
                volume: "vol-1".into(),
                expunge: true,
            })
        );
        assert_eq!(request.as_ref(), "DestroyVolume");
    }
}
