use super::{transfer, volume_guard};
use crate::{
    controller::{
        registry::Registry,
        resources::{
            operations::ResourceLifecycle, operations_helper::ResourceSpecsLocked,
            OperationGuardArc,
        },
    },
    vm_work::{VmWork, VmWorkQueue},
};
use agents::errors::SvcError;
use stor_port::types::v0::{
    store::{snapshot::VolumeSnapshot, volume::VolumeSpec},
    transport::{
        AllocateVolume, AttachVolume, CreateVolume, CreateVolumeSnapshot, DestroyVolume,
        DetachVolume, ExtractVolume, MigrateVolume, RecoverVolume, ResizeVolume, UploadVolume,
        VmId, VolumeId,
    },
};

/// Volume administration.
/// Operations which touch the vm a volume is attached to run through the vm's work queue.
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

    /// The vm which the volume is attached to, if any.
    fn attached_vm(&self, volume: &VolumeId) -> Result<Option<VmId>, SvcError> {
        Ok(self.specs().volume(volume)?.vm)
    }

    /// Get every volume, or just the given one.
    pub(crate) fn get_volumes(
        &self,
        volume: Option<&VolumeId>,
    ) -> Result<Vec<VolumeSpec>, SvcError> {
        match volume {
            Some(id) => Ok(vec![self.specs().volume(id)?]),
            None => Ok(self.specs().volumes()),
        }
    }

    /// Get the snapshots of the volume.
    pub(crate) fn get_snapshots(&self, volume: &VolumeId) -> Result<Vec<VolumeSnapshot>, SvcError> {
        self.specs().volume(volume)?;
        Ok(self.specs().volume_snapshots(volume))
    }

    /// Allocate a volume, without provisioning it.
    #[tracing::instrument(level = "info", skip(self), err, fields(volume.name = %request.name))]
    pub(crate) async fn allocate_volume(
        &self,
        request: &AllocateVolume,
    ) -> Result<VolumeSpec, SvcError> {
        OperationGuardArc::<VolumeSpec>::create(&self.registry, request).await
    }

    /// Provision an allocated or uploaded volume on a pool.
    #[tracing::instrument(level = "info", skip(self), err, fields(volume.id = %request.volume))]
    pub(crate) async fn create_volume(
        &self,
        request: &CreateVolume,
    ) -> Result<VolumeSpec, SvcError> {
        let vm = match &request.vm {
            Some(vm) => Some(self.specs().vm(vm)?),
            None => None,
        };
        let mut volume = volume_guard(&self.registry, &request.volume).await?;
        volume
            .provision(&self.registry, vm.as_ref(), &request.avoid)
            .await
    }

    /// Register an imported disk.
    pub(crate) async fn upload_volume(
        &self,
        request: &UploadVolume,
    ) -> Result<VolumeSpec, SvcError> {
        transfer::upload_volume(&self.registry, request).await
    }

    /// Attach the volume to a vm.
    pub(crate) async fn attach_volume(
        &self,
        request: &AttachVolume,
    ) -> Result<VolumeSpec, SvcError> {
        VmWorkQueue::run(
            &self.registry,
            &request.vm,
            VmWork::AttachVolume(request.clone()),
        )
        .await
    }

    /// Detach the volume from its vm.
    pub(crate) async fn detach_volume(
        &self,
        request: &DetachVolume,
    ) -> Result<VolumeSpec, SvcError> {
        match self.attached_vm(&request.volume)? {
            Some(vm) => {
                VmWorkQueue::run(&self.registry, &vm, VmWork::DetachVolume(request.clone())).await
            }
            None => Err(SvcError::NotAttached {
                vol_id: request.volume.clone(),
            }),
        }
    }

    /// Resize the volume and, optionally, change its disk offering.
    pub(crate) async fn resize_volume(
        &self,
        request: &ResizeVolume,
    ) -> Result<VolumeSpec, SvcError> {
        match self.attached_vm(&request.volume)? {
            Some(vm) => {
                VmWorkQueue::run(&self.registry, &vm, VmWork::ResizeVolume(request.clone())).await
            }
            None => super::resize_volume(&self.registry, request).await,
        }
    }

    /// Migrate the volume to another pool.
    pub(crate) async fn migrate_volume(
        &self,
        request: &MigrateVolume,
    ) -> Result<VolumeSpec, SvcError> {
        match self.attached_vm(&request.volume)? {
            Some(vm) => {
                VmWorkQueue::run(&self.registry, &vm, VmWork::MigrateVolume(request.clone()))
                    .await
            }
            None => super::migrate_volume(&self.registry, request).await,
        }
    }

    /// Take a snapshot of the volume.
    pub(crate) async fn snapshot_volume(
        &self,
        request: &CreateVolumeSnapshot,
    ) -> Result<VolumeSnapshot, SvcError> {
        match self.attached_vm(&request.volume)? {
            Some(vm) => {
                VmWorkQueue::run(&self.registry, &vm, VmWork::TakeSnapshot(request.clone())).await
            }
            None => super::snapshot_volume(&self.registry, request).await,
        }
    }

    /// Copy the volume to secondary storage for download.
    pub(crate) async fn extract_volume(&self, request: &ExtractVolume) -> Result<String, SvcError> {
        match self.attached_vm(&request.volume)? {
            Some(vm) => {
                VmWorkQueue::run(&self.registry, &vm, VmWork::ExtractVolume(request.clone()))
                    .await
            }
            None => super::extract_volume(&self.registry, request).await,
        }
    }

    /// Destroy the volume, expunging it when requested.
    #[tracing::instrument(level = "info", skip(self), err, fields(volume.id = %request.volume))]
    pub(crate) async fn destroy_volume(&self, request: &DestroyVolume) -> Result<(), SvcError> {
        let mut volume = volume_guard(&self.registry, &request.volume).await?;
        volume.destroy(&self.registry, request).await
    }

    /// Recover a destroyed volume.
    #[tracing::instrument(level = "info", skip(self), err, fields(volume.id = %request.volume))]
    pub(crate) async fn recover_volume(
        &self,
        request: &RecoverVolume,
    ) -> Result<VolumeSpec, SvcError> {
        let mut volume = volume_guard(&self.registry, &request.volume).await?;
        volume.recover(&self.registry).await
    }
}
