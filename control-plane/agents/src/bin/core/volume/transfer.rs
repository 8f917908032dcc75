//! Transfers between primary and secondary storage: uploads of imported disks and extraction
//! of volumes for download.
use super::{invalid_state, volume_guard, volume_pool};
use crate::{
    controller::{registry::Registry, resources::TraceStrLog},
    host::dispatcher::CommandDispatcher,
    usage::{UsageEvent, UsageEventType},
};
use agents::errors::SvcError;
use stor_port::types::v0::{
    store::{volume::VolumeSpec, OperationSequence},
    transport::{
        Answer, Command, ExtractVolume, ResourceType, UploadVolume, VmState, VolumeEvent,
        VolumeId, VolumeState, VolumeType,
    },
};

/// Check that an upload comes from a url the hosts can fetch.
fn validate_url(url: &str) -> Result<(), SvcError> {
    let parsed = url::Url::parse(url).map_err(|error| SvcError::InvalidArguments {
        message: format!("invalid upload url '{url}': {error}"),
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(()),
        scheme => Err(SvcError::InvalidArguments {
            message: format!("unsupported upload url '{url}' with scheme '{scheme}'"),
        }),
    }
}

/// Register an imported disk. It stays on secondary storage in the `Uploaded` state until it
/// is created on a pool.
#[tracing::instrument(level = "info", skip(registry), err, fields(volume.name = %request.name))]
pub(crate) async fn upload_volume(
    registry: &Registry,
    request: &UploadVolume,
) -> Result<VolumeSpec, SvcError> {
    validate_url(&request.url)?;
    if request.size == 0 {
        return Err(SvcError::InvalidArguments {
            message: "an uploaded volume must have a size".to_string(),
        });
    }
    let specs = registry.specs();
    if let Some(offering) = &request.disk_offering {
        specs.offering(offering)?;
    }
    let id = VolumeId::new();
    let volume = VolumeSpec {
        sequencer: OperationSequence::new(id.as_str()),
        id,
        name: request.name.clone(),
        volume_type: VolumeType::Data,
        size: request.size,
        account: request.account.clone(),
        domain: request.domain.clone(),
        zone: request.zone.clone(),
        disk_offering: request.disk_offering.clone(),
        url: Some(request.url.clone()),
        format: Some(request.format),
        display: true,
        state: VolumeState::Uploaded,
        ..Default::default()
    };

    let counters = registry.accountant().reserve(
        &volume.account,
        vec![
            (ResourceType::Volume, 1),
            (ResourceType::SecondaryStorage, volume.size),
        ],
    )?;
    registry.store_obj(&volume).await?;
    counters.commit();
    specs.insert_volume(volume.clone());
    if let Some(event) = UsageEvent::for_volume(UsageEventType::VolumeUpload, &volume) {
        registry.usage().publish(event);
    }
    volume.info("Registered uploaded volume");
    Ok(volume)
}

/// Copy a Ready volume to secondary storage, returning the url it can be downloaded from.
#[tracing::instrument(level = "info", skip(registry), err, fields(volume.id = %request.volume))]
pub(crate) async fn extract_volume(
    registry: &Registry,
    request: &ExtractVolume,
) -> Result<String, SvcError> {
    let mut guard = volume_guard(registry, &request.volume).await?;
    let volume = guard.lock().clone();
    if volume.state != VolumeState::Ready {
        return Err(invalid_state(&volume, "extract"));
    }
    if volume.zone != request.zone {
        return Err(SvcError::InvalidArguments {
            message: format!(
                "volume '{}' is in zone {}, not {}",
                volume.id, volume.zone, request.zone
            ),
        });
    }
    if let Some(vm) = &volume.vm {
        let vm = registry.specs().vm(vm)?;
        if vm.state != VmState::Stopped {
            return Err(SvcError::InvalidArguments {
                message: format!(
                    "volume '{}' is attached to vm '{}' which is {}, not Stopped",
                    volume.id, vm.id, vm.state
                ),
            });
        }
    }
    let pool = volume_pool(registry, &volume)?;

    guard
        .transition(registry, VolumeEvent::ExtractRequested)
        .await?;
    let command = Command::CopyVolumeToSecondary {
        volume: volume.target(),
        pool: pool.target(),
    };
    let dispatched = match CommandDispatcher::new(registry)
        .send(&pool.id, vec![command], &[], &[])
        .await
    {
        Ok(dispatched) => dispatched,
        Err(error) => {
            guard.operation_failed(registry, &error).await;
            return Err(error);
        }
    };
    guard
        .transition(registry, VolumeEvent::OperationSucceeded)
        .await?;
    match dispatched.answer() {
        Some(Answer::Copied { path }) => {
            guard.info(&format!("Extracted volume to '{path}'"));
            Ok(path.clone())
        }
        _ => Err(SvcError::HostCommand {
            host: dispatched.host.to_string(),
            command: "CopyVolumeToSecondary".to_string(),
            details: "no extract url in the answer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::validate_url;

    #[test]
    fn upload_urls() {
        assert!(validate_url("https://images.example.com/disk.qcow2").is_ok());
        assert!(validate_url("http://10.0.0.1/disk.vhd").is_ok());
        assert!(validate_url("ftp://images.example.com/disk.qcow2").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
