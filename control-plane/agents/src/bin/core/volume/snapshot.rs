use super::{invalid_state, volume_guard, volume_pool};
use crate::{
    controller::{
        registry::Registry,
        resources::{ResourceMutex, TraceStrLog},
    },
    host::dispatcher::CommandDispatcher,
};
use agents::errors::SvcError;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::snapshot::{SnapshotState, VolumeSnapshot},
        transport::{
            Answer, Command, CreateVolumeSnapshot, ResourceType, SnapshotId, VolumeEvent,
            VolumeState,
        },
    },
};

/// Mark the snapshot as failed, best effort.
async fn snapshot_failed(registry: &Registry, snapshot: &ResourceMutex<VolumeSnapshot>) {
    let result = snapshot
        .persist_with(registry, |snapshot| {
            snapshot.state = SnapshotState::Error;
            Ok(())
        })
        .await;
    if let Err(error) = result {
        tracing::error!(
            snapshot.id = %snapshot.lock().id,
            error = error.full_string(),
            "Failed to mark the snapshot as failed"
        );
    }
}

/// Take a snapshot of a Ready volume on primary storage and back it up to secondary storage.
/// The volume returns to Ready as soon as the snapshot is taken, before the backup.
#[tracing::instrument(level = "info", skip(registry), err, fields(volume.id = %request.volume))]
pub(crate) async fn snapshot_volume(
    registry: &Registry,
    request: &CreateVolumeSnapshot,
) -> Result<VolumeSnapshot, SvcError> {
    let mut guard = volume_guard(registry, &request.volume).await?;
    let volume = guard.lock().clone();
    if volume.state != VolumeState::Ready {
        return Err(invalid_state(&volume, "snapshot"));
    }
    let specs = registry.specs();
    if specs
        .volume_snapshots(&volume.id)
        .iter()
        .any(VolumeSnapshot::in_progress)
    {
        return Err(invalid_state(&volume, "snapshot"));
    }
    registry.accountant().check(
        &volume.account,
        &[(ResourceType::SecondaryStorage, volume.size)],
    )?;
    let pool = volume_pool(registry, &volume)?;
    let preferred = volume
        .vm
        .as_ref()
        .and_then(|vm| specs.vm(vm).ok())
        .and_then(|vm| vm.host)
        .into_iter()
        .collect::<Vec<_>>();

    let record = VolumeSnapshot {
        id: SnapshotId::new(),
        volume: volume.id.clone(),
        account: volume.account.clone(),
        domain: volume.domain.clone(),
        policy: request.policy.clone(),
        size: volume.size,
        physical_size: None,
        path: None,
        state: SnapshotState::Creating,
        created: chrono::Utc::now(),
    };
    registry.store_obj(&record).await?;
    let snapshot = specs.insert_snapshot(record.clone());
    guard
        .transition(registry, VolumeEvent::SnapshotRequested)
        .await?;

    let take = Command::TakeSnapshot {
        volume: volume.target(),
        pool: pool.target(),
        snapshot: record.id.clone(),
        quiesce: request.quiesce,
    };
    let dispatcher = CommandDispatcher::new(registry);
    let taken = match dispatcher.send(&pool.id, vec![take], &preferred, &[]).await {
        Ok(dispatched) => dispatched,
        Err(error) => {
            snapshot_failed(registry, &snapshot).await;
            guard.operation_failed(registry, &error).await;
            return Err(error);
        }
    };
    let primary_path = match taken.answer() {
        Some(Answer::Snapshot { path, .. }) => path.clone(),
        _ => format!("{}/{}", volume.path.clone().unwrap_or_default(), record.id),
    };
    snapshot
        .persist_with(registry, |snapshot| {
            snapshot.state = SnapshotState::BackingUp;
            snapshot.path = Some(primary_path.clone());
            Ok(())
        })
        .await?;
    guard
        .transition(registry, VolumeEvent::OperationSucceeded)
        .await?;
    guard.info(&format!("Took snapshot '{}'", record.id));

    let backup = Command::BackupSnapshot {
        snapshot: record.id.clone(),
        snapshot_path: primary_path,
        pool: pool.target(),
    };
    let backed_up = match dispatcher
        .send(&pool.id, vec![backup], &[taken.host], &[])
        .await
    {
        Ok(dispatched) => dispatched,
        Err(error) => {
            snapshot_failed(registry, &snapshot).await;
            return Err(SvcError::PartialFailure {
                operation: "snapshot".to_string(),
                completed: "take".to_string(),
                step: "backup".to_string(),
                reason: error.full_string(),
            });
        }
    };
    let (path, physical_size) = match backed_up.answer() {
        Some(Answer::Snapshot { path, size }) => (Some(path.clone()), *size),
        _ => (None, record.size),
    };
    let snapshot = snapshot
        .persist_with(registry, |snapshot| {
            snapshot.state = SnapshotState::BackedUp;
            snapshot.physical_size = Some(physical_size);
            if path.is_some() {
                snapshot.path = path;
            }
            Ok(())
        })
        .await?;
    registry.accountant().increment(
        &snapshot.account,
        &[(ResourceType::SecondaryStorage, physical_size)],
    );
    tracing::info!(
        snapshot.id = %snapshot.id,
        volume.id = %snapshot.volume,
        physical_size,
        "Backed up snapshot"
    );
    Ok(snapshot)
}
