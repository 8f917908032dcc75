use super::{
    cluster_pool, host_pool, zone_pool, Fixture, ACCOUNT, DOMAIN, HOSTS, RUNNING_VM, STOPPED_VM,
    ZONE,
};
use crate::{host::hypervisor::HypervisorCapabilities, usage::UsageEventType};
use agents::errors::{ErrorClass, SvcError};
use std::time::Duration;
use stor_port::types::v0::{
    store::{snapshot::SnapshotState, volume::VolumeSpec},
    transport::{
        AttachVolume, CreateVolume, CreateVolumeSnapshot, DestroyVolume, DetachVolume,
        ExtractVolume, HostId, Hypervisor, MigrateVolume, PoolId, PoolType, ResizeVolume,
        ResourceType, UploadVolume, VolumeFormat, VolumeState,
    },
};
use utils::bytes::GIB;

async fn fixture() -> Fixture {
    let pool = zone_pool("nfs", PoolType::NetworkFilesystem, 100 * GIB);
    let fixture = Fixture::new(vec![pool]).await;
    fixture.transport.clear();
    fixture
}

fn attach(volume: &VolumeSpec, vm: &str, device_id: Option<u32>) -> AttachVolume {
    AttachVolume {
        volume: volume.id.clone(),
        vm: vm.into(),
        device_id,
    }
}

fn snapshot(volume: &VolumeSpec) -> CreateVolumeSnapshot {
    CreateVolumeSnapshot {
        volume: volume.id.clone(),
        policy: None,
        quiesce: false,
    }
}

#[tokio::test]
async fn concurrent_attach_is_serialized() {
    let fixture = fixture().await;
    let first = fixture.ready_volume("data-1", 10 * GIB).await;
    let second = fixture.ready_volume("data-2", 10 * GIB).await;
    fixture
        .transport
        .delay_command("AttachVolume", Duration::from_millis(50));

    let volumes = fixture.volumes();
    let first = attach(&first, RUNNING_VM, None);
    let second = attach(&second, RUNNING_VM, None);
    let (first, second) = tokio::join!(
        volumes.attach_volume(&first),
        volumes.attach_volume(&second)
    );
    let mut device_ids = vec![
        first.unwrap().device_id.unwrap(),
        second.unwrap().device_id.unwrap(),
    ];
    device_ids.sort_unstable();
    assert_eq!(device_ids, vec![1, 2]);
    assert_eq!(fixture.transport.sent("AttachVolume").len(), 2);
    assert_eq!(fixture.transport.max_in_flight(), 1);
    assert!(fixture.registry.specs().jobs().is_empty());
}

#[tokio::test]
async fn lifecycle_restores_resource_counts() {
    let fixture = fixture().await;
    let volumes = fixture.volumes();

    let volume = fixture.allocate("data", 20 * GIB).await;
    assert_eq!(volume.state, VolumeState::Allocated);
    assert_eq!(fixture.count(ResourceType::Volume), 1);
    assert_eq!(fixture.count(ResourceType::PrimaryStorage), 20 * GIB as i64);

    let created = volumes
        .create_volume(&CreateVolume {
            volume: volume.id.clone(),
            vm: None,
            avoid: vec![],
        })
        .await
        .unwrap();
    assert_eq!(created.state, VolumeState::Ready);

    // the stopped vm picks the volume up when it starts
    let attached = volumes
        .attach_volume(&attach(&volume, STOPPED_VM, None))
        .await
        .unwrap();
    assert_eq!(attached.device_id, Some(1));
    assert!(fixture.transport.sent("AttachVolume").is_empty());

    let error = volumes
        .destroy_volume(&DestroyVolume {
            volume: volume.id.clone(),
            expunge: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::InUse { .. }), "{error:?}");

    let detached = volumes
        .detach_volume(&DetachVolume {
            volume: volume.id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(detached.vm, None);
    assert_eq!(detached.device_id, None);

    volumes
        .destroy_volume(&DestroyVolume {
            volume: volume.id.clone(),
            expunge: true,
        })
        .await
        .unwrap();
    assert!(volumes.get_volumes(Some(&volume.id)).is_err());
    assert_eq!(fixture.count(ResourceType::Volume), 0);
    assert_eq!(fixture.count(ResourceType::PrimaryStorage), 0);
    assert_eq!(fixture.transport.sent("DestroyVolume").len(), 1);
    assert_eq!(fixture.transport.sent("DeleteFromSecondary").len(), 1);
    assert_eq!(fixture.transport.sent("DeleteFromCache").len(), 1);

    let events = fixture
        .usage
        .events()
        .into_iter()
        .map(|event| event.event_type)
        .collect::<Vec<_>>();
    assert_eq!(
        events,
        vec![UsageEventType::VolumeCreate, UsageEventType::VolumeDelete]
    );
}

#[tokio::test]
async fn attach_provisions_near_the_vm() {
    let fixture = fixture().await;
    let volume = fixture.allocate("data", 10 * GIB).await;

    let attached = fixture
        .volumes()
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap();
    assert_eq!(attached.state, VolumeState::Ready);
    assert_eq!(attached.pool, Some(PoolId::from("nfs")));
    assert_eq!(attached.vm, Some(RUNNING_VM.into()));

    let created = fixture.transport.sent("CreateVolume");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, HostId::from(HOSTS[0]));
    let sent = fixture.transport.sent("AttachVolume");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, HostId::from(HOSTS[0]));
}

#[tokio::test]
async fn reserved_device_ids() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 10 * GIB).await;
    let volumes = fixture.volumes();

    for device_id in [0, 3, 16] {
        let error = volumes
            .attach_volume(&attach(&volume, STOPPED_VM, Some(device_id)))
            .await
            .unwrap_err();
        assert!(matches!(error, SvcError::InvalidDeviceId { .. }), "{error:?}");
        assert_eq!(error.class(), ErrorClass::Validation);
        assert_eq!(fixture.volume(&volume.id).vm, None);
    }

    let attached = volumes
        .attach_volume(&attach(&volume, STOPPED_VM, Some(4)))
        .await
        .unwrap();
    assert_eq!(attached.device_id, Some(4));
}

#[tokio::test]
async fn root_volume_stays_on_running_vm() {
    let fixture = fixture().await;
    let root = fixture.root_volume(RUNNING_VM, "nfs").await;

    let error = fixture
        .volumes()
        .detach_volume(&DetachVolume {
            volume: root.id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::InvalidArguments { .. }), "{error:?}");
    assert_eq!(fixture.volume(&root.id).vm, Some(RUNNING_VM.into()));
    assert!(fixture.transport.sent("DetachVolume").is_empty());
}

#[tokio::test]
async fn shrinking_must_be_confirmed() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 20 * GIB).await;
    let volumes = fixture.volumes();
    let resize = |shrink_ok| ResizeVolume {
        volume: volume.id.clone(),
        new_size: Some(10 * GIB),
        shrink_ok,
        ..Default::default()
    };

    let error = volumes.resize_volume(&resize(false)).await.unwrap_err();
    assert!(matches!(error, SvcError::ShrinkNotConfirmed { .. }), "{error:?}");
    assert_eq!(error.class(), ErrorClass::Validation);
    assert!(fixture.transport.sent("ResizeVolume").is_empty());
    assert_eq!(fixture.volume(&volume.id).size, 20 * GIB);

    let resized = volumes.resize_volume(&resize(true)).await.unwrap();
    assert_eq!(resized.size, 10 * GIB);
    assert_eq!(resized.state, VolumeState::Ready);
    assert_eq!(fixture.transport.sent("ResizeVolume").len(), 1);
    assert_eq!(fixture.count(ResourceType::PrimaryStorage), 10 * GIB as i64);
}

#[tokio::test]
async fn snapshot_of_attached_volume() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 10 * GIB).await;
    let volumes = fixture.volumes();
    volumes
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap();

    let snapshot = volumes.snapshot_volume(&snapshot(&volume)).await.unwrap();
    assert_eq!(snapshot.state, SnapshotState::BackedUp);
    assert_eq!(snapshot.physical_size, Some(GIB));
    assert_eq!(
        snapshot.path,
        Some(format!("/secondary/snapshots/{}", snapshot.id))
    );
    assert_eq!(fixture.count(ResourceType::SecondaryStorage), GIB as i64);

    // taken on the host the vm runs on
    let taken = fixture.transport.sent("TakeSnapshot");
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].0, HostId::from(HOSTS[0]));
    assert_eq!(fixture.volume(&volume.id).state, VolumeState::Ready);
    assert_eq!(volumes.get_snapshots(&volume.id).unwrap().len(), 1);
}

#[tokio::test]
async fn failed_backup_is_a_partial_failure() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 10 * GIB).await;
    fixture.transport.fail_command("BackupSnapshot");

    let error = fixture
        .volumes()
        .snapshot_volume(&snapshot(&volume))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::PartialFailure { .. }), "{error:?}");
    assert_eq!(error.class(), ErrorClass::PartialFailure);

    let snapshots = fixture.volumes().get_snapshots(&volume.id).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].state, SnapshotState::Error);
    // the volume is usable again as soon as the snapshot was taken
    assert_eq!(fixture.volume(&volume.id).state, VolumeState::Ready);
    assert_eq!(fixture.count(ResourceType::SecondaryStorage), 0);
}

#[tokio::test]
async fn upload_then_create_and_extract() {
    let fixture = fixture().await;
    let volumes = fixture.volumes();

    let uploaded = volumes
        .upload_volume(&UploadVolume {
            name: "imported".to_string(),
            account: ACCOUNT.into(),
            domain: DOMAIN.into(),
            zone: ZONE.into(),
            url: "https://images.example.org/disk.qcow2".to_string(),
            format: VolumeFormat::Qcow2,
            disk_offering: None,
            size: 5 * GIB,
        })
        .await
        .unwrap();
    assert_eq!(uploaded.state, VolumeState::Uploaded);
    assert_eq!(fixture.count(ResourceType::SecondaryStorage), 5 * GIB as i64);

    let created = volumes
        .create_volume(&CreateVolume {
            volume: uploaded.id.clone(),
            vm: None,
            avoid: vec![],
        })
        .await
        .unwrap();
    assert_eq!(created.state, VolumeState::Ready);
    assert_eq!(fixture.transport.sent("CopyVolumeFromSecondary").len(), 1);

    let url = volumes
        .extract_volume(&ExtractVolume {
            volume: uploaded.id.clone(),
            zone: ZONE.into(),
        })
        .await
        .unwrap();
    assert_eq!(url, format!("https://secondary.{ZONE}/{}", uploaded.id));
    assert_eq!(fixture.volume(&uploaded.id).state, VolumeState::Ready);
}

#[tokio::test]
async fn upload_needs_a_fetchable_url() {
    let fixture = fixture().await;
    let error = fixture
        .volumes()
        .upload_volume(&UploadVolume {
            name: "imported".to_string(),
            account: ACCOUNT.into(),
            domain: DOMAIN.into(),
            zone: ZONE.into(),
            url: "file:///etc/passwd".to_string(),
            format: VolumeFormat::Raw,
            disk_offering: None,
            size: 5 * GIB,
        })
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::InvalidArguments { .. }), "{error:?}");
    assert_eq!(fixture.count(ResourceType::Volume), 0);
}

fn migrate(volume: &VolumeSpec, pool: &str, live_migrate: bool) -> MigrateVolume {
    MigrateVolume {
        volume: volume.id.clone(),
        pool: pool.into(),
        live_migrate,
    }
}

#[tokio::test]
async fn detach_from_running_vm() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 10 * GIB).await;
    let volumes = fixture.volumes();
    volumes
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap();

    let detached = volumes
        .detach_volume(&DetachVolume {
            volume: volume.id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(detached.vm, None);
    assert_eq!(detached.device_id, None);
    let sent = fixture.transport.sent("DetachVolume");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, HostId::from(HOSTS[0]));
}

#[tokio::test]
async fn attach_moves_volume_next_to_the_root_disk() {
    let fixture = Fixture::new(vec![
        cluster_pool("shared", PoolType::NetworkFilesystem, 100 * GIB),
        host_pool("local-2", HOSTS[1], 100 * GIB),
    ])
    .await;
    fixture.root_volume(RUNNING_VM, "shared").await;
    let volume = fixture.placed_volume("data", "local-2").await;
    fixture.transport.clear();

    let attached = fixture
        .volumes()
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap();
    assert_eq!(attached.pool, Some(PoolId::from("shared")));
    assert_eq!(attached.vm, Some(RUNNING_VM.into()));
    assert_eq!(attached.state, VolumeState::Ready);
    assert_eq!(fixture.transport.sent("CopyVolume").len(), 1);
    // the source copy is removed from the host it lived on
    let destroyed = fixture.transport.sent("DestroyVolume");
    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].0, HostId::from(HOSTS[1]));
    assert_eq!(fixture.transport.sent("AttachVolume").len(), 1);
}

#[tokio::test]
async fn local_volumes_are_not_moved_between_hosts() {
    let fixture = Fixture::new(vec![
        host_pool("local-1", HOSTS[0], 100 * GIB),
        host_pool("local-2", HOSTS[1], 100 * GIB),
    ])
    .await;
    fixture.root_volume(RUNNING_VM, "local-1").await;
    let volume = fixture.placed_volume("data", "local-2").await;
    fixture.transport.clear();

    let error = fixture
        .volumes()
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::LocalStorageMove { .. }), "{error:?}");
    let volume = fixture.volume(&volume.id);
    assert_eq!(volume.pool, Some(PoolId::from("local-2")));
    assert_eq!(volume.vm, None);
    assert!(fixture.transport.contacted().is_empty());
}

#[tokio::test]
async fn offline_migration_needs_a_shared_source_and_broader_destination() {
    let fixture = Fixture::new(vec![
        cluster_pool("shared", PoolType::NetworkFilesystem, 100 * GIB),
        zone_pool("nfs", PoolType::NetworkFilesystem, 100 * GIB),
        host_pool("local-2", HOSTS[1], 100 * GIB),
    ])
    .await;
    let volumes = fixture.volumes();
    let local = fixture.placed_volume("data", "local-2").await;
    let shared = fixture.placed_volume("data", "shared").await;
    fixture.transport.clear();

    let error = volumes
        .migrate_volume(&migrate(&local, "nfs", false))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::MigrationNotSupported { .. }), "{error:?}");

    let migrated = volumes
        .migrate_volume(&migrate(&shared, "nfs", false))
        .await
        .unwrap();
    assert_eq!(migrated.pool, Some(PoolId::from("nfs")));
    assert_eq!(migrated.state, VolumeState::Ready);
    assert_eq!(fixture.transport.sent("CopyVolume").len(), 1);
    assert_eq!(fixture.transport.sent("DestroyVolume").len(), 1);

    // and never back to a narrower scope
    let error = volumes
        .migrate_volume(&migrate(&shared, "shared", false))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::MigrationNotSupported { .. }), "{error:?}");
    assert_eq!(fixture.volume(&shared.id).pool, Some(PoolId::from("nfs")));
    assert_eq!(fixture.transport.sent("CopyVolume").len(), 1);
}

#[tokio::test]
async fn live_migration() {
    let fixture = Fixture::new(vec![
        zone_pool("nfs-1", PoolType::NetworkFilesystem, 100 * GIB),
        zone_pool("nfs-2", PoolType::NetworkFilesystem, 100 * GIB),
    ])
    .await;
    let volumes = fixture.volumes();
    let volume = fixture.placed_volume("data", "nfs-1").await;
    volumes
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap();
    fixture.transport.clear();

    let error = volumes
        .migrate_volume(&migrate(&volume, "nfs-2", false))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::MigrationNotSupported { .. }), "{error:?}");
    assert!(fixture.transport.contacted().is_empty());

    let migrated = volumes
        .migrate_volume(&migrate(&volume, "nfs-2", true))
        .await
        .unwrap();
    assert_eq!(migrated.pool, Some(PoolId::from("nfs-2")));
    assert_eq!(migrated.vm, Some(RUNNING_VM.into()));
    let sent = fixture.transport.sent("MigrateVolume");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, HostId::from(HOSTS[0]));
    assert!(fixture.transport.sent("CopyVolume").is_empty());
}

#[tokio::test]
async fn live_migration_needs_storage_motion() {
    let fixture = Fixture::new(vec![
        zone_pool("nfs-1", PoolType::NetworkFilesystem, 100 * GIB),
        zone_pool("nfs-2", PoolType::NetworkFilesystem, 100 * GIB),
    ])
    .await;
    fixture.registry.hypervisors().register(
        Hypervisor::Kvm,
        HypervisorCapabilities {
            max_data_volumes: 14,
            storage_motion: false,
            formats: vec![VolumeFormat::Qcow2, VolumeFormat::Raw],
        },
    );
    let volumes = fixture.volumes();
    let volume = fixture.placed_volume("data", "nfs-1").await;
    volumes
        .attach_volume(&attach(&volume, RUNNING_VM, None))
        .await
        .unwrap();

    let error = volumes
        .migrate_volume(&migrate(&volume, "nfs-2", true))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::MigrationNotSupported { .. }), "{error:?}");
    assert_eq!(fixture.volume(&volume.id).pool, Some(PoolId::from("nfs-1")));
    assert!(fixture.transport.sent("MigrateVolume").is_empty());
}
