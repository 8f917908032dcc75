use super::{zone_pool, Fixture, HOSTS};
use agents::errors::{ErrorClass, SvcError};
use stor_port::types::v0::transport::{
    CreateVolume, DeletePool, DestroyVolume, PoolId, PoolStatus, PoolType, RecoverVolume,
    ResourceType, ScopeType, SetPoolEnabled, VolumeState,
};
use utils::bytes::GIB;

fn pool_id() -> PoolId {
    PoolId::from("nfs")
}

async fn fixture() -> Fixture {
    let pool = zone_pool("nfs", PoolType::NetworkFilesystem, 100 * GIB);
    let fixture = Fixture::new(vec![pool]).await;
    fixture.transport.clear();
    fixture
}

#[tokio::test]
async fn disabled_pools_are_not_allocated() {
    let fixture = fixture().await;
    let pools = fixture.pools();
    let enabled = |enabled| SetPoolEnabled {
        id: pool_id(),
        enabled,
    };

    let pool = pools.set_pool_enabled(&enabled(false)).await.unwrap();
    assert_eq!(pool.status, PoolStatus::Disabled);
    let volume = fixture.allocate("data", 10 * GIB).await;
    let create = CreateVolume {
        volume: volume.id.clone(),
        vm: None,
        avoid: vec![],
    };
    let error = fixture.volumes().create_volume(&create).await.unwrap_err();
    assert!(matches!(error, SvcError::NoSuitablePool { .. }), "{error:?}");

    let pool = pools.set_pool_enabled(&enabled(true)).await.unwrap();
    assert_eq!(pool.status, PoolStatus::Up);
    let created = fixture.volumes().create_volume(&create).await.unwrap();
    assert_eq!(created.pool, Some(pool_id()));
}

#[tokio::test]
async fn no_host_can_connect() {
    let fixture = Fixture::new(vec![]).await;
    for host in HOSTS {
        fixture.transport.set_unavailable(host);
    }

    let error = fixture
        .pools()
        .create_pool(&zone_pool("nfs", PoolType::NetworkFilesystem, 100 * GIB))
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::StorageUnavailable { .. }), "{error:?}");
    assert_eq!(error.class(), ErrorClass::ResourceUnavailable);
    assert!(fixture.registry.specs().pool(&pool_id()).is_err());
}

#[tokio::test]
async fn scope_must_match() {
    let fixture = Fixture::new(vec![]).await;
    let mut request = zone_pool("cluster-pool", PoolType::NetworkFilesystem, 100 * GIB);
    request.scope = ScopeType::Cluster;

    let error = fixture.pools().create_pool(&request).await.unwrap_err();
    assert!(matches!(error, SvcError::InvalidArguments { .. }), "{error:?}");
    assert_eq!(error.class(), ErrorClass::Validation);
    assert!(fixture.transport.contacted().is_empty());
}

#[tokio::test]
async fn delete_pool_with_volumes() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 10 * GIB).await;
    let pools = fixture.pools();
    let delete = |forced| DeletePool {
        id: pool_id(),
        forced,
    };

    let error = pools.delete_pool(&delete(true)).await.unwrap_err();
    assert!(matches!(error, SvcError::InUse { .. }), "{error:?}");

    fixture
        .volumes()
        .destroy_volume(&DestroyVolume {
            volume: volume.id.clone(),
            expunge: false,
        })
        .await
        .unwrap();
    let error = pools.delete_pool(&delete(false)).await.unwrap_err();
    assert!(matches!(error, SvcError::InUse { .. }), "{error:?}");

    // destroyed volumes go away with a forced delete
    pools.delete_pool(&delete(true)).await.unwrap();
    let specs = fixture.registry.specs();
    assert!(specs.pool(&pool_id()).is_err());
    assert!(specs.volume(&volume.id).is_err());
    assert!(specs.host_pool_refs(&pool_id()).is_empty());
    let disconnected = fixture.transport.sent("ModifyStoragePool");
    assert_eq!(disconnected.len(), HOSTS.len());
}

#[tokio::test]
async fn recover_destroyed_volume() {
    let fixture = fixture().await;
    let volume = fixture.ready_volume("data", 10 * GIB).await;
    let volumes = fixture.volumes();

    volumes
        .destroy_volume(&DestroyVolume {
            volume: volume.id.clone(),
            expunge: false,
        })
        .await
        .unwrap();
    assert_eq!(fixture.volume(&volume.id).state, VolumeState::Destroy);
    assert_eq!(fixture.count(ResourceType::Volume), 0);
    assert!(fixture.transport.sent("DestroyVolume").is_empty());

    let recovered = volumes
        .recover_volume(&RecoverVolume {
            volume: volume.id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(recovered.state, VolumeState::Ready);
    assert_eq!(recovered.pool, Some(pool_id()));
    assert_eq!(fixture.count(ResourceType::Volume), 1);
    assert_eq!(fixture.count(ResourceType::PrimaryStorage), 10 * GIB as i64);
}
