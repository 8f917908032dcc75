use super::{cluster_pool, zone_pool, Fixture, HOSTS, RUNNING_VM, STOPPED_VM};
use agents::errors::{ErrorClass, SvcError};
use stor_port::types::v0::{
    store::work_item::StoragePoolWorkItem,
    transport::{
        CancelMaintenance, CreatePool, HostId, HostStatus, PoolId, PoolStatus, PoolType,
        PrepareMaintenance, VmId, VmState,
    },
};
use utils::bytes::GIB;

async fn fixture(pools: &[&str]) -> Fixture {
    let pools = pools
        .iter()
        .map(|id| zone_pool(id, PoolType::NetworkFilesystem, 100 * GIB))
        .collect();
    seeded(pools).await
}

async fn cluster_fixture(pools: &[&str]) -> Fixture {
    let pools = pools
        .iter()
        .map(|id| cluster_pool(id, PoolType::NetworkFilesystem, 100 * GIB))
        .collect();
    seeded(pools).await
}

/// Both vms boot off pool-1.
async fn seeded(pools: Vec<CreatePool>) -> Fixture {
    let fixture = Fixture::new(pools).await;
    fixture.root_volume(RUNNING_VM, "pool-1").await;
    fixture.root_volume(STOPPED_VM, "pool-1").await;
    fixture.transport.clear();
    fixture
}

fn work_items(fixture: &Fixture) -> Vec<StoragePoolWorkItem> {
    fixture.registry.specs().work_items(&PoolId::from("pool-1"))
}

async fn prepare(fixture: &Fixture) -> Result<PoolStatus, SvcError> {
    let request = PrepareMaintenance {
        id: "pool-1".into(),
    };
    Ok(fixture.pools().prepare_maintenance(&request).await?.status)
}

async fn cancel(fixture: &Fixture) -> Result<PoolStatus, SvcError> {
    let request = CancelMaintenance {
        id: "pool-1".into(),
    };
    Ok(fixture.pools().cancel_maintenance(&request).await?.status)
}

#[tokio::test]
async fn restarts_vms_elsewhere() {
    let fixture = fixture(&["pool-1", "pool-2"]).await;

    assert_eq!(prepare(&fixture).await.unwrap(), PoolStatus::Maintenance);
    // only the running vm gets a work item
    let items = work_items(&fixture);
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.vm, VmId::from(RUNNING_VM));
    assert_eq!(&item.owner, fixture.registry.node_id());
    assert!(item.stopped_for_maintenance);
    assert!(item.started_after_maintenance);

    let vm = fixture.vm(RUNNING_VM);
    assert_eq!(vm.state, VmState::Running);
    assert_eq!(vm.host, Some(HostId::from(HOSTS[0])));
    assert_eq!(fixture.transport.sent("StopVm").len(), 1);
    assert_eq!(fixture.transport.sent("StartVm").len(), 1);
    assert_eq!(fixture.transport.sent("StoragePoolHeartbeat").len(), HOSTS.len());
    assert!(fixture.registry.specs().jobs().is_empty());

    assert_eq!(cancel(&fixture).await.unwrap(), PoolStatus::Up);
    assert!(work_items(&fixture).is_empty());
    // the vm was already restarted
    assert_eq!(fixture.transport.sent("StartVm").len(), 1);
}

#[tokio::test]
async fn restarts_vms_on_cancel() {
    let fixture = fixture(&["pool-1"]).await;

    assert_eq!(prepare(&fixture).await.unwrap(), PoolStatus::Maintenance);
    let items = work_items(&fixture);
    assert_eq!(items.len(), 1);
    assert!(items[0].stopped_for_maintenance);
    assert!(!items[0].started_after_maintenance);
    let vm = fixture.vm(RUNNING_VM);
    assert_eq!(vm.state, VmState::Stopped);
    assert_eq!(vm.host, None);
    assert_eq!(vm.last_host, Some(HostId::from(HOSTS[0])));

    assert_eq!(cancel(&fixture).await.unwrap(), PoolStatus::Up);
    assert!(work_items(&fixture).is_empty());
    let vm = fixture.vm(RUNNING_VM);
    assert_eq!(vm.state, VmState::Running);
    // back on its last host
    let started = fixture.transport.sent("StartVm");
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].0, HostId::from(HOSTS[0]));
}

#[tokio::test]
async fn failed_prepare_parks_in_error() {
    let fixture = fixture(&["pool-1", "pool-2"]).await;
    fixture.transport.fail_command("StopVm");

    let error = prepare(&fixture).await.unwrap_err();
    assert_eq!(error.class(), ErrorClass::Internal, "{error:?}");
    let pool = fixture.registry.specs().pool(&"pool-1".into()).unwrap();
    assert_eq!(pool.status, PoolStatus::ErrorInMaintenance);
    let items = work_items(&fixture);
    assert_eq!(items.len(), 1);
    assert!(!items[0].stopped_for_maintenance);
    assert_eq!(fixture.vm(RUNNING_VM).state, VmState::Running);

    // the operator backs out
    assert_eq!(cancel(&fixture).await.unwrap(), PoolStatus::Up);
    assert!(work_items(&fixture).is_empty());
}

#[tokio::test]
async fn one_pool_of_a_cluster_at_a_time() {
    let fixture = cluster_fixture(&["pool-1", "pool-2"]).await;
    let other = fixture.registry.specs().pool_rsc(&"pool-2".into()).unwrap();
    other.lock().status = PoolStatus::PrepareForMaintenance;

    let error = prepare(&fixture).await.unwrap_err();
    assert!(matches!(error, SvcError::MaintenanceConflict { .. }), "{error:?}");
    assert_eq!(error.class(), ErrorClass::Conflict);
    let pool = fixture.registry.specs().pool(&"pool-1".into()).unwrap();
    assert_eq!(pool.status, PoolStatus::Up);
    assert!(fixture.transport.sent("StopVm").is_empty());
}

#[tokio::test]
async fn zone_pools_prepare_independently() {
    let fixture = fixture(&["pool-1", "pool-2"]).await;
    let other = fixture.registry.specs().pool_rsc(&"pool-2".into()).unwrap();
    other.lock().status = PoolStatus::PrepareForMaintenance;

    assert_eq!(prepare(&fixture).await.unwrap(), PoolStatus::Maintenance);
    // no other pool is up, so the vm stays stopped
    assert_eq!(fixture.vm(RUNNING_VM).state, VmState::Stopped);
    assert_eq!(fixture.transport.sent("StopVm").len(), 1);
    assert!(fixture.transport.sent("StartVm").is_empty());
}

#[tokio::test]
async fn unreachable_pool() {
    let fixture = fixture(&["pool-1"]).await;
    for mut host in fixture.registry.specs().hosts() {
        host.status = HostStatus::Down;
        fixture.registry.specs().insert_host(host);
    }

    assert_eq!(prepare(&fixture).await.unwrap(), PoolStatus::Maintenance);
    assert!(work_items(&fixture).is_empty());
    assert!(fixture.transport.contacted().is_empty());
}

#[tokio::test]
async fn invalid_transitions() {
    let fixture = fixture(&["pool-1"]).await;

    let error = cancel(&fixture).await.unwrap_err();
    assert!(matches!(error, SvcError::InvalidPoolStatus { .. }), "{error:?}");

    assert_eq!(prepare(&fixture).await.unwrap(), PoolStatus::Maintenance);
    let error = prepare(&fixture).await.unwrap_err();
    assert!(matches!(error, SvcError::InvalidPoolStatus { .. }), "{error:?}");
}
