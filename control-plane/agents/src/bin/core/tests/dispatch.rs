use super::{zone_pool, Fixture, HOSTS};
use crate::host::dispatcher::CommandDispatcher;
use agents::errors::{ErrorClass, SvcError};
use stor_port::types::v0::transport::{Answer, Command, HostId, PoolId, PoolType};
use utils::bytes::GIB;

fn stats(fixture: &Fixture) -> Command {
    Command::GetStorageStats {
        pool: fixture.registry.specs().pool(&pool_id()).unwrap().target(),
    }
}
fn pool_id() -> PoolId {
    PoolId::from("nfs")
}
fn hosts(ids: &[&str]) -> Vec<HostId> {
    ids.iter().map(|id| HostId::from(*id)).collect()
}

async fn fixture() -> Fixture {
    let pool = zone_pool("nfs", PoolType::NetworkFilesystem, 100 * GIB);
    let fixture = Fixture::new(vec![pool]).await;
    fixture.transport.clear();
    fixture
}

#[tokio::test]
async fn fails_over_unavailable_hosts() {
    let fixture = fixture().await;
    fixture.transport.set_unavailable(HOSTS[0]);
    fixture.transport.set_unavailable(HOSTS[1]);

    let dispatched = CommandDispatcher::new(&fixture.registry)
        .send(&pool_id(), vec![stats(&fixture)], &hosts(&HOSTS), &[])
        .await
        .unwrap();
    assert_eq!(dispatched.host, HostId::from(HOSTS[2]));
    assert!(matches!(dispatched.answer(), Some(Answer::StorageStats { .. })));
    // each host was tried exactly once, in the preferred order
    assert_eq!(fixture.transport.contacted(), hosts(&HOSTS));
}

#[tokio::test]
async fn no_host_available() {
    let fixture = fixture().await;
    for host in HOSTS {
        fixture.transport.set_unavailable(host);
    }

    let error = CommandDispatcher::new(&fixture.registry)
        .send(&pool_id(), vec![stats(&fixture)], &[], &[])
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::StorageUnavailable { .. }), "{error:?}");
    assert_eq!(error.class(), ErrorClass::ResourceUnavailable);
    let mut contacted = fixture.transport.contacted();
    contacted.sort();
    assert_eq!(contacted, hosts(&HOSTS));
}

#[tokio::test]
async fn command_failures_do_not_fail_over() {
    let fixture = fixture().await;
    fixture.transport.fail_command("GetStorageStats");

    let error = CommandDispatcher::new(&fixture.registry)
        .send(&pool_id(), vec![stats(&fixture)], &hosts(&[HOSTS[1]]), &[])
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::HostCommand { .. }), "{error:?}");
    assert_eq!(fixture.transport.contacted(), hosts(&[HOSTS[1]]));
}

#[tokio::test]
async fn missing_answers_are_a_failure() {
    let fixture = fixture().await;
    fixture.transport.short_answer("GetStorageStats");

    let commands = vec![stats(&fixture), stats(&fixture)];
    let error = CommandDispatcher::new(&fixture.registry)
        .send_to_host(&HostId::from(HOSTS[0]), commands)
        .await
        .unwrap_err();
    assert!(matches!(error, SvcError::HostCommand { .. }), "{error:?}");
    assert_eq!(fixture.transport.contacted(), hosts(&[HOSTS[0], HOSTS[0]]));
}

#[tokio::test]
async fn candidates() {
    let fixture = fixture().await;
    let dispatcher = CommandDispatcher::new(&fixture.registry);

    let candidates = dispatcher.candidates(&pool_id(), &hosts(&[HOSTS[2], HOSTS[0]]), &[]);
    let candidates = candidates.into_iter().map(|host| host.id).collect::<Vec<_>>();
    assert_eq!(candidates, hosts(&[HOSTS[2], HOSTS[0], HOSTS[1]]));

    let candidates = dispatcher.candidates(&pool_id(), &[], &hosts(&[HOSTS[1]]));
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|host| host.id != HostId::from(HOSTS[1])));
}
