use super::{zone_pool, Fixture, RUNNING_VM};
use crate::cluster;
use stor_port::types::v0::{
    store::{
        node::ControlPlaneNode,
        vm_work::{JobStatus, VmWorkJob},
        work_item::StoragePoolWorkItem,
    },
    transport::{JobId, NodeId, PoolId, PoolStatus, PoolType, VmId},
};
use utils::bytes::GIB;

/// A node which last heartbeat an hour ago.
async fn departed_node(fixture: &Fixture, id: &str) -> NodeId {
    let node = ControlPlaneNode {
        id: id.into(),
        heartbeat: chrono::Utc::now() - chrono::Duration::hours(1),
        departed: false,
    };
    fixture.registry.store_obj(&node).await.unwrap();
    fixture.registry.specs().insert_node(node);
    id.into()
}

#[tokio::test]
async fn recovers_work_of_departed_nodes() {
    let fixture = Fixture::new(vec![zone_pool("pool-1", PoolType::NetworkFilesystem, GIB)]).await;
    let registry = &fixture.registry;
    let specs = registry.specs();
    let pool_id = PoolId::from("pool-1");
    let gone = departed_node(&fixture, "node-gone").await;
    cluster::heartbeat(registry).await.unwrap();

    // the departed node was half way through preparing the pool for maintenance
    let pool = specs.pool_rsc(&pool_id).unwrap();
    pool.persist_with(registry, |pool| {
        pool.status = PoolStatus::PrepareForMaintenance;
        Ok(())
    })
    .await
    .unwrap();
    let item = StoragePoolWorkItem::new(&pool_id, &VmId::from(RUNNING_VM), &gone);
    registry.store_obj(&item).await.unwrap();
    specs.insert_work_item(item);

    // and running a vm work job
    let job = VmWorkJob {
        id: JobId::new(),
        vm: RUNNING_VM.into(),
        dispatcher: "VirtualMachineManager".to_string(),
        handler: "StopVm".to_string(),
        payload: serde_json::json!({ "handler": "StopVm", "vm": RUNNING_VM, "forced": false }),
        status: JobStatus::InProgress,
        result: None,
        error: None,
        owner: gone.clone(),
        created: chrono::Utc::now(),
    };
    registry.store_obj(&job).await.unwrap();
    specs.insert_job(job.clone());

    let departed = cluster::recover_departed(registry, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(departed.len(), 1);
    assert_eq!(departed[0].id, gone);
    assert!(departed[0].departed);

    assert_eq!(
        specs.pool(&pool_id).unwrap().status,
        PoolStatus::ErrorInMaintenance
    );
    assert!(specs.work_items(&pool_id).is_empty());
    let job = specs.job_rsc(&job.id).unwrap().lock().clone();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());

    // departed nodes are only recovered once
    let departed = cluster::recover_departed(registry, chrono::Utc::now())
        .await
        .unwrap();
    assert!(departed.is_empty());
}

#[tokio::test]
async fn live_nodes_are_left_alone() {
    let fixture = Fixture::new(vec![]).await;
    let registry = &fixture.registry;
    cluster::heartbeat(registry).await.unwrap();
    let peer = ControlPlaneNode::new(&NodeId::from("node-peer"));
    registry.store_obj(&peer).await.unwrap();
    registry.specs().insert_node(peer);

    let departed = cluster::recover_departed(registry, chrono::Utc::now())
        .await
        .unwrap();
    assert!(departed.is_empty());

    // this node never considers itself departed, however late its heartbeat
    let later = chrono::Utc::now() + chrono::Duration::hours(1);
    let departed = cluster::recover_departed(registry, later).await.unwrap();
    assert_eq!(departed.len(), 1);
    assert_eq!(departed[0].id, NodeId::from("node-peer"));
}

#[tokio::test]
async fn recovers_previous_incarnation_jobs() {
    let fixture = Fixture::new(vec![]).await;
    let registry = &fixture.registry;
    let job = VmWorkJob {
        id: JobId::new(),
        vm: RUNNING_VM.into(),
        dispatcher: "VirtualMachineManager".to_string(),
        handler: "StartVm".to_string(),
        payload: serde_json::json!({ "handler": "StartVm", "vm": RUNNING_VM }),
        status: JobStatus::InProgress,
        result: None,
        error: None,
        owner: registry.node_id().clone(),
        created: chrono::Utc::now(),
    };
    registry.store_obj(&job).await.unwrap();
    registry.specs().insert_job(job.clone());

    crate::vm_work::fail_orphaned_jobs(registry, registry.node_id())
        .await
        .unwrap();
    let job = registry.specs().job_rsc(&job.id).unwrap().lock().clone();
    assert_eq!(job.status, JobStatus::Failed);
}
