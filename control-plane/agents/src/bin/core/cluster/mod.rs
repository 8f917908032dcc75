//! Membership of the control-plane nodes sharing the persistent store.
//!
//! Every node heartbeats its record. A node whose heartbeat is older than the deadline has
//! departed: the maintenance work items and the vm work jobs it owned are recovered by the
//! node which notices it.
use crate::{controller::registry::Registry, pool::maintenance, vm_work};
use agents::errors::SvcError;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::store::node::ControlPlaneNode,
};

/// Run the membership loop of this node.
pub(crate) async fn membership(registry: Registry) {
    // jobs owned by a previous incarnation of this node will never complete
    if let Err(error) = vm_work::fail_orphaned_jobs(&registry, registry.node_id()).await {
        tracing::error!(
            node.id = %registry.node_id(),
            error = error.full_string(),
            "Failed to fail the stale vm work jobs"
        );
    }
    let period = registry.config().heartbeat_period;
    loop {
        if let Err(error) = heartbeat(&registry).await {
            tracing::warn!(
                node.id = %registry.node_id(),
                error = error.full_string(),
                "Failed to heartbeat"
            );
        }
        if let Err(error) = recover_departed(&registry, chrono::Utc::now()).await {
            tracing::error!(error = error.full_string(), "Failed to recover departed nodes");
        }
        tokio::time::sleep(period).await;
    }
}

/// Persist a fresh heartbeat of this node.
pub(crate) async fn heartbeat(registry: &Registry) -> Result<(), SvcError> {
    let node = ControlPlaneNode::new(registry.node_id());
    registry.store_obj(&node).await?;
    registry.specs().insert_node(node);
    Ok(())
}

/// Find the nodes whose heartbeat expired and recover the work they owned.
/// Returns the nodes found departed.
pub(crate) async fn recover_departed(
    registry: &Registry,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<ControlPlaneNode>, SvcError> {
    let deadline = registry.config().node_deadline;
    let expired = registry
        .specs()
        .control_plane_nodes()
        .into_iter()
        .map(|node| node.lock().clone())
        .filter(|node| &node.id != registry.node_id() && !node.departed)
        .filter(|node| node.expired(now, deadline))
        .collect::<Vec<_>>();

    let mut departed = Vec::with_capacity(expired.len());
    for node in expired {
        tracing::warn!(
            node.id = %node.id,
            heartbeat = %node.heartbeat,
            "Control-plane node departed, recovering its work"
        );
        maintenance::recover_departed(registry, &node.id).await?;
        vm_work::fail_orphaned_jobs(registry, &node.id).await?;
        let node = ControlPlaneNode {
            departed: true,
            ..node
        };
        registry.store_obj(&node).await?;
        registry.specs().insert_node(node.clone());
        departed.push(node);
    }
    Ok(departed)
}
