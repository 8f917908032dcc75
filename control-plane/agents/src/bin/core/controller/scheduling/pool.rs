//! Storage pool allocation for volume placement.
//!
//! The allocator chain holds an ordered list of strategies and returns the first pool accepted
//! by any of them. Every strategy narrows the candidate pools to its own scope and then applies
//! the same filters: pool status, avoid-set, storage tags and both capacity checks.
use crate::{
    capacity::CapacityTracker,
    controller::{
        registry::Registry,
        scheduling::{
            resources::{PoolItem, PoolItemLister},
            PoolFilters, PoolSorters, ResourceData, ResourceFilter,
        },
    },
};
use std::{collections::HashSet, fmt::Debug};
use stor_port::types::v0::{
    store::pool::StoragePool,
    transport::{ClusterId, HostId, PoolId, ScopeType, VolumeId, ZoneId},
};

/// What the disk asks of a pool.
#[derive(Debug, Clone, Default)]
pub(crate) struct DiskProfile {
    /// The volume being placed.
    pub(crate) volume: VolumeId,
    /// The size of the volume.
    pub(crate) size: u64,
    /// Bytes of the request not yet allocated on any pool.
    pub(crate) asking: u64,
    /// Storage tags the pool must carry.
    pub(crate) tags: Vec<String>,
    /// Place on host local storage.
    pub(crate) use_local_storage: bool,
}

/// Where the disk is to be used.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeploymentContext {
    pub(crate) zone: ZoneId,
    pub(crate) cluster: Option<ClusterId>,
    pub(crate) host: Option<HostId>,
}
impl DeploymentContext {
    /// A context spanning the whole zone.
    pub(crate) fn zone(zone: &ZoneId) -> Self {
        Self {
            zone: zone.clone(),
            cluster: None,
            host: None,
        }
    }
    /// A context narrowed to a cluster of the zone.
    pub(crate) fn cluster(zone: &ZoneId, cluster: &ClusterId) -> Self {
        Self {
            zone: zone.clone(),
            cluster: Some(cluster.clone()),
            host: None,
        }
    }
}

/// The outcome of an allocation attempt.
#[derive(Debug, Clone)]
pub(crate) enum Allocation {
    /// A suitable pool was found.
    Found(StoragePool),
    /// No strategy found a suitable pool.
    NotFound,
}
impl Allocation {
    /// Convert into an `Option`.
    pub(crate) fn found(self) -> Option<StoragePool> {
        match self {
            Allocation::Found(pool) => Some(pool),
            Allocation::NotFound => None,
        }
    }
}

/// The context to select suitable pools for volume placement.
#[derive(Clone)]
pub(crate) struct GetSuitablePoolsContext {
    registry: Registry,
    profile: DiskProfile,
    deployment: DeploymentContext,
    avoid: HashSet<PoolId>,
}
impl GetSuitablePoolsContext {
    /// Get the registry.
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }
    /// What the disk asks of a pool.
    pub(crate) fn profile(&self) -> &DiskProfile {
        &self.profile
    }
    /// Where the disk is to be used.
    pub(crate) fn deployment(&self) -> &DeploymentContext {
        &self.deployment
    }
    /// Pools which must not be returned.
    pub(crate) fn avoid(&self) -> &HashSet<PoolId> {
        &self.avoid
    }
    /// The capacity tracker.
    pub(crate) fn capacity(&self) -> CapacityTracker<'_> {
        CapacityTracker::new(&self.registry)
    }
}

/// Selects the best pool candidates of a single strategy.
pub(crate) struct SuitablePools {
    data: ResourceData<GetSuitablePoolsContext, PoolItem>,
}

impl SuitablePools {
    fn builder<F: Fn(&StoragePool) -> bool>(context: GetSuitablePoolsContext, scope: F) -> Self {
        let list = PoolItemLister::list(context.registry(), scope);
        Self {
            data: ResourceData::new(context, list),
        }
    }
    /// Default rules for pool selection.
    fn builder_with_defaults<F: Fn(&StoragePool) -> bool>(
        context: GetSuitablePoolsContext,
        scope: F,
    ) -> Self {
        Self::builder(context, scope)
            .filter(PoolFilters::up)
            .filter(PoolFilters::not_avoided)
            .filter(PoolFilters::locality)
            .filter(PoolFilters::tags)
            .filter(PoolFilters::used_space)
            .filter(PoolFilters::allocated_space)
            .sort(PoolSorters::sort_by_free_space)
    }
}

impl ResourceFilter for SuitablePools {
    type Request = GetSuitablePoolsContext;
    type Item = PoolItem;

    fn data(&mut self) -> &mut ResourceData<Self::Request, Self::Item> {
        &mut self.data
    }

    fn collect(self) -> Vec<Self::Item> {
        self.data.list
    }
}

/// A pool allocation strategy.
pub(crate) trait PoolAllocator: Send + Sync + Debug {
    /// Name of the strategy, for logging.
    fn name(&self) -> &'static str;
    /// Whether the strategy handles this disk in this context at all.
    fn applies(&self, profile: &DiskProfile, deployment: &DeploymentContext) -> bool;
    /// Whether the pool is within the strategy's scope of the deployment context.
    fn in_scope(&self, deployment: &DeploymentContext, pool: &StoragePool) -> bool;

    /// Select the best pool for the request.
    fn select(&self, context: &GetSuitablePoolsContext) -> Allocation {
        if !self.applies(context.profile(), context.deployment()) {
            return Allocation::NotFound;
        }
        let deployment = context.deployment().clone();
        let candidates = SuitablePools::builder_with_defaults(context.clone(), |pool| {
            self.in_scope(&deployment, pool)
        })
        .collect();
        match candidates.into_iter().next() {
            Some(item) => Allocation::Found(item.collect()),
            None => Allocation::NotFound,
        }
    }
}

/// Allocates host local pools, on the deployment host or anywhere in the deployment cluster.
#[derive(Debug, Default)]
pub(crate) struct LocalAllocator {}
impl PoolAllocator for LocalAllocator {
    fn name(&self) -> &'static str {
        "local"
    }
    fn applies(&self, profile: &DiskProfile, deployment: &DeploymentContext) -> bool {
        profile.use_local_storage && (deployment.host.is_some() || deployment.cluster.is_some())
    }
    fn in_scope(&self, deployment: &DeploymentContext, pool: &StoragePool) -> bool {
        if pool.scope != ScopeType::Host || pool.zone != deployment.zone {
            return false;
        }
        match &deployment.host {
            Some(host) => pool.host.as_ref() == Some(host),
            None => pool.cluster.is_some() && pool.cluster == deployment.cluster,
        }
    }
}

/// Allocates cluster wide pools of the deployment cluster.
#[derive(Debug, Default)]
pub(crate) struct ClusterScopeAllocator {}
impl PoolAllocator for ClusterScopeAllocator {
    fn name(&self) -> &'static str {
        "cluster"
    }
    fn applies(&self, profile: &DiskProfile, deployment: &DeploymentContext) -> bool {
        !profile.use_local_storage && deployment.cluster.is_some()
    }
    fn in_scope(&self, deployment: &DeploymentContext, pool: &StoragePool) -> bool {
        pool.scope == ScopeType::Cluster
            && pool.zone == deployment.zone
            && pool.cluster.is_some()
            && pool.cluster == deployment.cluster
    }
}

/// Allocates zone wide pools.
#[derive(Debug, Default)]
pub(crate) struct ZoneWideAllocator {}
impl PoolAllocator for ZoneWideAllocator {
    fn name(&self) -> &'static str {
        "zone"
    }
    fn applies(&self, profile: &DiskProfile, _deployment: &DeploymentContext) -> bool {
        !profile.use_local_storage
    }
    fn in_scope(&self, deployment: &DeploymentContext, pool: &StoragePool) -> bool {
        pool.scope == ScopeType::Zone && pool.zone == deployment.zone
    }
}

/// An ordered chain of allocation strategies.
/// The first strategy to find a pool ends the search.
#[derive(Debug)]
pub(crate) struct AllocatorChain {
    allocators: Vec<Box<dyn PoolAllocator>>,
}

impl Default for AllocatorChain {
    fn default() -> Self {
        Self::new(vec![
            Box::<LocalAllocator>::default(),
            Box::<ClusterScopeAllocator>::default(),
            Box::<ZoneWideAllocator>::default(),
        ])
    }
}

impl AllocatorChain {
    /// Create a chain with the given strategies, in priority order.
    pub(crate) fn new(allocators: Vec<Box<dyn PoolAllocator>>) -> Self {
        Self { allocators }
    }

    /// Find a pool for the disk in the deployment context, never returning a pool from `avoid`.
    pub(crate) fn allocate(
        &self,
        registry: &Registry,
        profile: &DiskProfile,
        deployment: &DeploymentContext,
        avoid: &HashSet<PoolId>,
    ) -> Allocation {
        let context = GetSuitablePoolsContext {
            registry: registry.clone(),
            profile: profile.clone(),
            deployment: deployment.clone(),
            avoid: avoid.clone(),
        };
        for allocator in &self.allocators {
            if let Allocation::Found(pool) = allocator.select(&context) {
                tracing::debug!(
                    volume.id = %profile.volume,
                    pool.id = %pool.id,
                    allocator = allocator.name(),
                    "Found a suitable pool"
                );
                return Allocation::Found(pool);
            }
        }
        tracing::debug!(volume.id = %profile.volume, ?deployment, "No suitable pool found");
        Allocation::NotFound
    }
}
