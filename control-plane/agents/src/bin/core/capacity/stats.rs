use crate::{
    capacity::CapacityTracker, controller::registry::Registry, host::dispatcher::CommandDispatcher,
};
use agents::errors::SvcError;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use stor_port::{
    transport_api::ErrorChain,
    types::v0::transport::{Answer, Command, HostId, PoolId, StorageStats},
};

/// A stats sample and when it was taken.
#[derive(Debug, Clone, Copy)]
struct StatsSample {
    stats: StorageStats,
    taken: Instant,
}
impl StatsSample {
    fn new(stats: StorageStats) -> Self {
        Self {
            stats,
            taken: Instant::now(),
        }
    }
    fn recent(&self, max_age: Duration) -> bool {
        self.taken.elapsed() <= max_age
    }
}

/// The latest pool level and host level stats samples.
/// Host level samples are reported by the hosts for their local pools.
#[derive(Debug, Default)]
pub(crate) struct StatsCache {
    pools: RwLock<HashMap<PoolId, StatsSample>>,
    hosts: RwLock<HashMap<(HostId, PoolId), StatsSample>>,
}

impl StatsCache {
    /// Record a pool level sample.
    pub(crate) fn record_pool(&self, pool: &PoolId, stats: StorageStats) {
        self.pools
            .write()
            .insert(pool.clone(), StatsSample::new(stats));
    }
    /// Record a host level sample.
    pub(crate) fn record_host(&self, host: &HostId, pool: &PoolId, stats: StorageStats) {
        self.hosts
            .write()
            .insert((host.clone(), pool.clone()), StatsSample::new(stats));
    }
    /// The pool level sample if recent, otherwise the most recent host level sample.
    pub(crate) fn recent(&self, pool: &PoolId, max_age: Duration) -> Option<StorageStats> {
        if let Some(sample) = self.pools.read().get(pool) {
            if sample.recent(max_age) {
                return Some(sample.stats);
            }
        }
        self.hosts
            .read()
            .iter()
            .filter(|((_, p), sample)| p == pool && sample.recent(max_age))
            .max_by_key(|(_, sample)| sample.taken)
            .map(|(_, sample)| sample.stats)
    }
    /// Forget every sample of the pool.
    pub(crate) fn remove_pool(&self, pool: &PoolId) {
        self.pools.write().remove(pool);
        self.hosts.write().retain(|(_, p), _| p != pool);
    }
}

/// Fetch the stats of every Up pool through the dispatcher and refresh its capacity records.
pub(crate) async fn poll_pool_stats(registry: &Registry) {
    for pool in registry.specs().pools() {
        if !pool.is_up() {
            continue;
        }
        if let Err(error) = poll_pool(registry, &pool.id).await {
            tracing::warn!(
                pool.id = %pool.id,
                error = error.full_string(),
                "Failed to fetch the pool stats"
            );
        }
    }
}

async fn poll_pool(registry: &Registry, pool_id: &PoolId) -> Result<(), SvcError> {
    let pool = registry.specs().pool(pool_id)?;
    let dispatched = CommandDispatcher::new(registry)
        .send(
            &pool.id,
            vec![Command::GetStorageStats {
                pool: pool.target(),
            }],
            &[],
            &[],
        )
        .await?;
    if let Some(Answer::StorageStats { stats }) = dispatched.answer() {
        if pool.is_local() {
            registry.stats().record_host(&dispatched.host, &pool.id, *stats);
        } else {
            registry.stats().record_pool(&pool.id, *stats);
        }
    }
    CapacityTracker::new(registry).recalculate(&pool.id).await
}

/// Poll the pool stats forever, with the configured period.
pub(crate) async fn poller(registry: Registry) {
    let period = registry.config().stats_period;
    loop {
        poll_pool_stats(&registry).await;
        tokio::time::sleep(period).await;
    }
}
