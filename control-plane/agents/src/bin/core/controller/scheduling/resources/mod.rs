use crate::{capacity::CapacityTracker, controller::registry::Registry};
use stor_port::types::v0::store::pool::StoragePool;

/// Item for pool scheduling logic.
#[derive(Debug, Clone)]
pub(crate) struct PoolItem {
    /// The pool.
    pub(crate) pool: StoragePool,
    /// Bytes allocated to the volumes already on the pool.
    pub(crate) allocated: u64,
    /// The pool capacity, adjusted by over-provisioning.
    pub(crate) adjusted_total: u64,
}

impl PoolItem {
    /// Create a new `Self`.
    pub(crate) fn new(pool: StoragePool, allocated: u64, adjusted_total: u64) -> Self {
        Self {
            pool,
            allocated,
            adjusted_total,
        }
    }
    /// Unallocated bytes of the pool.
    pub(crate) fn free(&self) -> u64 {
        self.adjusted_total.saturating_sub(self.allocated)
    }
    /// Collect the item into a pool.
    pub(crate) fn collect(self) -> StoragePool {
        self.pool
    }
}

/// A pool lister.
#[derive(Default)]
pub(crate) struct PoolItemLister {}

impl PoolItemLister {
    /// Get a list of pool items matching `predicate`.
    pub(crate) fn list<F: Fn(&StoragePool) -> bool>(
        registry: &Registry,
        predicate: F,
    ) -> Vec<PoolItem> {
        let capacity = CapacityTracker::new(registry);
        registry
            .specs()
            .pools()
            .into_iter()
            .filter(|pool| predicate(pool))
            .map(|pool| {
                let allocated = capacity.allocated_bytes(&pool.id);
                let adjusted_total = capacity.adjusted_total(&pool);
                PoolItem::new(pool, allocated, adjusted_total)
            })
            .collect()
    }
}
