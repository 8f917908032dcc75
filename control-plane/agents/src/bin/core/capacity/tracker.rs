use crate::controller::registry::Registry;
use agents::errors::SvcError;
use stor_port::types::v0::{
    store::{
        capacity::{CapacityKind, CapacityRecord},
        definitions::{ObjectKey, StorableObject},
        pool::StoragePool,
        volume::VolumeSpec,
    },
    transport::{PoolId, VolumeState},
};

/// Tracks the allocated and used capacity of the pools.
/// The over-provisioning factor only applies to network filesystem pools.
pub(crate) struct CapacityTracker<'a> {
    registry: &'a Registry,
}

impl<'a> CapacityTracker<'a> {
    /// Create a new `Self` on top of the registry.
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Bytes allocated on the pool: the sizes of every volume placed on it which was not
    /// expunged yet.
    pub(crate) fn allocated_bytes(&self, pool: &PoolId) -> u64 {
        self.registry
            .specs()
            .pool_volumes(pool)
            .iter()
            .filter(|volume| volume.state != VolumeState::Expunged)
            .map(|volume| volume.size)
            .sum()
    }

    /// The over-provisioning factor which applies to the pool.
    pub(crate) fn over_provisioning(&self, pool: &StoragePool) -> f64 {
        if pool.pool_type.is_network_filesystem() {
            pool.over_provisioning
                .unwrap_or(self.registry.config().over_provisioning)
        } else {
            1.0
        }
    }

    /// The pool capacity adjusted by its over-provisioning factor.
    pub(crate) fn adjusted_total(&self, pool: &StoragePool) -> u64 {
        (pool.capacity_bytes as f64 * self.over_provisioning(pool)) as u64
    }

    /// Bytes of the given volumes which are not yet allocated.
    /// Ready volumes are already accounted for by the pool they live on.
    pub(crate) fn asking_bytes(volumes: &[VolumeSpec]) -> u64 {
        volumes
            .iter()
            .filter(|volume| volume.state != VolumeState::Ready)
            .map(|volume| volume.size)
            .sum()
    }

    /// Used space check, which fails closed when there's no recent pool or host stats sample.
    pub(crate) fn has_used_space(&self, pool: &StoragePool) -> bool {
        let config = self.registry.config();
        let stats = match self.registry.stats().recent(&pool.id, config.stats_max_age) {
            Some(stats) => stats,
            None => {
                tracing::debug!(pool.id = %pool.id, "No recent stats sample for the pool");
                return false;
            }
        };
        let total = if stats.capacity_bytes > 0 {
            stats.capacity_bytes
        } else {
            pool.capacity_bytes
        };
        if total == 0 {
            return false;
        }
        let usage = stats.used_bytes as f64 / total as f64;
        let fits = usage < config.used_threshold;
        if !fits {
            tracing::debug!(
                pool.id = %pool.id,
                usage,
                threshold = config.used_threshold,
                "Pool used space exceeds the threshold"
            );
        }
        fits
    }

    /// Allocated space check: `(allocated + asking) / adjusted_total <= allocated_threshold`.
    pub(crate) fn has_allocated_space(
        &self,
        pool: &StoragePool,
        allocated: u64,
        asking: u64,
    ) -> bool {
        let adjusted_total = self.adjusted_total(pool);
        if adjusted_total == 0 {
            return false;
        }
        let threshold = self.registry.config().allocated_threshold;
        let usage = (allocated + asking) as f64 / adjusted_total as f64;
        let fits = usage <= threshold;
        if !fits {
            tracing::debug!(
                pool.id = %pool.id,
                allocated,
                asking,
                adjusted_total,
                threshold,
                "Pool allocated space exceeds the threshold"
            );
        }
        fits
    }

    /// Check whether the pool can take the given volumes.
    pub(crate) fn has_enough_space(&self, pool: &StoragePool, volumes: &[VolumeSpec]) -> bool {
        let asking = Self::asking_bytes(volumes);
        self.has_used_space(pool)
            && self.has_allocated_space(pool, self.allocated_bytes(&pool.id), asking)
    }

    /// Check whether the pool can take the growth of a volume it already holds.
    pub(crate) fn has_space_for_resize(&self, pool: &StoragePool, current: u64, new: u64) -> bool {
        let asking = new.saturating_sub(current);
        asking == 0
            || (self.has_used_space(pool)
                && self.has_allocated_space(pool, self.allocated_bytes(&pool.id), asking))
    }

    /// Recompute and persist the capacity records of the pool.
    pub(crate) async fn recalculate(&self, pool_id: &PoolId) -> Result<(), SvcError> {
        let pool = self.registry.specs().pool(pool_id)?;
        let allocated = CapacityRecord {
            pool: pool.id.clone(),
            kind: CapacityKind::StorageAllocated,
            used: self.allocated_bytes(&pool.id),
            total: self.adjusted_total(&pool),
        };
        self.store(allocated).await?;

        let config = self.registry.config();
        if let Some(stats) = self.registry.stats().recent(&pool.id, config.stats_max_age) {
            let used = CapacityRecord {
                pool: pool.id.clone(),
                kind: CapacityKind::StorageUsed,
                used: stats.used_bytes,
                total: stats.capacity_bytes,
            };
            self.store(used).await?;
        }
        Ok(())
    }

    async fn store(&self, record: CapacityRecord) -> Result<(), SvcError> {
        if self.registry.specs().capacity(&record.pool, record.kind).as_ref() == Some(&record) {
            return Ok(());
        }
        self.registry.store_obj(&record).await?;
        self.registry.specs().insert_capacity(record);
        Ok(())
    }

    /// Remove the capacity records of a deleted pool.
    pub(crate) async fn remove(&self, pool_id: &PoolId) -> Result<(), SvcError> {
        for record in self.registry.specs().remove_capacity(pool_id) {
            self.registry.delete_kv(&record.key().key()).await?;
        }
        self.registry.stats().remove_pool(pool_id);
        Ok(())
    }
}
