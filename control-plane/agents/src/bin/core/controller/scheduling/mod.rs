pub(crate) mod pool;
pub(crate) mod resources;

use crate::controller::scheduling::{pool::GetSuitablePoolsContext, resources::PoolItem};

/// Default container of context and a list of items which must be filtered down and sorted.
#[derive(Clone)]
pub(crate) struct ResourceData<C, I> {
    context: C,
    list: Vec<I>,
}
impl<C, I> ResourceData<C, I> {
    /// Create a new `Self`.
    pub(crate) fn new(request: C, list: Vec<I>) -> Self {
        Self {
            context: request,
            list,
        }
    }
}

pub(crate) trait ResourceFilter: Sized {
    type Request;
    type Item;

    fn data(&mut self) -> &mut ResourceData<Self::Request, Self::Item>;

    fn filter<F: FnMut(&Self::Request, &Self::Item) -> bool>(mut self, mut filter: F) -> Self {
        let data = self.data();
        data.list.retain(|v| filter(&data.context, v));
        self
    }
    fn sort<F: FnMut(&Self::Item, &Self::Item) -> std::cmp::Ordering>(mut self, sort: F) -> Self {
        let data = self.data();
        data.list.sort_by(sort);
        self
    }
    fn collect(self) -> Vec<Self::Item>;
}

/// Filter pools used for volume placement.
pub(crate) struct PoolFilters {}
impl PoolFilters {
    /// Should only attempt to use pools which are Up.
    /// Disabled pools and pools in any maintenance state are never allocated.
    pub(crate) fn up(_request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        item.pool.is_up()
    }
    /// Should never return a pool which the caller asked us to avoid.
    pub(crate) fn not_avoided(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        !request.avoid().contains(&item.pool.id)
    }
    /// The disk's required tags must be a subset of the pool's tags.
    pub(crate) fn tags(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        item.pool.has_tags(&request.profile().tags)
    }
    /// Local disks only go to host local pools, and shared disks only to shared pools.
    pub(crate) fn locality(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request.profile().use_local_storage == item.pool.is_local()
    }
    /// The pool's used space must be below the used threshold, as per a recent stats sample.
    pub(crate) fn used_space(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request.capacity().has_used_space(&item.pool)
    }
    /// The pool's allocated space plus what we're asking for must fit the adjusted total.
    pub(crate) fn allocated_space(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request
            .capacity()
            .has_allocated_space(&item.pool, item.allocated, request.profile().asking)
    }
}

/// Sort pools for volume placement.
pub(crate) struct PoolSorters {}
impl PoolSorters {
    /// Prefer pools with more unallocated space.
    pub(crate) fn sort_by_free_space(a: &PoolItem, b: &PoolItem) -> std::cmp::Ordering {
        b.free().cmp(&a.free())
    }
}
