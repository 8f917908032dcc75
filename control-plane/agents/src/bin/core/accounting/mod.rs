//! Per account resource counters.
//!
//! Every lifecycle operation which changes the provisioned footprint of a volume pairs its
//! mutation with exactly one counter change. Counters raised before a provisioning step are
//! held by a `ResourceCountGuard` which reverts them unless the step is committed.
mod limits;

pub(crate) use limits::{InMemoryLimits, ResourceLimits};

use agents::errors::SvcError;
use std::sync::Arc;
use stor_port::types::v0::transport::{AccountId, ResourceType};

/// Pairs of resource and amount.
pub(crate) type ResourceCounts = Vec<(ResourceType, u64)>;

/// Counters raised optimistically, reverted on drop unless committed.
#[must_use]
pub(crate) struct ResourceCountGuard {
    limits: Arc<dyn ResourceLimits>,
    account: AccountId,
    counts: ResourceCounts,
    committed: bool,
}

impl std::fmt::Debug for ResourceCountGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCountGuard")
            .field("account", &self.account)
            .field("counts", &self.counts)
            .field("committed", &self.committed)
            .finish()
    }
}

impl ResourceCountGuard {
    /// Keep the counters raised.
    pub(crate) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ResourceCountGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (kind, amount) in &self.counts {
            tracing::debug!(
                account = %self.account,
                resource = %kind,
                amount,
                "Reverting resource count"
            );
            self.limits.change_count(&self.account, *kind, -(*amount as i64));
        }
    }
}

/// Bookkeeping of the account resource counters.
#[derive(Clone)]
pub(crate) struct ResourceAccountant {
    limits: Arc<dyn ResourceLimits>,
}

impl ResourceAccountant {
    /// Create a new `Self` on top of the resource limits.
    pub(crate) fn new(limits: Arc<dyn ResourceLimits>) -> Self {
        Self { limits }
    }

    /// Check that every count fits the account limits.
    pub(crate) fn check(
        &self,
        account: &AccountId,
        counts: &[(ResourceType, u64)],
    ) -> Result<(), SvcError> {
        for (kind, amount) in counts {
            self.limits.check_limit(account, *kind, *amount)?;
        }
        Ok(())
    }

    /// Raise the counters.
    pub(crate) fn increment(&self, account: &AccountId, counts: &[(ResourceType, u64)]) {
        for (kind, amount) in counts {
            tracing::debug!(%account, resource = %kind, amount, "Incrementing resource count");
            self.limits.change_count(account, *kind, *amount as i64);
        }
    }

    /// Lower the counters.
    pub(crate) fn decrement(&self, account: &AccountId, counts: &[(ResourceType, u64)]) {
        for (kind, amount) in counts {
            tracing::debug!(%account, resource = %kind, amount, "Decrementing resource count");
            self.limits.change_count(account, *kind, -(*amount as i64));
        }
    }

    /// Check the limits and raise the counters, returning a guard which reverts them unless
    /// committed.
    pub(crate) fn reserve(
        &self,
        account: &AccountId,
        counts: ResourceCounts,
    ) -> Result<ResourceCountGuard, SvcError> {
        self.check(account, &counts)?;
        self.increment(account, &counts);
        Ok(ResourceCountGuard {
            limits: self.limits.clone(),
            account: account.clone(),
            counts,
            committed: false,
        })
    }
}

/// The counters of a volume of the given size: one volume and its primary storage bytes.
pub(crate) fn volume_counts(size: u64) -> ResourceCounts {
    vec![
        (ResourceType::Volume, 1),
        (ResourceType::PrimaryStorage, size),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_reverts_unless_committed() {
        let limits = Arc::new(InMemoryLimits::default());
        let accountant = ResourceAccountant::new(limits.clone());
        let account = AccountId::from("acc");

        let guard = accountant.reserve(&account, volume_counts(10)).unwrap();
        assert_eq!(limits.count(&account, ResourceType::Volume), 1);
        assert_eq!(limits.count(&account, ResourceType::PrimaryStorage), 10);
        drop(guard);
        assert_eq!(limits.count(&account, ResourceType::Volume), 0);
        assert_eq!(limits.count(&account, ResourceType::PrimaryStorage), 0);

        accountant
            .reserve(&account, volume_counts(10))
            .unwrap()
            .commit();
        assert_eq!(limits.count(&account, ResourceType::PrimaryStorage), 10);
    }

    #[test]
    fn reserve_over_limit() {
        let limits = Arc::new(InMemoryLimits::default());
        let accountant = ResourceAccountant::new(limits.clone());
        let account = AccountId::from("acc");
        limits.set_limit(&account, ResourceType::PrimaryStorage, 15);

        let _guard = accountant.reserve(&account, volume_counts(10)).unwrap();
        let error = accountant.reserve(&account, volume_counts(10)).unwrap_err();
        assert!(matches!(error, SvcError::QuotaExceeded { .. }));
        assert!(error.is_validation());
        assert_eq!(limits.count(&account, ResourceType::Volume), 1);
    }
}
