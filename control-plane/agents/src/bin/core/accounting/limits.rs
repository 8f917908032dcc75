use agents::errors::SvcError;
use parking_lot::Mutex;
use std::collections::HashMap;
use stor_port::types::v0::transport::{AccountId, ResourceType};

/// The account resource limits collaborator.
pub(crate) trait ResourceLimits: Send + Sync {
    /// Fail with `QuotaExceeded` if `amount` more of the resource would exceed the limit.
    fn check_limit(
        &self,
        account: &AccountId,
        kind: ResourceType,
        amount: u64,
    ) -> Result<(), SvcError>;
    /// Change the resource count of the account by `delta`.
    fn change_count(&self, account: &AccountId, kind: ResourceType, delta: i64);
}

/// Resource limits and counters kept in memory.
/// Resources without a limit are unlimited.
#[derive(Debug, Default)]
pub(crate) struct InMemoryLimits {
    limits: Mutex<HashMap<(AccountId, ResourceType), u64>>,
    counts: Mutex<HashMap<(AccountId, ResourceType), i64>>,
}

impl InMemoryLimits {
    /// Set the limit of a resource of the account.
    pub(crate) fn set_limit(&self, account: &AccountId, kind: ResourceType, limit: u64) {
        self.limits.lock().insert((account.clone(), kind), limit);
    }
    /// The current count of a resource of the account.
    pub(crate) fn count(&self, account: &AccountId, kind: ResourceType) -> i64 {
        self.counts
            .lock()
            .get(&(account.clone(), kind))
            .copied()
            .unwrap_or_default()
    }
}

impl ResourceLimits for InMemoryLimits {
    fn check_limit(
        &self,
        account: &AccountId,
        kind: ResourceType,
        amount: u64,
    ) -> Result<(), SvcError> {
        let limit = match self.limits.lock().get(&(account.clone(), kind)) {
            Some(limit) => *limit,
            None => return Ok(()),
        };
        let current = self.count(account, kind).max(0) as u64;
        if current + amount > limit {
            return Err(SvcError::QuotaExceeded {
                account: account.to_string(),
                resource: kind.to_string(),
                limit,
                requested: amount,
            });
        }
        Ok(())
    }

    fn change_count(&self, account: &AccountId, kind: ResourceType, delta: i64) {
        *self
            .counts
            .lock()
            .entry((account.clone(), kind))
            .or_default() += delta;
    }
}
