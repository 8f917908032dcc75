//! Seeding of the inventory which the core consumes but does not own: hosts, vms, disk
//! offerings and account limits, along with the initial storage pools.
use crate::{accounting::InMemoryLimits, controller::registry::Registry, pool};
use agents::errors::SvcError;
use serde::Deserialize;
use snafu::ResultExt;
use std::path::Path;
use stor_port::{
    transport_api::ErrorChain,
    types::v0::{
        store::{host::Host, offering::DiskOffering, vm::VmInstance},
        transport::{AccountId, CreatePool, ResourceType},
    },
};

/// The limit of a resource of an account.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct AccountLimit {
    pub(crate) account: AccountId,
    pub(crate) resource: ResourceType,
    pub(crate) limit: u64,
}

/// Inventory file contents.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub(crate) struct Inventory {
    pub(crate) hosts: Vec<Host>,
    pub(crate) vms: Vec<VmInstance>,
    pub(crate) offerings: Vec<DiskOffering>,
    pub(crate) pools: Vec<CreatePool>,
    pub(crate) limits: Vec<AccountLimit>,
}

impl Inventory {
    /// Load the inventory from a json file.
    pub(crate) fn load(path: &Path) -> Result<Self, SvcError> {
        let contents = std::fs::read_to_string(path).map_err(|error| SvcError::Internal {
            details: format!("failed to read inventory '{}': {error}", path.display()),
        })?;
        serde_json::from_str(&contents).context(agents::errors::Serde {
            what: format!("inventory '{}'", path.display()),
        })
    }

    /// Persist the inventory and create its pools. Pools which already exist are kept as they
    /// are.
    pub(crate) async fn seed(
        self,
        registry: &Registry,
        limits: &InMemoryLimits,
    ) -> Result<(), SvcError> {
        let specs = registry.specs();
        for host in self.hosts {
            registry.store_obj(&host).await?;
            specs.insert_host(host);
        }
        for vm in self.vms {
            registry.store_obj(&vm).await?;
            specs.insert_vm(vm);
        }
        for offering in self.offerings {
            registry.store_obj(&offering).await?;
            specs.insert_offering(offering);
        }
        for limit in self.limits {
            limits.set_limit(&limit.account, limit.resource, limit.limit);
        }

        let service = pool::service::Service::new(registry.clone());
        for request in self.pools {
            match service.create_pool(&request).await {
                Ok(_) | Err(SvcError::AlreadyExists { .. }) => {}
                Err(error) => {
                    tracing::error!(
                        pool.id = %request.id,
                        error = error.full_string(),
                        "Failed to create inventory pool"
                    );
                }
            }
        }
        tracing::info!(
            hosts = specs.hosts().len(),
            pools = specs.pools().len(),
            "Seeded the inventory"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_inventory() {
        let inventory: Inventory = serde_json::from_value(serde_json::json!({
            "limits": [{ "account": "acc-1", "resource": "primary_storage", "limit": 100 }]
        }))
        .unwrap();
        assert!(inventory.hosts.is_empty());
        assert_eq!(
            inventory.limits,
            vec![AccountLimit {
                account: "acc-1".into(),
                resource: ResourceType::PrimaryStorage,
                limit: 100,
            }]
        );
    }
}
