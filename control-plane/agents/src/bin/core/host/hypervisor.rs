use parking_lot::RwLock;
use std::collections::HashMap;
use stor_port::types::v0::transport::{Hypervisor, VolumeFormat};

/// What a hypervisor supports.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HypervisorCapabilities {
    /// Maximum number of data volumes attached to a single vm.
    pub(crate) max_data_volumes: usize,
    /// Live migration of volumes between pools.
    pub(crate) storage_motion: bool,
    /// Volume formats which may be attached.
    pub(crate) formats: Vec<VolumeFormat>,
}

impl HypervisorCapabilities {
    /// Check if the volume format may be attached.
    pub(crate) fn supports(&self, format: VolumeFormat) -> bool {
        self.formats.contains(&format)
    }
}

/// Capabilities of each hypervisor.
/// Populated at start-up and read-only afterwards, except through `register`.
#[derive(Debug)]
pub(crate) struct HypervisorRegistry {
    capabilities: RwLock<HashMap<Hypervisor, HypervisorCapabilities>>,
}

impl HypervisorRegistry {
    /// A registry with the capabilities of every known hypervisor.
    pub(crate) fn with_defaults() -> Self {
        let registry = Self {
            capabilities: RwLock::new(HashMap::new()),
        };
        registry.register(
            Hypervisor::Kvm,
            HypervisorCapabilities {
                max_data_volumes: 14,
                storage_motion: true,
                formats: vec![VolumeFormat::Qcow2, VolumeFormat::Raw],
            },
        );
        registry.register(
            Hypervisor::XenServer,
            HypervisorCapabilities {
                max_data_volumes: 6,
                storage_motion: true,
                formats: vec![VolumeFormat::Vhd],
            },
        );
        registry.register(
            Hypervisor::VMware,
            HypervisorCapabilities {
                max_data_volumes: 13,
                storage_motion: true,
                formats: vec![VolumeFormat::Ova],
            },
        );
        registry.register(
            Hypervisor::Simulator,
            HypervisorCapabilities {
                max_data_volumes: 14,
                storage_motion: false,
                formats: vec![
                    VolumeFormat::Qcow2,
                    VolumeFormat::Raw,
                    VolumeFormat::Vhd,
                    VolumeFormat::Ova,
                ],
            },
        );
        registry
    }

    /// Add or replace the capabilities of a hypervisor.
    pub(crate) fn register(&self, hypervisor: Hypervisor, capabilities: HypervisorCapabilities) {
        tracing::debug!(%hypervisor, ?capabilities, "Registering hypervisor capabilities");
        self.capabilities.write().insert(hypervisor, capabilities);
    }

    /// Get the capabilities of a hypervisor.
    pub(crate) fn get(&self, hypervisor: Hypervisor) -> Option<HypervisorCapabilities> {
        self.capabilities.read().get(&hypervisor).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_overrides() {
        let registry = HypervisorRegistry::with_defaults();
        let kvm = registry.get(Hypervisor::Kvm).unwrap();
        assert_eq!(kvm.max_data_volumes, 14);
        assert!(kvm.supports(VolumeFormat::Qcow2));
        assert!(!kvm.supports(VolumeFormat::Vhd));

        registry.register(
            Hypervisor::Kvm,
            HypervisorCapabilities {
                max_data_volumes: 2,
                ..kvm
            },
        );
        assert_eq!(registry.get(Hypervisor::Kvm).unwrap().max_data_volumes, 2);
    }
}
