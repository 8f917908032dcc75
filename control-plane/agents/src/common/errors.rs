use snafu::Snafu;
use stor_port::{
    transport_api::{ResourceKind, TransportError},
    types::v0::{
        store::definitions::StoreError,
        transport::{PoolId, PoolStatus, VmId, VolumeId, VolumeState},
    },
};
use strum_macros::{AsRefStr, Display};

/// How a failure should be handled by the caller.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, AsRefStr)]
pub enum ErrorClass {
    /// Bad parameters or incompatible state, detected before any side effect.
    Validation,
    /// No host reachable or no pool with capacity, safe to retry later.
    ResourceUnavailable,
    /// A multi-step operation failed part way; earlier steps were not rolled back.
    PartialFailure,
    /// An inconsistency which requires explicit operator action.
    Fatal,
    /// The resource is busy with another operation.
    Conflict,
    /// The resource does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

/// Common error type for the orchestration services.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub), context(suffix(false)))]
#[allow(missing_docs)]
pub enum SvcError {
    #[snafu(display("{} '{}' not found", kind.to_string(), id))]
    NotFound { kind: ResourceKind, id: String },
    #[snafu(display("Pool '{}' not found", pool_id))]
    PoolNotFound { pool_id: PoolId },
    #[snafu(display("Volume '{}' not found", vol_id))]
    VolumeNotFound { vol_id: VolumeId },
    #[snafu(display("Vm '{}' not found", vm_id))]
    VmNotFound { vm_id: VmId },
    #[snafu(display("{} '{}' already exists", kind.to_string(), id))]
    AlreadyExists { kind: ResourceKind, id: String },
    #[snafu(display("{} '{}' is still in use", kind.to_string(), id))]
    InUse { kind: ResourceKind, id: String },
    #[snafu(display("Invalid arguments: {}", message))]
    InvalidArguments { message: String },
    #[snafu(display(
        "Volume '{}' in state '{}' does not allow operation '{}'",
        vol_id,
        state,
        operation
    ))]
    InvalidVolumeState {
        vol_id: VolumeId,
        state: VolumeState,
        operation: String,
    },
    #[snafu(display(
        "Pool '{}' with status '{}' does not allow operation '{}'",
        pool_id,
        status,
        operation
    ))]
    InvalidPoolStatus {
        pool_id: PoolId,
        status: PoolStatus,
        operation: String,
    },
    #[snafu(display(
        "Volume size {} bytes is outside of the allowed range [{}, {}]",
        size,
        min,
        max
    ))]
    InvalidVolumeSize { size: u64, min: u64, max: u64 },
    #[snafu(display(
        "Shrinking volume '{}' from {} to {} bytes requires confirmation",
        vol_id,
        current,
        requested
    ))]
    ShrinkNotConfirmed {
        vol_id: VolumeId,
        current: u64,
        requested: u64,
    },
    #[snafu(display("Volume '{}' is already attached to vm '{}'", vol_id, vm_id))]
    AlreadyAttached { vol_id: VolumeId, vm_id: VmId },
    #[snafu(display("Volume '{}' is not attached", vol_id))]
    NotAttached { vol_id: VolumeId },
    #[snafu(display("Device id {} is already in use on vm '{}'", device_id, vm_id))]
    DeviceIdInUse { vm_id: VmId, device_id: u32 },
    #[snafu(display("Device id {} is reserved or out of range", device_id))]
    InvalidDeviceId { device_id: u32 },
    #[snafu(display("No free device id on vm '{}'", vm_id))]
    NoFreeDeviceId { vm_id: VmId },
    #[snafu(display("Vm '{}' already has the maximum of {} data volumes", vm_id, max))]
    MaxDataVolumes { vm_id: VmId, max: usize },
    #[snafu(display(
        "Volume '{}' is not compatible with the vm's hypervisor: {}",
        vol_id,
        reason
    ))]
    IncompatibleVolume { vol_id: VolumeId, reason: String },
    #[snafu(display("Volume '{}' cannot be migrated: {}", vol_id, reason))]
    MigrationNotSupported { vol_id: VolumeId, reason: String },
    #[snafu(display(
        "Volume '{}' would have to be moved to host local pool '{}' which is not allowed",
        vol_id,
        pool_id
    ))]
    LocalStorageMove { vol_id: VolumeId, pool_id: PoolId },
    #[snafu(display(
        "Account '{}' exceeded its {} limit of {} (requested {})",
        account,
        resource,
        limit,
        requested
    ))]
    QuotaExceeded {
        account: String,
        resource: String,
        limit: u64,
        requested: u64,
    },
    #[snafu(display(
        "Pool '{}' cannot enter maintenance while pool '{}' of the same cluster is preparing",
        pool_id,
        other
    ))]
    MaintenanceConflict { pool_id: PoolId, other: PoolId },
    #[snafu(display("No storage available for pool '{}'", pool_id))]
    StorageUnavailable { pool_id: PoolId },
    #[snafu(display("No suitable pool found for volume '{}'", vol_id))]
    NoSuitablePool { vol_id: VolumeId },
    #[snafu(display("Timed out after {:?} waiting for the lock of '{}'", timeout, key))]
    LockTimeout {
        key: String,
        timeout: std::time::Duration,
    },
    #[snafu(display(
        "Expunge of volume '{}' did not complete, failed steps: {:?}",
        vol_id,
        failed
    ))]
    ExpungeIncomplete {
        vol_id: VolumeId,
        failed: Vec<String>,
    },
    #[snafu(display(
        "Operation '{}' completed '{}' but failed at '{}': {}",
        operation,
        completed,
        step,
        reason
    ))]
    PartialFailure {
        operation: String,
        completed: String,
        step: String,
        reason: String,
    },
    #[snafu(display("Pool '{}' is in an inconsistent maintenance state: {}", pool_id, reason))]
    MaintenanceInconsistent { pool_id: PoolId, reason: String },
    #[snafu(display(
        "Command '{}' failed on host '{}': {}",
        command,
        host,
        details
    ))]
    HostCommand {
        host: String,
        command: String,
        details: String,
    },
    #[snafu(display("Host transport failure"))]
    Transport { source: TransportError },
    #[snafu(display("Vm work job '{}' failed: {}", job, reason))]
    JobFailed { job: String, reason: String },
    #[snafu(display("Operation failed due to a conflict with another operation"))]
    Conflict {},
    #[snafu(display("Failed to save {} '{}' to the store", kind.to_string(), id))]
    StoreSave {
        kind: ResourceKind,
        id: String,
        source: StoreError,
    },
    #[snafu(display("Store operation failed"))]
    Store { source: StoreError },
    #[snafu(display("Failed to (de)serialise '{}'", what))]
    Serde {
        what: String,
        source: serde_json::Error,
    },
    #[snafu(display("Internal error: {}", details))]
    Internal { details: String },
}

impl From<StoreError> for SvcError {
    fn from(source: StoreError) -> Self {
        SvcError::Store { source }
    }
}

impl From<TransportError> for SvcError {
    fn from(source: TransportError) -> Self {
        SvcError::Transport { source }
    }
}

impl SvcError {
    /// Classify the error into the failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            SvcError::NotFound { .. }
            | SvcError::PoolNotFound { .. }
            | SvcError::VolumeNotFound { .. }
            | SvcError::VmNotFound { .. } => ErrorClass::NotFound,

            SvcError::AlreadyExists { .. }
            | SvcError::InUse { .. }
            | SvcError::InvalidArguments { .. }
            | SvcError::InvalidVolumeState { .. }
            | SvcError::InvalidPoolStatus { .. }
            | SvcError::InvalidVolumeSize { .. }
            | SvcError::ShrinkNotConfirmed { .. }
            | SvcError::AlreadyAttached { .. }
            | SvcError::NotAttached { .. }
            | SvcError::DeviceIdInUse { .. }
            | SvcError::InvalidDeviceId { .. }
            | SvcError::NoFreeDeviceId { .. }
            | SvcError::MaxDataVolumes { .. }
            | SvcError::IncompatibleVolume { .. }
            | SvcError::MigrationNotSupported { .. }
            | SvcError::LocalStorageMove { .. }
            | SvcError::QuotaExceeded { .. } => ErrorClass::Validation,

            SvcError::StorageUnavailable { .. } | SvcError::NoSuitablePool { .. } => {
                ErrorClass::ResourceUnavailable
            }
            SvcError::Transport { source } if source.is_host_fault() => {
                ErrorClass::ResourceUnavailable
            }

            SvcError::ExpungeIncomplete { .. } | SvcError::PartialFailure { .. } => {
                ErrorClass::PartialFailure
            }

            SvcError::MaintenanceInconsistent { .. } => ErrorClass::Fatal,

            SvcError::Conflict {}
            | SvcError::LockTimeout { .. }
            | SvcError::MaintenanceConflict { .. } => ErrorClass::Conflict,

            SvcError::HostCommand { .. }
            | SvcError::Transport { .. }
            | SvcError::JobFailed { .. }
            | SvcError::StoreSave { .. }
            | SvcError::Store { .. }
            | SvcError::Serde { .. }
            | SvcError::Internal { .. } => ErrorClass::Internal,
        }
    }
    /// Check if the failure happened before any side effect.
    pub fn is_validation(&self) -> bool {
        self.class() == ErrorClass::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stor_port::transport_api::ErrorChain;

    #[test]
    fn classification() {
        let error = SvcError::StorageUnavailable {
            pool_id: "p1".into(),
        };
        assert_eq!(error.class(), ErrorClass::ResourceUnavailable);

        let error = SvcError::from(TransportError::AgentUnavailable {
            host: "h1".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(error.class(), ErrorClass::ResourceUnavailable);
        assert_eq!(
            error.full_string(),
            "Host transport failure: Agent on host 'h1' is unavailable: connection refused"
        );

        let error = SvcError::from(TransportError::Failed {
            host: "h1".into(),
            operation: "attach_volume".into(),
            reason: "bad request".into(),
        });
        assert_eq!(error.class(), ErrorClass::Internal);

        let error = SvcError::ShrinkNotConfirmed {
            vol_id: "v1".into(),
            current: 10,
            requested: 5,
        };
        assert!(error.is_validation());
    }
}
