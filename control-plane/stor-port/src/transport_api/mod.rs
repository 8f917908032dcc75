#![warn(missing_docs)]
//! Definitions shared by every control-plane component which are not tied to a
//! particular resource type.

use serde::{Deserialize, Serialize};
use snafu::Snafu;
use strum_macros::{AsRefStr, Display};

/// Report error chain.
pub trait ErrorChain {
    /// Full error chain as a string separated by ':'.
    fn full_string(&self) -> String;
    /// Get the full error chain starting from the parent.
    fn parent_full_string(&self) -> String;
}

impl<T> ErrorChain for T
where
    T: std::error::Error,
{
    /// loops through the error chain and formats into a single string
    /// containing all the lower level errors.
    fn full_string(&self) -> String {
        let mut msg = format!("{self}");
        let mut opt_source = self.source();
        while let Some(source) = opt_source {
            msg = format!("{msg}: {source}");
            opt_source = source.source();
        }
        msg
    }

    fn parent_full_string(&self) -> String {
        match self.source() {
            Some(parent) => parent.full_string(),
            None => String::new(),
        }
    }
}

/// All the different variants of Resources.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, AsRefStr, Display, Eq, PartialEq)]
pub enum ResourceKind {
    /// Unknown or unspecified resource.
    Unknown,
    /// Compute host resource.
    Host,
    /// Storage pool resource.
    StoragePool,
    /// Volume resource.
    Volume,
    /// Volume snapshot.
    VolumeSnapshot,
    /// Virtual machine instance.
    VmInstance,
    /// Disk offering.
    DiskOffering,
    /// Pool maintenance work item.
    StoragePoolWorkItem,
    /// Capacity record.
    Capacity,
    /// Queued vm work job.
    VmWorkJob,
    /// Control-plane node.
    ControlPlaneNode,
    /// Account resource counters.
    Account,
}

/// Errors raised when sending a command to a host agent.
/// `AgentUnavailable` and `OperationTimedOut` are faults of the host rather than of the
/// command, so the command may be sent to another host.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub), context(suffix(false)))]
pub enum TransportError {
    /// The agent could not be reached.
    #[snafu(display("Agent on host '{}' is unavailable: {}", host, reason))]
    AgentUnavailable {
        /// Host identifier.
        host: String,
        /// What went wrong.
        reason: String,
    },
    /// The agent did not reply in time.
    #[snafu(display(
        "Operation '{}' on host '{}' timed out after {:?}",
        operation,
        host,
        timeout
    ))]
    OperationTimedOut {
        /// Host identifier.
        host: String,
        /// Command name.
        operation: String,
        /// The timeout which elapsed.
        timeout: std::time::Duration,
    },
    /// Any other transport failure.
    #[snafu(display("Operation '{}' on host '{}' failed: {}", operation, host, reason))]
    Failed {
        /// Host identifier.
        host: String,
        /// Command name.
        operation: String,
        /// What went wrong.
        reason: String,
    },
}

impl TransportError {
    /// Check if the command may be retried on another host.
    pub fn is_host_fault(&self) -> bool {
        matches!(
            self,
            Self::AgentUnavailable { .. } | Self::OperationTimedOut { .. }
        )
    }
}
