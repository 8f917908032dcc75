/// Various common constants used by the control plane.

/// Name of the product, used as the service name for the traces.
pub const PRODUCT_NAME: &str = "storage-orchestrator";

/// Default request timeout for any host agent request.
/// A request which times out makes the dispatcher fail over to the next host.
pub const DEFAULT_REQ_TIMEOUT: &str = "5s";

/// Default connection timeout for a host agent connection.
pub const DEFAULT_CONN_TIMEOUT: &str = "1s";

/// The timeout for all persistent store operations.
pub const STORE_OP_TIMEOUT: &str = "5s";

/// The polling period used when waiting on a queued vm work job.
pub const VM_WORK_JOB_POLL_PERIOD: &str = "3s";

/// The timeout for acquiring a keyed lock (vm or pool).
pub const KEYED_LOCK_TIMEOUT: &str = "30s";

/// The period at which the pool stats are refreshed from the hosts.
pub const STATS_POLL_PERIOD: &str = "60s";

/// The maximum age of a stats sample for it to be considered by the allocators.
pub const STATS_MAX_AGE: &str = "2m";

/// The period at which a control-plane node heartbeats its membership record.
pub const NODE_HEARTBEAT_PERIOD: &str = "10s";

/// Deadline after which a control-plane node which missed its heartbeats is deemed departed.
pub const NODE_DEADLINE: &str = "30s";

/// Pools at or above this used fraction are not eligible for allocation.
pub const USED_CAPACITY_THRESHOLD: &str = "1.0";

/// Pools above this allocated fraction are not eligible for allocation.
pub const ALLOCATED_CAPACITY_THRESHOLD: &str = "1.0";

/// Over-provisioning factor for network filesystem pools.
pub const OVER_PROVISIONING_FACTOR: &str = "2.0";

/// Minimum size of a custom sized data volume.
pub const MIN_VOLUME_SIZE: &str = "1GiB";

/// Maximum size of a custom sized data volume.
pub const MAX_VOLUME_SIZE: &str = "2TiB";
