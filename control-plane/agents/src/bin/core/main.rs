//! The Core Agent.
//! Hosts the storage orchestration: pool selection, host command dispatch, pool maintenance,
//! the volume lifecycle and the per vm work queue.
/// Per account resource counters.
pub(crate) mod accounting;
/// The administrative requests.
pub(crate) mod admin;
/// Pool capacity bookkeeping and the stats poller.
pub(crate) mod capacity;
/// Control-plane node membership.
pub(crate) mod cluster;
/// The controller logic for all resources.
pub(crate) mod controller;
/// Host command transport, dispatch and hypervisor capabilities.
pub(crate) mod host;
/// Seeding of the inventory.
pub(crate) mod inventory;
/// The pool related operations.
pub(crate) mod pool;
/// Volume usage events.
pub(crate) mod usage;
/// Stop and start of virtual machines.
pub(crate) mod vm;
/// The per vm work queue.
pub(crate) mod vm_work;
/// The volume related operations.
pub(crate) mod volume;

#[cfg(test)]
mod tests;

use crate::{
    accounting::InMemoryLimits,
    admin::{AdminRequest, AdminService},
    controller::registry::{Collaborators, CoreConfig, Registry},
    host::transport::HttpTransport,
    inventory::Inventory,
    usage::LogUsageSink,
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use stor_port::{
    pstor::memory::MemoryStore,
    transport_api::ErrorChain,
    types::v0::transport::NodeId,
};
use utils::tracing_telemetry::{FmtStyle, TracingTelemetry};

/// The Cli arguments for this binary.
#[derive(Debug, Parser)]
#[clap(name = utils::PRODUCT_NAME, version)]
pub(crate) struct CliArgs {
    /// Identity of this control-plane node, a random id when not given.
    #[clap(long, env = "NODE_ID")]
    pub(crate) node_id: Option<String>,

    /// JSON file with the hosts, vms, disk offerings, pools and account limits to seed.
    #[clap(long)]
    pub(crate) inventory: Option<PathBuf>,

    /// JSON file with a list of administrative requests to run once started.
    #[clap(long)]
    pub(crate) requests: Option<PathBuf>,

    /// Pools whose used/total ratio reaches this are not allocated.
    #[clap(long, default_value = utils::USED_CAPACITY_THRESHOLD)]
    pub(crate) used_threshold: f64,

    /// Pools whose allocated/total ratio would exceed this are not allocated.
    #[clap(long, default_value = utils::ALLOCATED_CAPACITY_THRESHOLD)]
    pub(crate) allocated_threshold: f64,

    /// Over-provisioning factor of network filesystem pools.
    #[clap(long, default_value = utils::OVER_PROVISIONING_FACTOR)]
    pub(crate) over_provisioning: f64,

    /// Maximum age of a stats sample to be considered recent.
    #[clap(long, default_value = utils::STATS_MAX_AGE)]
    pub(crate) stats_max_age: humantime::Duration,

    /// Period of the pool stats poller.
    #[clap(long, default_value = utils::STATS_POLL_PERIOD)]
    pub(crate) stats_period: humantime::Duration,

    /// Minimum size of a custom data volume.
    #[clap(long, default_value = utils::MIN_VOLUME_SIZE, value_parser = utils::bytes::parse_human)]
    pub(crate) min_volume_size: u64,

    /// Maximum size of a custom data volume.
    #[clap(long, default_value = utils::MAX_VOLUME_SIZE, value_parser = utils::bytes::parse_human)]
    pub(crate) max_volume_size: u64,

    /// The polling period used when waiting on a queued vm work job.
    #[clap(long, default_value = utils::VM_WORK_JOB_POLL_PERIOD)]
    pub(crate) job_poll_period: humantime::Duration,

    /// The timeout for acquiring a vm or pool lock.
    #[clap(long, default_value = utils::KEYED_LOCK_TIMEOUT)]
    pub(crate) lock_timeout: humantime::Duration,

    /// The default timeout for host agent requests.
    #[clap(long, short, default_value = utils::DEFAULT_REQ_TIMEOUT)]
    pub(crate) request_timeout: humantime::Duration,

    /// The period at which this node heartbeats its membership.
    #[clap(long, default_value = utils::NODE_HEARTBEAT_PERIOD)]
    pub(crate) heartbeat_period: humantime::Duration,

    /// Deadline after which a silent control-plane node is considered departed.
    #[clap(long, default_value = utils::NODE_DEADLINE)]
    pub(crate) node_deadline: humantime::Duration,

    /// The timeout for store operations.
    #[clap(long, default_value = utils::STORE_OP_TIMEOUT)]
    pub(crate) store_timeout: humantime::Duration,

    /// Formatting style to be used while logging.
    #[clap(long, default_value = "pretty")]
    pub(crate) tracing_style: FmtStyle,
}
impl CliArgs {
    fn args() -> Self {
        CliArgs::parse()
    }
}

impl From<&CliArgs> for CoreConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            node_id: match &args.node_id {
                Some(id) => NodeId::from(id.as_str()),
                None => NodeId::new(),
            },
            used_threshold: args.used_threshold,
            allocated_threshold: args.allocated_threshold,
            over_provisioning: args.over_provisioning,
            stats_max_age: args.stats_max_age.into(),
            stats_period: args.stats_period.into(),
            min_volume_size: args.min_volume_size,
            max_volume_size: args.max_volume_size,
            job_poll_period: args.job_poll_period.into(),
            lock_timeout: args.lock_timeout.into(),
            request_timeout: args.request_timeout.into(),
            heartbeat_period: args.heartbeat_period.into(),
            node_deadline: args.node_deadline.into(),
            store_timeout: args.store_timeout.into(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::args();
    utils::print_package_info!();
    TracingTelemetry::builder()
        .with_style(cli_args.tracing_style)
        .init("agent-core");
    tracing::info!(options = ?cli_args, "Starting the core agent");
    server(cli_args).await
}

async fn server(cli_args: CliArgs) -> anyhow::Result<()> {
    let config = CoreConfig::from(&cli_args);
    let limits = Arc::new(InMemoryLimits::default());
    let collaborators = Collaborators {
        transport: Arc::new(HttpTransport::new(config.request_timeout)?),
        limits: limits.clone(),
        usage: Arc::new(LogUsageSink::default()),
    };
    let registry = Registry::new(config, MemoryStore::new(), collaborators).await?;

    if let Some(path) = &cli_args.inventory {
        Inventory::load(path)?.seed(&registry, &limits).await?;
    }
    registry.start().await;

    if let Some(path) = &cli_args.requests {
        run_requests(&registry, path).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down the core agent");
    Ok(())
}

/// Run the administrative requests of the file in order, logging their outcome.
async fn run_requests(registry: &Registry, path: &std::path::Path) -> anyhow::Result<()> {
    let requests: Vec<AdminRequest> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let service = AdminService::new(registry);
    for request in &requests {
        match service.handle(request).await {
            Ok(reply) => tracing::info!(verb = request.as_ref(), %reply, "Request succeeded"),
            Err(error) => tracing::error!(
                verb = request.as_ref(),
                class = ?error.class(),
                error = error.full_string(),
                "Request failed"
            ),
        }
    }
    Ok(())
}
