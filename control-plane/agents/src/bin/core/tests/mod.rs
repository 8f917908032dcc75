//! Scenarios of the core agent, run in process against fake host agents.
mod dispatch;
mod maintenance;
mod membership;
mod pools;
mod volume;

use crate::{
    accounting::InMemoryLimits,
    controller::registry::{Collaborators, CoreConfig, Registry},
    host::transport::HostTransport,
    inventory::Inventory,
    pool, volume as volumes,
    usage::{UsageEvent, UsageEventSink},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use stor_port::{
    pstor::memory::MemoryStore,
    transport_api::TransportError,
    types::v0::{
        store::{
            host::Host, offering::DiskOffering, vm::VmInstance, volume::VolumeSpec,
            OperationSequence,
        },
        transport::{
            AccountId, AllocateVolume, Answer, ClusterId, Command, CreatePool, CreateVolume,
            HostId, HostStatus, Hypervisor, PoolId, PoolType, ResourceType, ScopeType,
            StorageStats, VmId, VmState, VmType, VolumeId, VolumeState, VolumeType, ZoneId,
        },
    },
};
use utils::bytes::GIB;

pub(crate) const ZONE: &str = "zone-1";
pub(crate) const CLUSTER: &str = "cluster-1";
pub(crate) const ACCOUNT: &str = "acc-1";
pub(crate) const DOMAIN: &str = "dom-1";
pub(crate) const HOSTS: [&str; 3] = ["host-1", "host-2", "host-3"];
/// Running on the first host.
pub(crate) const RUNNING_VM: &str = "vm-running";
/// Never started.
pub(crate) const STOPPED_VM: &str = "vm-stopped";
/// Custom sized data volumes.
pub(crate) const CUSTOM_OFFERING: &str = "custom";

/// Host agents which answer every command, unless told otherwise.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    sent: Mutex<Vec<(HostId, Command)>>,
    unavailable: Mutex<HashSet<HostId>>,
    failing: Mutex<HashSet<String>>,
    short: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    /// The agent of the host stops answering.
    pub(crate) fn set_unavailable(&self, host: &str) {
        self.unavailable.lock().insert(host.into());
    }
    /// Every command of this name is answered with a failure.
    pub(crate) fn fail_command(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }
    /// Every batch with a command of this name is answered without its last answer.
    pub(crate) fn short_answer(&self, name: &str) {
        self.short.lock().insert(name.to_string());
    }
    /// Every batch with a command of this name takes `delay` to answer.
    pub(crate) fn delay_command(&self, name: &str, delay: Duration) {
        self.delays.lock().insert(name.to_string(), delay);
    }
    /// Forget the commands sent so far.
    pub(crate) fn clear(&self) {
        self.sent.lock().clear();
    }
    /// The commands of this name which were sent, with the host they were sent to.
    pub(crate) fn sent(&self, name: &str) -> Vec<(HostId, Command)> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, command)| command.name() == name)
            .cloned()
            .collect()
    }
    /// The hosts contacted, in order.
    pub(crate) fn contacted(&self) -> Vec<HostId> {
        self.sent.lock().iter().map(|(host, _)| host.clone()).collect()
    }
    /// The most batches of delayed commands which were in flight at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, command: &Command) -> Answer {
        if self.failing.lock().contains(command.name()) {
            return Answer::Failure {
                details: format!("{} failed", command.name()),
            };
        }
        match command {
            Command::CreateVolume { volume, pool, .. }
            | Command::CreateVolumeFromSnapshot { volume, pool, .. }
            | Command::CopyVolumeFromSecondary { volume, pool, .. } => Answer::VolumeCreated {
                path: format!("/{}/{}", pool.id, volume.id),
                size: volume.size,
            },
            Command::CopyVolume {
                volume,
                destination,
                ..
            } => Answer::Copied {
                path: format!("/{}/{}", destination.id, volume.id),
            },
            Command::CopyVolumeToSecondary { volume, .. } => Answer::Copied {
                path: format!("https://secondary.{ZONE}/{}", volume.id),
            },
            Command::TakeSnapshot { pool, snapshot, .. } => Answer::Snapshot {
                path: format!("/{}/snapshots/{snapshot}", pool.id),
                size: 0,
            },
            Command::BackupSnapshot { snapshot, .. } => Answer::Snapshot {
                path: format!("/secondary/snapshots/{snapshot}"),
                size: GIB,
            },
            Command::GetStorageStats { .. } => Answer::StorageStats {
                stats: StorageStats {
                    capacity_bytes: 100 * GIB,
                    used_bytes: 0,
                },
            },
            _ => Answer::Success,
        }
    }
}

#[async_trait::async_trait]
impl HostTransport for FakeTransport {
    async fn send(&self, host: &Host, commands: &[Command]) -> Result<Vec<Answer>, TransportError> {
        self.sent
            .lock()
            .extend(commands.iter().map(|command| (host.id.clone(), command.clone())));
        if self.unavailable.lock().contains(&host.id) {
            return Err(TransportError::AgentUnavailable {
                host: host.id.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let delay = {
            let delays = self.delays.lock();
            commands
                .iter()
                .filter_map(|command| delays.get(command.name()).copied())
                .max()
        };
        if let Some(delay) = delay {
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let mut answers = commands
            .iter()
            .map(|command| self.answer(command))
            .collect::<Vec<_>>();
        let short = self.short.lock();
        if commands.iter().any(|command| short.contains(command.name())) {
            answers.pop();
        }
        Ok(answers)
    }
}

/// Keeps the published usage events.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<UsageEvent>>,
}
impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().clone()
    }
}
impl UsageEventSink for RecordingSink {
    fn publish(&self, event: UsageEvent) {
        self.events.lock().push(event);
    }
}

fn host(id: &str) -> Host {
    Host {
        id: id.into(),
        name: id.to_string(),
        endpoint: format!("http://{id}:8250"),
        zone: ZONE.into(),
        cluster: CLUSTER.into(),
        hypervisor: Hypervisor::Kvm,
        status: HostStatus::Up,
    }
}

fn vm(id: &str, host: Option<&str>) -> VmInstance {
    VmInstance {
        id: id.into(),
        name: id.to_string(),
        vm_type: VmType::User,
        state: match host {
            Some(_) => VmState::Running,
            None => VmState::Stopped,
        },
        zone: ZONE.into(),
        host: host.map(HostId::from),
        last_host: host.map(HostId::from),
        hypervisor: Hypervisor::Kvm,
        account: ACCOUNT.into(),
        domain: DOMAIN.into(),
    }
}

/// A zone wide pool request.
pub(crate) fn zone_pool(id: &str, pool_type: PoolType, capacity_bytes: u64) -> CreatePool {
    CreatePool {
        id: id.into(),
        name: id.to_string(),
        zone: ZONE.into(),
        cluster: None,
        host: None,
        scope: ScopeType::Zone,
        pool_type,
        provider: None,
        capacity_bytes,
        capacity_iops: None,
        tags: vec![],
        url: format!("nfs://storage/{id}"),
    }
}

/// A cluster wide pool of the first cluster.
pub(crate) fn cluster_pool(id: &str, pool_type: PoolType, capacity_bytes: u64) -> CreatePool {
    CreatePool {
        cluster: Some(CLUSTER.into()),
        scope: ScopeType::Cluster,
        ..zone_pool(id, pool_type, capacity_bytes)
    }
}

/// A pool on the local disk of the host.
pub(crate) fn host_pool(id: &str, host: &str, capacity_bytes: u64) -> CreatePool {
    CreatePool {
        host: Some(host.into()),
        scope: ScopeType::Host,
        url: format!("file:///var/lib/{id}"),
        ..zone_pool(id, PoolType::Filesystem, capacity_bytes)
    }
}

/// A registry seeded with three Up hosts, a running and a stopped vm and the given pools,
/// talking to fake host agents.
pub(crate) struct Fixture {
    pub(crate) registry: Registry,
    pub(crate) transport: Arc<FakeTransport>,
    pub(crate) usage: Arc<RecordingSink>,
    pub(crate) limits: Arc<InMemoryLimits>,
}

impl Fixture {
    pub(crate) fn config() -> CoreConfig {
        CoreConfig {
            over_provisioning: 1.0,
            job_poll_period: Duration::from_millis(10),
            lock_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    pub(crate) async fn new(pools: Vec<CreatePool>) -> Self {
        Self::with_config(Self::config(), pools).await
    }

    pub(crate) async fn with_config(config: CoreConfig, pools: Vec<CreatePool>) -> Self {
        let transport = Arc::new(FakeTransport::default());
        let usage = Arc::new(RecordingSink::default());
        let limits = Arc::new(InMemoryLimits::default());
        let collaborators = Collaborators {
            transport: transport.clone(),
            limits: limits.clone(),
            usage: usage.clone(),
        };
        let registry = Registry::new(config, MemoryStore::new(), collaborators)
            .await
            .unwrap();

        let inventory = Inventory {
            hosts: HOSTS.iter().copied().map(host).collect(),
            vms: vec![vm(RUNNING_VM, Some(HOSTS[0])), vm(STOPPED_VM, None)],
            offerings: vec![DiskOffering {
                id: CUSTOM_OFFERING.into(),
                name: CUSTOM_OFFERING.to_string(),
                custom_size: true,
                ..Default::default()
            }],
            pools: pools.clone(),
            limits: vec![],
        };
        inventory.seed(&registry, &limits).await.unwrap();
        for pool in &pools {
            registry.stats().record_pool(
                &pool.id,
                StorageStats {
                    capacity_bytes: pool.capacity_bytes,
                    used_bytes: 0,
                },
            );
        }

        Self {
            registry,
            transport,
            usage,
            limits,
        }
    }

    pub(crate) fn volumes(&self) -> volumes::service::Service {
        volumes::service::Service::new(self.registry.clone())
    }
    pub(crate) fn pools(&self) -> pool::service::Service {
        pool::service::Service::new(self.registry.clone())
    }

    /// The resource count of the test account.
    pub(crate) fn count(&self, kind: ResourceType) -> i64 {
        self.limits.count(&AccountId::from(ACCOUNT), kind)
    }

    pub(crate) fn volume(&self, id: &VolumeId) -> VolumeSpec {
        self.registry.specs().volume(id).unwrap()
    }
    pub(crate) fn vm(&self, id: &str) -> VmInstance {
        self.registry.specs().vm(&VmId::from(id)).unwrap()
    }

    /// Allocate a custom sized data volume.
    pub(crate) async fn allocate(&self, name: &str, size: u64) -> VolumeSpec {
        self.volumes()
            .allocate_volume(&AllocateVolume {
                name: name.to_string(),
                account: ACCOUNT.into(),
                domain: DOMAIN.into(),
                zone: ZONE.into(),
                disk_offering: Some(CUSTOM_OFFERING.into()),
                size: Some(size),
                display: true,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// Allocate and provision a custom sized data volume.
    pub(crate) async fn ready_volume(&self, name: &str, size: u64) -> VolumeSpec {
        let volume = self.allocate(name, size).await;
        self.volumes()
            .create_volume(&CreateVolume {
                volume: volume.id,
                vm: None,
                avoid: vec![],
            })
            .await
            .unwrap()
    }

    /// Store a data volume, already provisioned on the pool.
    pub(crate) async fn placed_volume(&self, name: &str, pool: &str) -> VolumeSpec {
        let id = VolumeId::from(format!("{name}-{pool}"));
        let volume = VolumeSpec {
            sequencer: OperationSequence::new(id.as_str()),
            name: name.to_string(),
            volume_type: VolumeType::Data,
            size: 10 * GIB,
            account: ACCOUNT.into(),
            domain: DOMAIN.into(),
            zone: ZoneId::from(ZONE),
            pool: Some(PoolId::from(pool)),
            path: Some(format!("/{pool}/{id}")),
            state: VolumeState::Ready,
            id,
            ..Default::default()
        };
        self.registry.store_obj(&volume).await.unwrap();
        self.registry.specs().insert_volume(volume.clone());
        volume
    }

    /// Store the root volume of the vm, already provisioned on the pool.
    pub(crate) async fn root_volume(&self, vm: &str, pool: &str) -> VolumeSpec {
        let id = VolumeId::from(format!("root-{vm}"));
        let volume = VolumeSpec {
            sequencer: OperationSequence::new(id.as_str()),
            name: format!("ROOT-{vm}"),
            volume_type: VolumeType::Root,
            size: 10 * GIB,
            account: ACCOUNT.into(),
            domain: DOMAIN.into(),
            zone: ZoneId::from(ZONE),
            pool: Some(PoolId::from(pool)),
            vm: Some(VmId::from(vm)),
            device_id: Some(0),
            path: Some(format!("/{pool}/{id}")),
            state: VolumeState::Ready,
            id,
            ..Default::default()
        };
        self.registry.store_obj(&volume).await.unwrap();
        self.registry.specs().insert_volume(volume.clone());
        volume
    }
}

#[tokio::test]
async fn seeded_fixture() {
    let fixture = Fixture::new(vec![zone_pool("pool-1", PoolType::NetworkFilesystem, GIB)]).await;
    let specs = fixture.registry.specs();
    assert_eq!(specs.cluster_hosts(&ClusterId::from(CLUSTER)).len(), HOSTS.len());
    // every Up host of the zone connected to the zone wide pool
    assert_eq!(specs.pool_hosts(&PoolId::from("pool-1")).len(), HOSTS.len());
    assert_eq!(fixture.transport.sent("ModifyStoragePool").len(), HOSTS.len());
}
