use super::{deployments, invalid_state, volume_guard, volume_pool, zone_host};
use crate::{
    accounting::volume_counts,
    capacity::CapacityTracker,
    controller::{
        registry::Registry,
        resources::{
            operations::ResourceLifecycle, OperationGuardArc, TraceStrLog, UpdateInnerValue,
        },
        scheduling::pool::{AllocatorChain, DiskProfile},
    },
    host::dispatcher::{CommandDispatcher, Dispatched},
    usage::{UsageEvent, UsageEventType},
};
use agents::errors::SvcError;
use std::collections::HashSet;
use stor_port::{
    transport_api::{ErrorChain, ResourceKind},
    types::v0::{
        store::{
            definitions::{ObjectKey, StorableObject},
            offering::DiskOffering,
            pool::StoragePool,
            vm::VmInstance,
            volume::VolumeSpec,
            OperationSequence,
        },
        transport::{
            AllocateVolume, Answer, Command, DestroyVolume, HostId, MigrateVolume, PoolId,
            ResizeVolume, ResourceType, VolumeEvent, VolumeId, VolumeState, VolumeType,
        },
    },
};

#[async_trait::async_trait]
impl ResourceLifecycle for OperationGuardArc<VolumeSpec> {
    type Create = AllocateVolume;
    type CreateOutput = VolumeSpec;
    type Destroy = DestroyVolume;

    /// Allocate the volume: validate the request and persist it in the `Allocated` state with
    /// its resource counters raised. Nothing is provisioned yet.
    async fn create(
        registry: &Registry,
        request: &Self::Create,
    ) -> Result<Self::CreateOutput, SvcError> {
        let specs = registry.specs();
        let id = VolumeId::new();
        let mut volume = VolumeSpec {
            sequencer: OperationSequence::new(id.as_str()),
            id,
            name: request.name.clone(),
            volume_type: VolumeType::Data,
            account: request.account.clone(),
            domain: request.domain.clone(),
            zone: request.zone.clone(),
            display: request.display,
            state: VolumeState::Allocated,
            ..Default::default()
        };
        match (&request.disk_offering, &request.snapshot) {
            (Some(offering), None) => {
                let offering = specs.offering(offering)?;
                volume.size = offering_size(registry, &offering, request.size)?;
                let (min_iops, max_iops) =
                    offering_iops(&offering, request.min_iops, request.max_iops)?;
                volume.min_iops = min_iops;
                volume.max_iops = max_iops;
                volume.disk_offering = Some(offering.id);
            }
            (None, Some(snapshot)) => {
                let snapshot = specs.snapshot_rsc(snapshot)?.lock().clone();
                if !snapshot.backed_up() {
                    return Err(SvcError::InvalidArguments {
                        message: format!(
                            "snapshot '{}' is {}, not backed up",
                            snapshot.id, snapshot.state
                        ),
                    });
                }
                let size = request.size.unwrap_or(snapshot.size);
                if size < snapshot.size {
                    return Err(SvcError::InvalidVolumeSize {
                        size,
                        min: snapshot.size,
                        max: registry.config().max_volume_size,
                    });
                }
                volume.size = size;
                volume.snapshot = Some(snapshot.id);
            }
            _ => {
                return Err(SvcError::InvalidArguments {
                    message: "exactly one of disk offering or snapshot must be given".to_string(),
                })
            }
        }

        let counters = registry
            .accountant()
            .reserve(&volume.account, volume_counts(volume.size))?;
        registry.store_obj(&volume).await?;
        counters.commit();
        specs.insert_volume(volume.clone());

        if let Some(event) = UsageEvent::for_volume(UsageEventType::VolumeCreate, &volume) {
            registry.usage().publish(event);
        }
        volume.info("Allocated volume");
        Ok(volume)
    }

    async fn destroy(
        &mut self,
        registry: &Registry,
        request: &Self::Destroy,
    ) -> Result<(), SvcError> {
        let volume = self.lock().clone();
        if volume.attached() {
            return Err(SvcError::InUse {
                kind: ResourceKind::Volume,
                id: volume.id.to_string(),
            });
        }
        let snapshotting = registry
            .specs()
            .volume_snapshots(&volume.id)
            .iter()
            .any(|snapshot| snapshot.in_progress());
        if volume.state == VolumeState::Snapshotting || snapshotting {
            return Err(invalid_state(&volume, "destroy"));
        }

        let accountant = registry.accountant();
        match volume.state {
            VolumeState::Allocated => {
                self.remove(registry).await?;
                if !volume.uncounted {
                    accountant.decrement(&volume.account, &volume_counts(volume.size));
                }
                return Ok(());
            }
            VolumeState::Uploaded => {
                let command = Command::DeleteFromSecondary {
                    volume: volume.id.clone(),
                };
                if let Err(error) = send_to_zone(registry, &volume, command).await {
                    self.warn(&format!(
                        "Failed to delete the upload from secondary storage: {}",
                        error.full_string()
                    ));
                }
                self.remove(registry).await?;
                accountant.decrement(
                    &volume.account,
                    &[
                        (ResourceType::Volume, 1),
                        (ResourceType::SecondaryStorage, volume.size),
                    ],
                );
                return Ok(());
            }
            VolumeState::Ready => {
                self.transition(registry, VolumeEvent::DestroyRequested)
                    .await?;
                accountant.decrement(&volume.account, &volume_counts(volume.size));
                if let Some(event) = UsageEvent::for_volume(UsageEventType::VolumeDelete, &volume)
                {
                    registry.usage().publish(event);
                }
                self.info("Destroyed volume");
            }
            VolumeState::Destroy => {}
            _ => return Err(invalid_state(&volume, "destroy")),
        }

        if request.expunge {
            self.expunge(registry).await?;
        }
        Ok(())
    }
}

/// The size of a volume of the given offering.
fn offering_size(
    registry: &Registry,
    offering: &DiskOffering,
    size: Option<u64>,
) -> Result<u64, SvcError> {
    let config = registry.config();
    match (offering.custom_size, offering.disk_size, size) {
        (true, _, Some(size)) => {
            if size < config.min_volume_size || size > config.max_volume_size {
                return Err(SvcError::InvalidVolumeSize {
                    size,
                    min: config.min_volume_size,
                    max: config.max_volume_size,
                });
            }
            Ok(size)
        }
        (true, _, None) => Err(SvcError::InvalidArguments {
            message: format!("disk offering '{}' requires a size", offering.id),
        }),
        (false, Some(disk_size), None) => Ok(disk_size),
        (false, Some(disk_size), Some(size)) if size == disk_size => Ok(disk_size),
        (false, Some(_), Some(_)) => Err(SvcError::InvalidArguments {
            message: format!("disk offering '{}' does not allow custom sizes", offering.id),
        }),
        (false, None, _) => Err(SvcError::InvalidArguments {
            message: format!("disk offering '{}' has no size", offering.id),
        }),
    }
}

/// The iops of a volume of the given offering.
fn offering_iops(
    offering: &DiskOffering,
    min_iops: Option<u64>,
    max_iops: Option<u64>,
) -> Result<(Option<u64>, Option<u64>), SvcError> {
    if !offering.custom_iops {
        if min_iops.is_some() || max_iops.is_some() {
            return Err(SvcError::InvalidArguments {
                message: format!("disk offering '{}' does not allow custom iops", offering.id),
            });
        }
        return Ok((offering.min_iops, offering.max_iops));
    }
    check_iops(min_iops, max_iops)?;
    Ok((min_iops, max_iops))
}

fn check_iops(min_iops: Option<u64>, max_iops: Option<u64>) -> Result<(), SvcError> {
    match (min_iops, max_iops) {
        (Some(min), Some(max)) if min > max => Err(SvcError::InvalidArguments {
            message: format!("min iops {min} is above max iops {max}"),
        }),
        _ => Ok(()),
    }
}

/// Send a command to any Up host of the volume's zone.
async fn send_to_zone(
    registry: &Registry,
    volume: &VolumeSpec,
    command: Command,
) -> Result<Dispatched, SvcError> {
    let host = zone_host(registry, &volume.zone).ok_or_else(|| SvcError::NotFound {
        kind: ResourceKind::Host,
        id: format!("Up host in zone {}", volume.zone),
    })?;
    CommandDispatcher::new(registry)
        .send_to_host(&host.id, vec![command])
        .await
}

/// The path of the volume reported by the answer, if any.
fn answer_path(dispatched: &Dispatched) -> Option<String> {
    match dispatched.answer() {
        Some(Answer::VolumeCreated { path, .. }) | Some(Answer::Copied { path }) => {
            Some(path.clone())
        }
        _ => None,
    }
}

/// Build the command which materializes the volume on a pool.
fn create_command(
    registry: &Registry,
    volume: &VolumeSpec,
) -> Result<impl Fn(&StoragePool) -> Command, SvcError> {
    let snapshot_path = match &volume.snapshot {
        Some(snapshot) => {
            let snapshot = registry.specs().snapshot_rsc(snapshot)?.lock().clone();
            Some(snapshot.path.ok_or_else(|| SvcError::InvalidArguments {
                message: format!("snapshot '{}' has no backup path", snapshot.id),
            })?)
        }
        None => None,
    };
    let target = volume.target();
    let template = volume.template.clone();
    let url = volume.url.clone();
    Ok(move |pool: &StoragePool| match (&url, &snapshot_path) {
        (Some(url), _) => Command::CopyVolumeFromSecondary {
            volume: target.clone(),
            pool: pool.target(),
            url: url.clone(),
        },
        (None, Some(snapshot_path)) => Command::CreateVolumeFromSnapshot {
            volume: target.clone(),
            pool: pool.target(),
            snapshot_path: snapshot_path.clone(),
        },
        (None, None) => Command::CreateVolume {
            volume: target.clone(),
            pool: pool.target(),
            template: template.clone(),
        },
    })
}

impl OperationGuardArc<VolumeSpec> {
    /// Apply the event to the volume state machine and persist it.
    pub(crate) async fn transition(
        &mut self,
        registry: &Registry,
        event: VolumeEvent,
    ) -> Result<VolumeSpec, SvcError> {
        let volume = self
            .persist_with(registry, |volume| match volume.transition(event) {
                Some(_) => Ok(()),
                None => Err(invalid_state(volume, &event.to_string())),
            })
            .await?;
        self.update();
        Ok(volume)
    }

    /// Persist the changes to the volume.
    pub(crate) async fn modify<F>(
        &mut self,
        registry: &Registry,
        update: F,
    ) -> Result<VolumeSpec, SvcError>
    where
        F: FnOnce(&mut VolumeSpec) + Send,
    {
        let volume = self
            .persist_with(registry, |volume| {
                update(volume);
                Ok(())
            })
            .await?;
        self.update();
        Ok(volume)
    }

    /// Best effort return to `Ready` after a failed transient operation.
    pub(super) async fn operation_failed(&mut self, registry: &Registry, error: &SvcError) {
        self.warn(&format!("Operation failed: {}", error.full_string()));
        if let Err(error) = self.transition(registry, VolumeEvent::OperationFailed).await {
            self.error(&format!(
                "Failed to revert the volume state: {}",
                error.full_string()
            ));
        }
    }

    /// Remove the volume from the store and the cache.
    async fn remove(&mut self, registry: &Registry) -> Result<(), SvcError> {
        let volume = self.lock().clone();
        registry.delete_kv(&volume.key().key()).await?;
        registry.specs().remove_volume(&volume.id);
        self.info("Removed volume");
        Ok(())
    }

    /// Provision an allocated or uploaded volume on a pool picked by the allocator chain,
    /// trying the next suitable pool when the host reports the pool as unavailable.
    #[tracing::instrument(
        level = "info",
        skip(self, registry, vm),
        err,
        fields(volume.id = %self.as_ref().id)
    )]
    pub(crate) async fn provision(
        &mut self,
        registry: &Registry,
        vm: Option<&VmInstance>,
        avoid: &[PoolId],
    ) -> Result<VolumeSpec, SvcError> {
        let volume = self.lock().clone();
        let previous = volume.state;
        if !matches!(previous, VolumeState::Allocated | VolumeState::Uploaded) {
            return Err(invalid_state(&volume, "create"));
        }
        let offering = match &volume.disk_offering {
            Some(offering) => Some(registry.specs().offering(offering)?),
            None => None,
        };
        let profile = DiskProfile {
            volume: volume.id.clone(),
            size: volume.size,
            asking: CapacityTracker::asking_bytes(std::slice::from_ref(&volume)),
            tags: offering.as_ref().map(|o| o.tags.clone()).unwrap_or_default(),
            use_local_storage: offering.as_ref().map_or(false, |o| o.use_local_storage),
        };
        let deployments = deployments(registry, &volume.zone, vm);
        let preferred = vm.and_then(|vm| vm.host.clone()).into_iter().collect::<Vec<_>>();

        // an uploaded volume moves from secondary onto primary storage
        let counters = match previous {
            VolumeState::Uploaded => Some(registry.accountant().reserve(
                &volume.account,
                vec![(ResourceType::PrimaryStorage, volume.size)],
            )?),
            _ if volume.uncounted => Some(
                registry
                    .accountant()
                    .reserve(&volume.account, volume_counts(volume.size))?,
            ),
            _ => None,
        };
        let build_command = create_command(registry, &volume)?;

        self.transition(registry, VolumeEvent::CreateRequested)
            .await?;
        let mut avoid = avoid.iter().cloned().collect::<HashSet<_>>();
        let chain = AllocatorChain::default();
        let (pool, dispatched) = loop {
            let pool = deployments.iter().find_map(|deployment| {
                chain
                    .allocate(registry, &profile, deployment, &avoid)
                    .found()
            });
            let pool = match pool {
                Some(pool) => pool,
                None => {
                    let error = SvcError::NoSuitablePool {
                        vol_id: volume.id.clone(),
                    };
                    self.create_failed(registry, previous, &error).await;
                    return Err(error);
                }
            };
            let command = build_command(&pool);
            match CommandDispatcher::new(registry)
                .send(&pool.id, vec![command], &preferred, &[])
                .await
            {
                Ok(dispatched) => break (pool, dispatched),
                Err(SvcError::StorageUnavailable { pool_id }) => {
                    self.warn(&format!("Pool '{pool_id}' is unavailable, trying another"));
                    avoid.insert(pool_id);
                }
                Err(error) => {
                    self.create_failed(registry, previous, &error).await;
                    return Err(error);
                }
            }
        };

        let path = answer_path(&dispatched);
        let volume = self
            .persist_with(registry, |volume| {
                volume.pool = Some(pool.id.clone());
                volume.path = path;
                volume.uncounted = false;
                volume.transition(VolumeEvent::OperationSucceeded);
                Ok(())
            })
            .await?;
        self.update();
        if let Some(counters) = counters {
            counters.commit();
            if previous == VolumeState::Uploaded {
                registry.accountant().decrement(
                    &volume.account,
                    &[(ResourceType::SecondaryStorage, volume.size)],
                );
            }
        }
        CapacityTracker::new(registry).recalculate(&pool.id).await?;
        self.info(&format!("Created volume on pool '{}'", pool.id));
        Ok(volume)
    }

    /// Restore the pre-create state.
    /// An allocated volume also gives back the counters raised when it was allocated, and
    /// reserves them again on its next create.
    async fn create_failed(
        &mut self,
        registry: &Registry,
        previous: VolumeState,
        error: &SvcError,
    ) {
        self.warn(&format!("Failed to create volume: {}", error.full_string()));
        let volume = self.lock().clone();
        let release = previous == VolumeState::Allocated && !volume.uncounted;
        if release {
            registry
                .accountant()
                .decrement(&volume.account, &volume_counts(volume.size));
        }
        let result = self
            .persist_with(registry, |volume| {
                volume.state = previous;
                volume.uncounted |= release;
                Ok(())
            })
            .await;
        if let Err(error) = result {
            self.error(&format!(
                "Failed to revert the volume state: {}",
                error.full_string()
            ));
            let mut volume = self.lock();
            volume.state = previous;
            volume.uncounted |= release;
        }
        self.update();
    }

    /// Copy the volume to the destination pool and destroy the source copy.
    /// Shared by offline migration and the moves required to attach a volume.
    pub(crate) async fn relocate(
        &mut self,
        registry: &Registry,
        destination: &StoragePool,
    ) -> Result<VolumeSpec, SvcError> {
        let volume = self.lock().clone();
        let source = volume_pool(registry, &volume)?;
        self.transition(registry, VolumeEvent::MigrationRequested)
            .await?;

        let specs = registry.specs();
        let source_hosts = specs
            .host_pool_refs(&source.id)
            .into_iter()
            .map(|host_pool| host_pool.host)
            .collect::<HashSet<HostId>>();
        let preferred = specs
            .host_pool_refs(&destination.id)
            .into_iter()
            .map(|host_pool| host_pool.host)
            .filter(|host| source_hosts.contains(host))
            .collect::<Vec<_>>();
        let command = Command::CopyVolume {
            volume: volume.target(),
            source: source.target(),
            destination: destination.target(),
        };
        let dispatched = match CommandDispatcher::new(registry)
            .send(&destination.id, vec![command], &preferred, &[])
            .await
        {
            Ok(dispatched) => dispatched,
            Err(error) => {
                self.operation_failed(registry, &error).await;
                return Err(error);
            }
        };

        let path = answer_path(&dispatched);
        let moved = self
            .persist_with(registry, |volume| {
                volume.pool = Some(destination.id.clone());
                volume.path = path;
                volume.transition(VolumeEvent::OperationSucceeded);
                Ok(())
            })
            .await?;
        self.update();

        let destroy = Command::DestroyVolume {
            volume: volume.target(),
            pool: source.target(),
        };
        if let Err(error) = CommandDispatcher::new(registry)
            .send(&source.id, vec![destroy], &[], &[])
            .await
        {
            self.warn(&format!(
                "Failed to destroy the source copy on pool '{}': {}",
                source.id,
                error.full_string()
            ));
        }
        let capacity = CapacityTracker::new(registry);
        capacity.recalculate(&source.id).await?;
        capacity.recalculate(&destination.id).await?;
        self.info(&format!(
            "Moved volume from pool '{}' to pool '{}'",
            source.id, destination.id
        ));
        Ok(moved)
    }

    /// Delete a destroyed volume from primary storage, secondary storage and the cache.
    /// Each step is attempted regardless of the others. The volume record only goes away when
    /// primary storage was cleaned up.
    pub(crate) async fn expunge(&mut self, registry: &Registry) -> Result<(), SvcError> {
        let volume = self.lock().clone();
        if volume.state != VolumeState::Destroy {
            return Err(invalid_state(&volume, "expunge"));
        }
        self.transition(registry, VolumeEvent::ExpungingRequested)
            .await?;

        let mut failed = vec![];
        if let Some(pool) = volume.pool.clone() {
            let command = Command::DestroyVolume {
                volume: volume.target(),
                pool: registry.specs().pool(&pool)?.target(),
            };
            if let Err(error) = CommandDispatcher::new(registry)
                .send(&pool, vec![command], &[], &[])
                .await
            {
                self.warn(&format!(
                    "Failed to expunge from primary storage: {}",
                    error.full_string()
                ));
                failed.push("primary".to_string());
            }
        }
        let secondary = Command::DeleteFromSecondary {
            volume: volume.id.clone(),
        };
        if let Err(error) = send_to_zone(registry, &volume, secondary).await {
            self.warn(&format!(
                "Failed to expunge from secondary storage: {}",
                error.full_string()
            ));
            failed.push("secondary".to_string());
        }
        let cache = Command::DeleteFromCache {
            volume: volume.id.clone(),
        };
        if let Err(error) = send_to_zone(registry, &volume, cache).await {
            self.warn(&format!(
                "Failed to expunge from the cache: {}",
                error.full_string()
            ));
            failed.push("cache".to_string());
        }

        if failed.iter().any(|step| step == "primary") {
            self.transition(registry, VolumeEvent::OperationFailed)
                .await?;
        } else {
            self.transition(registry, VolumeEvent::OperationSucceeded)
                .await?;
            self.remove(registry).await?;
            if let Some(pool) = &volume.pool {
                CapacityTracker::new(registry).recalculate(pool).await?;
            }
        }
        match failed.is_empty() {
            true => Ok(()),
            false => Err(SvcError::ExpungeIncomplete {
                vol_id: volume.id,
                failed,
            }),
        }
    }

    /// Recover a destroyed volume which was not expunged yet.
    pub(crate) async fn recover(&mut self, registry: &Registry) -> Result<VolumeSpec, SvcError> {
        let volume = self.lock().clone();
        if volume.state != VolumeState::Destroy || volume.pool.is_none() {
            return Err(invalid_state(&volume, "recover"));
        }
        let counters = registry
            .accountant()
            .reserve(&volume.account, volume_counts(volume.size))?;
        let volume = self
            .transition(registry, VolumeEvent::RecoverRequested)
            .await?;
        counters.commit();
        self.info("Recovered volume");
        Ok(volume)
    }
}

/// The attributes of a volume after a resize.
struct Resized {
    size: u64,
    offering: Option<DiskOffering>,
    min_iops: Option<u64>,
    max_iops: Option<u64>,
}

/// Validate the resize request against the volume, before any side effect.
fn validate_resize(
    registry: &Registry,
    volume: &VolumeSpec,
    request: &ResizeVolume,
) -> Result<Resized, SvcError> {
    let specs = registry.specs();
    let resized = match &request.new_offering {
        Some(offering) => {
            let offering = specs.offering(offering)?;
            if let Some(pool) = &volume.pool {
                let pool = specs.pool(pool)?;
                if !pool.has_tags(&offering.tags) {
                    return Err(SvcError::InvalidArguments {
                        message: format!(
                            "pool '{}' does not carry the tags of disk offering '{}'",
                            pool.id, offering.id
                        ),
                    });
                }
            }
            let size = match offering.custom_size {
                true => request.new_size.unwrap_or(volume.size),
                false => offering_size(registry, &offering, request.new_size)?,
            };
            let (min_iops, max_iops) = match offering.custom_iops {
                true => (
                    request.min_iops.or(volume.min_iops),
                    request.max_iops.or(volume.max_iops),
                ),
                false => offering_iops(&offering, request.min_iops, request.max_iops)?,
            };
            Resized {
                size,
                offering: Some(offering),
                min_iops,
                max_iops,
            }
        }
        None => {
            let size = request.new_size.ok_or_else(|| SvcError::InvalidArguments {
                message: "either a new size or a new disk offering is required".to_string(),
            })?;
            let offering = match &volume.disk_offering {
                Some(offering) => Some(specs.offering(offering)?),
                None => None,
            };
            let custom_size = offering.as_ref().map_or(false, |o| o.custom_size);
            if !custom_size && !volume.is_root() {
                return Err(SvcError::InvalidArguments {
                    message: format!(
                        "the disk offering of volume '{}' does not allow custom sizes",
                        volume.id
                    ),
                });
            }
            let custom_iops = offering.as_ref().map_or(false, |o| o.custom_iops);
            let iops_change = request.min_iops.is_some() || request.max_iops.is_some();
            if iops_change && !custom_iops {
                return Err(SvcError::InvalidArguments {
                    message: format!(
                        "the disk offering of volume '{}' does not allow custom iops",
                        volume.id
                    ),
                });
            }
            Resized {
                size,
                offering,
                min_iops: request.min_iops.or(volume.min_iops),
                max_iops: request.max_iops.or(volume.max_iops),
            }
        }
    };

    check_iops(resized.min_iops, resized.max_iops)?;
    let config = registry.config();
    let min = if volume.is_root() {
        1
    } else {
        config.min_volume_size
    };
    if resized.size < min || resized.size > config.max_volume_size {
        return Err(SvcError::InvalidVolumeSize {
            size: resized.size,
            min,
            max: config.max_volume_size,
        });
    }
    if resized.size < volume.size && !request.shrink_ok {
        return Err(SvcError::ShrinkNotConfirmed {
            vol_id: volume.id.clone(),
            current: volume.size,
            requested: resized.size,
        });
    }
    if resized.size > volume.size {
        registry.accountant().check(
            &volume.account,
            &[(ResourceType::PrimaryStorage, resized.size - volume.size)],
        )?;
    }
    Ok(resized)
}

/// Resize a volume or change its disk offering.
#[tracing::instrument(level = "info", skip(registry), err, fields(volume.id = %request.volume))]
pub(crate) async fn resize_volume(
    registry: &Registry,
    request: &ResizeVolume,
) -> Result<VolumeSpec, SvcError> {
    let mut guard = volume_guard(registry, &request.volume).await?;
    let volume = guard.lock().clone();
    if !matches!(volume.state, VolumeState::Allocated | VolumeState::Ready) {
        return Err(invalid_state(&volume, "resize"));
    }
    let resized = validate_resize(registry, &volume, request)?;
    let apply = |spec: &mut VolumeSpec| {
        spec.size = resized.size;
        spec.disk_offering = resized.offering.as_ref().map(|o| o.id.clone());
        spec.min_iops = resized.min_iops;
        spec.max_iops = resized.max_iops;
    };

    let specs = registry.specs();
    let updated = if volume.state == VolumeState::Allocated {
        guard.modify(registry, apply).await?
    } else {
        let pool = volume_pool(registry, &volume)?;
        if !CapacityTracker::new(registry).has_space_for_resize(&pool, volume.size, resized.size) {
            return Err(SvcError::NoSuitablePool {
                vol_id: volume.id.clone(),
            });
        }
        guard
            .transition(registry, VolumeEvent::ResizeRequested)
            .await?;

        let command = Command::ResizeVolume {
            volume: volume.target(),
            pool: pool.target(),
            vm: volume.vm.clone(),
            new_size: resized.size,
            shrink_ok: request.shrink_ok,
        };
        let vm_host = match &volume.vm {
            Some(vm) => specs.vm(vm)?.host_or_last().cloned(),
            None => None,
        };
        let dispatcher = CommandDispatcher::new(registry);
        let result = match &vm_host {
            Some(host) => dispatcher.send_to_host(host, vec![command]).await,
            None => dispatcher.send(&pool.id, vec![command], &[], &[]).await,
        };
        if let Err(error) = result {
            guard.operation_failed(registry, &error).await;
            return Err(error);
        }
        guard
            .modify(registry, |spec| {
                apply(spec);
                spec.transition(VolumeEvent::OperationSucceeded);
            })
            .await?
    };

    let accountant = registry.accountant();
    if updated.size > volume.size {
        accountant.increment(
            &volume.account,
            &[(ResourceType::PrimaryStorage, updated.size - volume.size)],
        );
    } else if updated.size < volume.size {
        accountant.decrement(
            &volume.account,
            &[(ResourceType::PrimaryStorage, volume.size - updated.size)],
        );
    }
    if let Some(pool) = &updated.pool {
        CapacityTracker::new(registry).recalculate(pool).await?;
    }
    if let Some(event) = UsageEvent::for_volume(UsageEventType::VolumeResize, &updated) {
        registry.usage().publish(event);
    }
    guard.info(&format!("Resized volume from {} to {} bytes", volume.size, updated.size));
    Ok(updated)
}

/// Migrate a volume to another pool, live when its vm is running.
#[tracing::instrument(
    level = "info",
    skip(registry),
    err,
    fields(volume.id = %request.volume, pool.id = %request.pool)
)]
pub(crate) async fn migrate_volume(
    registry: &Registry,
    request: &MigrateVolume,
) -> Result<VolumeSpec, SvcError> {
    let mut guard = volume_guard(registry, &request.volume).await?;
    let volume = guard.lock().clone();
    if volume.state != VolumeState::Ready {
        return Err(invalid_state(&volume, "migrate"));
    }
    let not_supported = |reason: &str| SvcError::MigrationNotSupported {
        vol_id: volume.id.clone(),
        reason: reason.to_string(),
    };
    let specs = registry.specs();
    let source = volume_pool(registry, &volume)?;
    if source.id == request.pool {
        return Err(not_supported("the volume is already on the destination pool"));
    }
    let destination = specs.pool(&request.pool)?;
    if !destination.is_up() {
        return Err(SvcError::InvalidPoolStatus {
            pool_id: destination.id.clone(),
            status: destination.status,
            operation: "migrate".to_string(),
        });
    }
    if let Some(offering) = &volume.disk_offering {
        if !destination.has_tags(&specs.offering(offering)?.tags) {
            return Err(not_supported("the destination pool lacks the storage tags"));
        }
    }
    let capacity = CapacityTracker::new(registry);
    let allocated = capacity.allocated_bytes(&destination.id);
    if !capacity.has_used_space(&destination)
        || !capacity.has_allocated_space(&destination, allocated, volume.size)
    {
        return Err(SvcError::NoSuitablePool {
            vol_id: volume.id.clone(),
        });
    }

    let vm = match &volume.vm {
        Some(vm) => Some(specs.vm(vm)?),
        None => None,
    };
    match vm {
        Some(vm) if vm.running() => {
            if !request.live_migrate {
                return Err(not_supported(
                    "the volume is attached to a running vm and live migration was not requested",
                ));
            }
            let motion = registry
                .hypervisors()
                .get(vm.hypervisor)
                .map_or(false, |capabilities| capabilities.storage_motion);
            if !motion {
                return Err(not_supported("the hypervisor does not support storage motion"));
            }
            let host = vm.host.clone().ok_or_else(|| not_supported("the vm has no host"))?;
            live_migrate(registry, &mut guard, &vm, &host, &source, &destination).await
        }
        _ => {
            if !source.is_shared() {
                return Err(not_supported("the source pool is host local"));
            }
            if destination.scope < source.scope {
                return Err(not_supported("the destination pool has a narrower scope"));
            }
            guard.relocate(registry, &destination).await
        }
    }
}

async fn live_migrate(
    registry: &Registry,
    guard: &mut OperationGuardArc<VolumeSpec>,
    vm: &VmInstance,
    host: &HostId,
    source: &StoragePool,
    destination: &StoragePool,
) -> Result<VolumeSpec, SvcError> {
    let volume = guard.lock().clone();
    guard
        .transition(registry, VolumeEvent::MigrationRequested)
        .await?;
    let command = Command::MigrateVolume {
        volume: volume.target(),
        destination: destination.target(),
        vm: vm.id.clone(),
    };
    let dispatched = match CommandDispatcher::new(registry)
        .send_to_host(host, vec![command])
        .await
    {
        Ok(dispatched) => dispatched,
        Err(error) => {
            guard.operation_failed(registry, &error).await;
            return Err(error);
        }
    };
    let path = answer_path(&dispatched);
    let migrated = guard
        .modify(registry, |volume| {
            volume.pool = Some(destination.id.clone());
            volume.path = path;
            volume.transition(VolumeEvent::OperationSucceeded);
        })
        .await?;
    let capacity = CapacityTracker::new(registry);
    capacity.recalculate(&source.id).await?;
    capacity.recalculate(&destination.id).await?;
    guard.info(&format!(
        "Live migrated volume from pool '{}' to pool '{}'",
        source.id, destination.id
    ));
    Ok(migrated)
}
