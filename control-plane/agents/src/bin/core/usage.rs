//! Usage events of volumes, for billing.
use stor_port::types::v0::{
    store::volume::VolumeSpec,
    transport::{AccountId, DiskOfferingId, VolumeId, ZoneId},
};
use strum_macros::{AsRefStr, Display};

/// Type of a volume usage event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, AsRefStr)]
pub(crate) enum UsageEventType {
    VolumeCreate,
    VolumeDelete,
    VolumeResize,
    VolumeUpload,
}

/// A volume usage event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UsageEvent {
    pub(crate) event_type: UsageEventType,
    pub(crate) account: AccountId,
    pub(crate) zone: ZoneId,
    pub(crate) volume: VolumeId,
    pub(crate) name: String,
    pub(crate) offering: Option<DiskOfferingId>,
    pub(crate) size: u64,
    pub(crate) display: bool,
}

impl UsageEvent {
    /// The event of the given type for the volume, none for system owned volumes.
    pub(crate) fn for_volume(event_type: UsageEventType, volume: &VolumeSpec) -> Option<Self> {
        if volume.system {
            return None;
        }
        Some(Self {
            event_type,
            account: volume.account.clone(),
            zone: volume.zone.clone(),
            volume: volume.id.clone(),
            name: volume.name.clone(),
            offering: volume.disk_offering.clone(),
            size: volume.size,
            display: volume.display,
        })
    }
}

/// Receives the usage events.
pub(crate) trait UsageEventSink: Send + Sync {
    /// Publish the event.
    fn publish(&self, event: UsageEvent);
}

/// Logs the usage events.
#[derive(Debug, Default)]
pub(crate) struct LogUsageSink {}

impl UsageEventSink for LogUsageSink {
    fn publish(&self, event: UsageEvent) {
        tracing::info!(
            event = event.event_type.as_ref(),
            account = %event.account,
            zone = %event.zone,
            volume.id = %event.volume,
            size = event.size,
            display = event.display,
            "Usage event"
        );
    }
}
