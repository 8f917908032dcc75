use super::{ResourceMutex, ResourceUid};
use stor_port::types::v0::{
    store::{snapshot::VolumeSnapshot, volume::VolumeSpec},
    transport::{SnapshotId, VolumeId},
};

impl ResourceMutex<VolumeSpec> {
    /// Get the resource id.
    pub(crate) fn id(&self) -> &VolumeId {
        &self.immutable_ref().id
    }
}
impl ResourceUid for VolumeSpec {
    type Uid = VolumeId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

impl ResourceUid for VolumeSnapshot {
    type Uid = SnapshotId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

macro_rules! volume_log {
    ($Self:tt, $Level:expr, $Message:tt) => {
        match tracing::Span::current().field("volume.id") {
            None => {
                let _span = tracing::span!($Level, "log_event", volume.id = %$Self.id).entered();
                tracing::event!($Level, volume.id = %$Self.id, state = %$Self.state, $Message);
            }
            Some(_) => {
                tracing::event!($Level, volume.id = %$Self.id, state = %$Self.state, $Message);
            }
        }
    };
}
crate::impl_trace_str_log!(volume_log, VolumeSpec);
