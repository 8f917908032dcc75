use super::{ResourceMutex, ResourceUid};
use stor_port::types::v0::{store::pool::StoragePool, transport::PoolId};

impl ResourceMutex<StoragePool> {
    /// Get the resource id.
    pub(crate) fn id(&self) -> &PoolId {
        &self.immutable_ref().id
    }
}

impl ResourceUid for StoragePool {
    type Uid = PoolId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

macro_rules! pool_log {
    ($Self:tt, $Level:expr, $Message:tt) => {
        match tracing::Span::current().field("pool.id") {
            None => {
                let _span = tracing::span!($Level, "log_event", pool.id = %$Self.id).entered();
                tracing::event!($Level, pool.id = %$Self.id, status = %$Self.status, $Message);
            }
            Some(_) => {
                tracing::event!($Level, pool.id = %$Self.id, status = %$Self.status, $Message);
            }
        }
    };
}
crate::impl_trace_str_log!(pool_log, StoragePool);
