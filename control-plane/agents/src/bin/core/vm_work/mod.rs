//! Serialization of the mutating operations of a virtual machine.
//!
//! Every operation which targets a vm runs as a `VmWork` under the vm's keyed lock. A fresh
//! caller submits it as a persisted `VmWorkJob` and polls the job until it completes, whereas a
//! caller already running inside a job of the same vm executes it inline. Both paths end up in
//! `execute`, so the operations themselves are written once.
mod queue;

pub(crate) use queue::{fail_orphaned_jobs, in_vm_work, VmWorkQueue};

use crate::{controller::registry::Registry, vm, volume};
use agents::errors::SvcError;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use stor_port::types::v0::transport::{
    AttachVolume, CreateVolumeSnapshot, DetachVolume, ExtractVolume, MigrateVolume, ResizeVolume,
    VmId,
};
use strum_macros::AsRefStr;

const VOLUME_DISPATCHER: &str = "VolumeApiService";
const VM_DISPATCHER: &str = "VirtualMachineManager";

/// A unit of work bound to a single vm, along with its original parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, AsRefStr)]
#[serde(tag = "handler")]
pub(crate) enum VmWork {
    AttachVolume(AttachVolume),
    DetachVolume(DetachVolume),
    ResizeVolume(ResizeVolume),
    MigrateVolume(MigrateVolume),
    TakeSnapshot(CreateVolumeSnapshot),
    ExtractVolume(ExtractVolume),
    StopVm { vm: VmId, forced: bool },
    StartVm { vm: VmId },
}

impl VmWork {
    /// The service which handles the work.
    pub(crate) fn dispatcher(&self) -> &'static str {
        match self {
            VmWork::StopVm { .. } | VmWork::StartVm { .. } => VM_DISPATCHER,
            _ => VOLUME_DISPATCHER,
        }
    }
    /// The handler of the work within its service.
    pub(crate) fn handler(&self) -> &str {
        self.as_ref()
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, SvcError> {
    serde_json::to_value(value).context(agents::errors::Serde {
        what: "vm work result",
    })
}

/// Run the work, returning its serialized result.
pub(crate) async fn execute(
    registry: &Registry,
    work: VmWork,
) -> Result<serde_json::Value, SvcError> {
    match work {
        VmWork::AttachVolume(request) => {
            to_value(&volume::attach_volume(registry, &request).await?)
        }
        VmWork::DetachVolume(request) => {
            to_value(&volume::detach_volume(registry, &request).await?)
        }
        VmWork::ResizeVolume(request) => {
            to_value(&volume::resize_volume(registry, &request).await?)
        }
        VmWork::MigrateVolume(request) => {
            to_value(&volume::migrate_volume(registry, &request).await?)
        }
        VmWork::TakeSnapshot(request) => {
            to_value(&volume::snapshot_volume(registry, &request).await?)
        }
        VmWork::ExtractVolume(request) => {
            to_value(&volume::extract_volume(registry, &request).await?)
        }
        VmWork::StopVm { vm, forced } => to_value(&vm::stop_vm(registry, &vm, forced).await?),
        VmWork::StartVm { vm } => to_value(&vm::start_vm(registry, &vm).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_the_handler() {
        let work = VmWork::StopVm {
            vm: VmId::from("vm-1"),
            forced: false,
        };
        assert_eq!(work.handler(), "StopVm");
        assert_eq!(work.dispatcher(), VM_DISPATCHER);

        let payload = serde_json::to_value(&work).unwrap();
        assert_eq!(payload["handler"], "StopVm");
        assert_eq!(serde_json::from_value::<VmWork>(payload).unwrap(), work);

        let work = VmWork::DetachVolume(DetachVolume {
            volume: "vol-1".into(),
        });
        assert_eq!(work.dispatcher(), VOLUME_DISPATCHER);
    }
}
