use super::ResourceUid;
use stor_port::types::v0::{
    store::{
        host::Host, node::ControlPlaneNode, offering::DiskOffering, vm::VmInstance,
        vm_work::VmWorkJob,
    },
    transport::{DiskOfferingId, HostId, JobId, NodeId, VmId},
};

impl ResourceUid for Host {
    type Uid = HostId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

impl ResourceUid for VmInstance {
    type Uid = VmId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

impl ResourceUid for DiskOffering {
    type Uid = DiskOfferingId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

impl ResourceUid for VmWorkJob {
    type Uid = JobId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}

impl ResourceUid for ControlPlaneNode {
    type Uid = NodeId;
    fn uid(&self) -> &Self::Uid {
        &self.id
    }
}
