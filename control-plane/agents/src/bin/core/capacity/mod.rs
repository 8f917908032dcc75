/// Pool and host stats samples and their poller.
pub(crate) mod stats;
mod tracker;

pub(crate) use tracker::CapacityTracker;
