/// Version 0 of the control-plane types.
pub mod v0;
