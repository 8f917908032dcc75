/// Keyed lock service.
pub(crate) mod lock;
/// The registry which holds all resources and the collaborators used to act on them.
pub(crate) mod registry;
/// Resource specs, their cache and operation sequencing.
pub(crate) mod resources;
/// Pool selection for volume placement.
pub(crate) mod scheduling;
