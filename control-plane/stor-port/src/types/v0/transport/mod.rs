mod account;
mod command;
mod host;
mod misc;
mod pool;
mod vm;
mod volume;

pub use account::*;
pub use command::*;
pub use host::*;
pub use misc::*;
pub use pool::*;
pub use vm::*;
pub use volume::*;
