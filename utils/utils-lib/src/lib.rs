pub mod constants;
pub use constants::*;

pub mod bytes;

pub mod tracing_telemetry;

/// Print the package name and version.
#[macro_export]
macro_rules! print_package_info {
    () => {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    };
}
