pub mod error;
pub use error::TelemetryError;

pub mod stat;

pub mod kmd;

pub mod perf;
pub use perf::{BusynessSample, CounterConfig, CounterHandle};

mod device_path;
pub use device_path::{DevicePath, KmdKind};

mod device_fd;
pub use device_fd::{DeviceFd, DeviceFdGuard};

pub(crate) fn parse_sysfs<T: std::str::FromStr, P: Into<std::path::PathBuf>>(path: P) -> Option<T> {
    std::fs::read_to_string(path.into()).ok()
        .and_then(|file| file.trim_end().parse::<T>().ok())
}
