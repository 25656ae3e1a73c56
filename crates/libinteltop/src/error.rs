use nix::errno::Errno;

/// Severity taxonomy for the telemetry core.
///
/// `DependencyUnavailable` and `UnsupportedFeature` only occur at discovery
/// time; the former is fatal to a whole registry, the latter is always
/// per-item (the unsupported engine or config is omitted, nothing crashes).
/// `Unknown` is a runtime syscall failure on a handle that was expected to
/// work. The discovery-time and runtime severities are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    #[error("device handle is unavailable")]
    DependencyUnavailable,
    #[error("not supported by the active KMD backend")]
    UnsupportedFeature,
    #[error("syscall failed: {0}")]
    Unknown(Errno),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
