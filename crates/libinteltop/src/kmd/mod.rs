use std::path::PathBuf;
use std::sync::Arc;

use crate::device_path::{DevicePath, KmdKind};
use crate::error::{Result, TelemetryError};
use crate::perf::{CounterConfig, CounterHandle};
use crate::stat::EngineGroup;

mod i915;
pub use i915::I915Upstream;

mod i915_prelim;
pub use i915_prelim::I915Prelim;

mod xe;
pub use xe::Xe;

/// Sysfs attributes with backend-specific spellings. The grammar for each
/// spelling lives in the backend, not in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysfsName {
    MinFrequency,
    MaxFrequency,
    CurrentFrequency,
    MinDefaultFrequency,
    MaxDefaultFrequency,
    SustainedPowerLimit,
    SustainedPowerLimitInterval,
    /// prelim i915 only
    MediaFrequencyFactor,
    /// xe only
    PhysicalMemorySize,
}

/// Native unit of a sysfs value, relative to the base unit of its quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysfsValueUnit {
    Base,
    Milli,
    Micro,
}

impl SysfsValueUnit {
    const fn per_base(&self) -> u64 {
        match self {
            Self::Base => 1,
            Self::Milli => 1_000,
            Self::Micro => 1_000_000,
        }
    }
}

/// Exact integer rescale between units, truncating toward zero when the
/// target unit is coarser.
pub fn convert_unit(value: u64, from: SysfsValueUnit, to: SysfsValueUnit) -> u64 {
    let (from, to) = (from.per_base(), to.per_base());

    if from <= to {
        value * (to / from)
    } else {
        value / (from / to)
    }
}

/// Everything that differs between Linux kernel-driver generations, behind
/// one flat interface. Exactly one implementation is alive per device,
/// selected once at init time.
pub trait KmdInterface: Send + Sync {
    fn name(&self) -> &'static str;
    fn pmu_type(&self) -> u32;

    // capability flags, pure data
    fn is_group_engine_interface_available(&self) -> bool;
    fn is_client_info_available_in_fdinfo(&self) -> bool;
    fn is_vf_engine_utilization_supported(&self) -> bool;
    fn is_media_frequency_factor_available(&self) -> bool;
    fn is_power_limit_available(&self) -> bool;

    // sysfs path grammar, pure string construction relative to
    // /sys/class/drm/card<N>
    fn sysfs_base_path(&self, subdevice_id: u32) -> PathBuf;
    fn sysfs_file_path(&self, name: SysfsName, subdevice_id: u32, base_dir_exists: bool) -> PathBuf;
    fn engine_base_path(&self, subdevice_id: u32) -> PathBuf;
    fn native_unit(&self, name: SysfsName) -> SysfsValueUnit;

    /// Counter config pair for one engine key. Aggregate groups are only
    /// supported where the KMD has a real group PMU; everything else is a
    /// per-group `UnsupportedFeature`.
    fn engine_activity_config(
        &self,
        group: EngineGroup,
        instance: u32,
        subdevice_id: u32,
    ) -> Result<CounterConfig>;

    fn open_counter_handle(&self, config: &CounterConfig) -> Result<CounterHandle> {
        match config.total_ticks {
            Some(total) => CounterHandle::open_pair(self.pmu_type(), config.active_ticks, total),
            None => CounterHandle::open_grouped(self.pmu_type(), config.active_ticks),
        }
    }
}

/// Pick the one backend for this device. Fails soft when the perf PMU for
/// the device is not registered (kernel too old, module options).
pub fn select_backend(device_path: &DevicePath) -> Result<Arc<dyn KmdInterface>> {
    let pmu_path = device_path
        .pmu_path
        .as_ref()
        .ok_or(TelemetryError::UnsupportedFeature)?;
    let pmu_type: u32 = crate::parse_sysfs(pmu_path.join("type"))
        .ok_or(TelemetryError::UnsupportedFeature)?;

    Ok(match device_path.kmd {
        KmdKind::I915Upstream => Arc::new(I915Upstream::new(pmu_type)),
        KmdKind::I915Prelim => Arc::new(I915Prelim::new(pmu_type)),
        KmdKind::Xe => Arc::new(Xe::new(pmu_type, pmu_path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion_is_exact_integer_scaling() {
        assert_eq!(convert_unit(5, SysfsValueUnit::Milli, SysfsValueUnit::Micro), 5_000);
        assert_eq!(convert_unit(5_500, SysfsValueUnit::Micro, SysfsValueUnit::Milli), 5);
        assert_eq!(convert_unit(3, SysfsValueUnit::Base, SysfsValueUnit::Micro), 3_000_000);
        assert_eq!(convert_unit(42, SysfsValueUnit::Milli, SysfsValueUnit::Milli), 42);
        assert_eq!(convert_unit(999, SysfsValueUnit::Micro, SysfsValueUnit::Base), 0);
    }
}
