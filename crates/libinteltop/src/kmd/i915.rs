use std::path::PathBuf;

use crate::error::{Result, TelemetryError};
use crate::perf::CounterConfig;
use crate::stat::{class_for_group, EngineGroup};
use super::{KmdInterface, SysfsName, SysfsValueUnit};

// Engine event encoding from i915_drm.h:
//   __I915_PMU_ENGINE(class, instance, sample)
//     = class << 12 | instance << 4 | sample
const I915_PMU_SAMPLE_BITS: u64 = 4;
const I915_PMU_SAMPLE_INSTANCE_BITS: u64 = 8;
const I915_PMU_CLASS_SHIFT: u64 = I915_PMU_SAMPLE_BITS + I915_PMU_SAMPLE_INSTANCE_BITS;

pub(crate) const I915_SAMPLE_BUSY: u64 = 0;

pub(crate) const fn i915_pmu_engine(class: u64, instance: u64, sample: u64) -> u64 {
    (class << I915_PMU_CLASS_SHIFT) | (instance << I915_PMU_SAMPLE_BITS) | sample
}

/// Non-engine events live past the end of the engine encoding space.
pub(crate) const fn i915_pmu_other(x: u64) -> u64 {
    i915_pmu_engine(0xff, 0xff, 0xf) + 1 + x
}

/// Wall-clock reference the busy counter is compared against.
const I915_PMU_SOFTWARE_GT_AWAKE_TIME: u64 = i915_pmu_other(4);

/// Upstream i915: per-engine busy sampling only, no group PMU, legacy flat
/// sysfs names on older kernels.
pub struct I915Upstream {
    pmu_type: u32,
}

impl I915Upstream {
    pub fn new(pmu_type: u32) -> Self {
        Self { pmu_type }
    }
}

impl KmdInterface for I915Upstream {
    fn name(&self) -> &'static str {
        "i915"
    }

    fn pmu_type(&self) -> u32 {
        self.pmu_type
    }

    fn is_group_engine_interface_available(&self) -> bool {
        false
    }

    fn is_client_info_available_in_fdinfo(&self) -> bool {
        false
    }

    fn is_vf_engine_utilization_supported(&self) -> bool {
        false
    }

    fn is_media_frequency_factor_available(&self) -> bool {
        false
    }

    fn is_power_limit_available(&self) -> bool {
        false
    }

    fn sysfs_base_path(&self, subdevice_id: u32) -> PathBuf {
        PathBuf::from(format!("gt/gt{subdevice_id}"))
    }

    fn sysfs_file_path(&self, name: SysfsName, subdevice_id: u32, base_dir_exists: bool) -> PathBuf {
        i915_sysfs_file_path(self, name, subdevice_id, base_dir_exists)
    }

    fn engine_base_path(&self, _subdevice_id: u32) -> PathBuf {
        PathBuf::from("engine")
    }

    fn native_unit(&self, name: SysfsName) -> SysfsValueUnit {
        i915_native_unit(name)
    }

    fn engine_activity_config(
        &self,
        group: EngineGroup,
        instance: u32,
        _subdevice_id: u32,
    ) -> Result<CounterConfig> {
        // no group PMU upstream
        let class = class_for_group(group).ok_or(TelemetryError::UnsupportedFeature)?;

        Ok(CounterConfig {
            active_ticks: i915_pmu_engine(class as u64, instance as u64, I915_SAMPLE_BUSY),
            total_ticks: Some(I915_PMU_SOFTWARE_GT_AWAKE_TIME),
        })
    }
}

/// Shared by upstream and prelim: per-GT files moved under `gt/gt<N>/` with
/// an `rps_` prefix; kernels without that directory use the flat legacy
/// names.
pub(crate) fn i915_sysfs_file_path(
    kmd: &dyn KmdInterface,
    name: SysfsName,
    subdevice_id: u32,
    base_dir_exists: bool,
) -> PathBuf {
    let field = if base_dir_exists {
        match name {
            SysfsName::MinFrequency => "rps_min_freq_mhz",
            SysfsName::MaxFrequency => "rps_max_freq_mhz",
            SysfsName::CurrentFrequency => "rps_cur_freq_mhz",
            SysfsName::MinDefaultFrequency => "rps_RPn_freq_mhz",
            SysfsName::MaxDefaultFrequency => "rps_RP0_freq_mhz",
            SysfsName::MediaFrequencyFactor => "media_freq_factor",
            SysfsName::SustainedPowerLimit => "power1_max",
            SysfsName::SustainedPowerLimitInterval => "power1_max_interval",
            SysfsName::PhysicalMemorySize => "addr_range",
        }
    } else {
        match name {
            SysfsName::MinFrequency => "gt_min_freq_mhz",
            SysfsName::MaxFrequency => "gt_max_freq_mhz",
            SysfsName::CurrentFrequency => "gt_cur_freq_mhz",
            SysfsName::MinDefaultFrequency => "gt_RPn_freq_mhz",
            SysfsName::MaxDefaultFrequency => "gt_RP0_freq_mhz",
            SysfsName::MediaFrequencyFactor => "media_freq_factor",
            SysfsName::SustainedPowerLimit => "power1_max",
            SysfsName::SustainedPowerLimitInterval => "power1_max_interval",
            SysfsName::PhysicalMemorySize => "addr_range",
        }
    };

    if base_dir_exists {
        kmd.sysfs_base_path(subdevice_id).join(field)
    } else {
        PathBuf::from(field)
    }
}

pub(crate) fn i915_native_unit(name: SysfsName) -> SysfsValueUnit {
    match name {
        SysfsName::SustainedPowerLimit => SysfsValueUnit::Micro,
        SysfsName::SustainedPowerLimitInterval => SysfsValueUnit::Milli,
        _ => SysfsValueUnit::Base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_event_encoding() {
        // class 1, instance 2, sample busy
        assert_eq!(i915_pmu_engine(1, 2, I915_SAMPLE_BUSY), 0x1020);
        assert_eq!(i915_pmu_other(0), 0xf_ffff + 1);
    }

    #[test]
    fn busy_config_pairs_with_gt_awake_time() {
        let kmd = I915Upstream::new(17);
        let config = kmd.engine_activity_config(EngineGroup::CopySingle, 0, 0).unwrap();

        assert_eq!(config.active_ticks, 1 << 12);
        assert_eq!(config.total_ticks, Some(I915_PMU_SOFTWARE_GT_AWAKE_TIME));
    }

    #[test]
    fn aggregate_groups_are_rejected() {
        let kmd = I915Upstream::new(17);

        for group in [EngineGroup::All, EngineGroup::RenderAll, EngineGroup::MediaAll] {
            assert_eq!(
                kmd.engine_activity_config(group, 0, 0),
                Err(TelemetryError::UnsupportedFeature),
            );
        }
    }

    #[test]
    fn per_gt_and_legacy_path_grammar() {
        let kmd = I915Upstream::new(17);

        assert_eq!(
            kmd.sysfs_file_path(SysfsName::MinFrequency, 0, true),
            PathBuf::from("gt/gt0/rps_min_freq_mhz"),
        );
        assert_eq!(
            kmd.sysfs_file_path(SysfsName::MinFrequency, 0, false),
            PathBuf::from("gt_min_freq_mhz"),
        );
        assert_eq!(kmd.engine_base_path(0), PathBuf::from("engine"));
    }
}
