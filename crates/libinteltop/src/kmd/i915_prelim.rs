use std::path::PathBuf;

use crate::error::{Result, TelemetryError};
use crate::perf::CounterConfig;
use crate::stat::{class_for_group, EngineGroup};
use super::i915::{i915_native_unit, i915_pmu_engine, i915_pmu_other, i915_sysfs_file_path};
use super::{KmdInterface, SysfsName, SysfsValueUnit};

// From i915_drm_prelim.h. Engine tick samples start at half of the 4-bit
// sample space; group-busy events are non-engine events carrying the GT id
// in the top bits.
const PRELIM_I915_SAMPLE_BUSY_TICKS: u64 = 8;
const PRELIM_I915_SAMPLE_TOTAL_TICKS: u64 = 9;
const PRELIM_I915_PMU_GT_SHIFT: u64 = 60;

const fn prelim_pmu_other(gt: u64, x: u64) -> u64 {
    i915_pmu_other(x) | (gt << PRELIM_I915_PMU_GT_SHIFT)
}

const fn prelim_render_group_busy(gt: u64) -> u64 {
    prelim_pmu_other(gt, 7)
}

const fn prelim_copy_group_busy(gt: u64) -> u64 {
    prelim_pmu_other(gt, 8)
}

const fn prelim_media_group_busy(gt: u64) -> u64 {
    prelim_pmu_other(gt, 9)
}

const fn prelim_any_engine_group_busy(gt: u64) -> u64 {
    prelim_pmu_other(gt, 10)
}

/// Prelim (discrete-GPU backport) i915: per-engine busy/total tick pairs and
/// a real group PMU for the aggregate engine groups.
pub struct I915Prelim {
    pmu_type: u32,
}

impl I915Prelim {
    pub fn new(pmu_type: u32) -> Self {
        Self { pmu_type }
    }
}

impl KmdInterface for I915Prelim {
    fn name(&self) -> &'static str {
        "i915-prelim"
    }

    fn pmu_type(&self) -> u32 {
        self.pmu_type
    }

    fn is_group_engine_interface_available(&self) -> bool {
        true
    }

    fn is_client_info_available_in_fdinfo(&self) -> bool {
        false
    }

    fn is_vf_engine_utilization_supported(&self) -> bool {
        false
    }

    fn is_media_frequency_factor_available(&self) -> bool {
        true
    }

    fn is_power_limit_available(&self) -> bool {
        true
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
        subdevice_id: u32,
    ) -> Result<CounterConfig> {
        let gt = subdevice_id as u64;

        if group.is_single() {
            let class = class_for_group(group).ok_or(TelemetryError::UnsupportedFeature)?;

            return Ok(CounterConfig {
                active_ticks: i915_pmu_engine(class as u64, instance as u64, PRELIM_I915_SAMPLE_BUSY_TICKS),
                total_ticks: Some(i915_pmu_engine(class as u64, instance as u64, PRELIM_I915_SAMPLE_TOTAL_TICKS)),
            });
        }

        // group PMU events are single-fd: the total comes from time_enabled
        // in the same read buffer
        let active_ticks = match group {
            EngineGroup::RenderAll => prelim_render_group_busy(gt),
            EngineGroup::CopyAll => prelim_copy_group_busy(gt),
            EngineGroup::MediaAll => prelim_media_group_busy(gt),
            EngineGroup::All => prelim_any_engine_group_busy(gt),
            // no compute group event in the prelim PMU
            _ => return Err(TelemetryError::UnsupportedFeature),
        };

        Ok(CounterConfig { active_ticks, total_ticks: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_engines_use_tick_sample_pairs() {
        let kmd = I915Prelim::new(17);
        let config = kmd.engine_activity_config(EngineGroup::RenderSingle, 1, 0).unwrap();

        assert_eq!(config.active_ticks, 0x18);
        assert_eq!(config.total_ticks, Some(0x19));
    }

    #[test]
    fn group_events_carry_gt_id_in_top_bits() {
        let kmd = I915Prelim::new(17);

        let gt0 = kmd.engine_activity_config(EngineGroup::RenderAll, 0, 0).unwrap();
        assert_eq!(gt0.active_ticks, 0x10_0007);
        assert_eq!(gt0.total_ticks, None);

        let gt1 = kmd.engine_activity_config(EngineGroup::MediaAll, 0, 1).unwrap();
        assert_eq!(gt1.active_ticks, 0x10_0009 | (1 << 60));
    }

    #[test]
    fn compute_aggregate_has_no_group_event() {
        let kmd = I915Prelim::new(17);

        assert_eq!(
            kmd.engine_activity_config(EngineGroup::ComputeAll, 0, 0),
            Err(TelemetryError::UnsupportedFeature),
        );
    }
}
