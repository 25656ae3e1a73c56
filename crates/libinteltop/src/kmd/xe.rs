use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TelemetryError};
use crate::perf::CounterConfig;
use crate::stat::{class_for_group, EngineGroup};
use super::{KmdInterface, SysfsName, SysfsValueUnit};

/// One `format/<field>` entry: the low bit of the `config:M-N` range the
/// field occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BitField {
    shift: u32,
}

impl BitField {
    const fn place(&self, value: u64) -> u64 {
        value << self.shift
    }
}

/// Xe KMD: no static counter formulas. Base event configs come from the PMU
/// `events/` directory and the engine-class/instance/gt bit-field layout
/// from `format/`, discovered once per device.
pub struct Xe {
    pmu_type: u32,
    active_base: u64,
    total_base: u64,
    class_field: BitField,
    instance_field: BitField,
    gt_field: BitField,
    /// Present when the KMD exports per-function (SR-IOV VF) scoping.
    function_field: Option<BitField>,
}

impl Xe {
    pub fn new(pmu_type: u32, pmu_path: &Path) -> Result<Self> {
        let read_event = |name: &str| -> Result<u64> {
            let s = fs::read_to_string(pmu_path.join("events").join(name))
                .map_err(|_| TelemetryError::UnsupportedFeature)?;

            parse_event_config(&s).ok_or(TelemetryError::UnsupportedFeature)
        };
        let read_format = |name: &str| -> Result<BitField> {
            let s = fs::read_to_string(pmu_path.join("format").join(name))
                .map_err(|_| TelemetryError::UnsupportedFeature)?;

            parse_format_field(&s).ok_or(TelemetryError::UnsupportedFeature)
        };

        Ok(Self {
            pmu_type,
            active_base: read_event("engine-active-ticks")?,
            total_base: read_event("engine-total-ticks")?,
            class_field: read_format("engine_class")?,
            instance_field: read_format("engine_instance")?,
            gt_field: read_format("gt")?,
            function_field: read_format("function").ok(),
        })
    }

    fn compose(&self, base: u64, class: u16, instance: u32, gt: u32) -> u64 {
        base
            | self.class_field.place(class as u64)
            | self.instance_field.place(instance as u64)
            | self.gt_field.place(gt as u64)
    }

    /// Client-scoped (virtual function) variant of the engine config, for
    /// per-VF busyness on SR-IOV devices.
    pub fn engine_activity_config_for_function(
        &self,
        group: EngineGroup,
        instance: u32,
        subdevice_id: u32,
        function_id: u32,
    ) -> Result<CounterConfig> {
        let function = self.function_field.ok_or(TelemetryError::UnsupportedFeature)?;
        let config = self.engine_activity_config(group, instance, subdevice_id)?;

        Ok(CounterConfig {
            active_ticks: config.active_ticks | function.place(function_id as u64),
            total_ticks: config.total_ticks.map(|t| t | function.place(function_id as u64)),
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(function: bool) -> Self {
        Self {
            pmu_type: 33,
            active_base: 0x02,
            total_base: 0x03,
            class_field: BitField { shift: 20 },
            instance_field: BitField { shift: 12 },
            gt_field: BitField { shift: 60 },
            function_field: function.then_some(BitField { shift: 44 }),
        }
    }
}

impl KmdInterface for Xe {
    fn name(&self) -> &'static str {
        "xe"
    }

    fn pmu_type(&self) -> u32 {
        self.pmu_type
    }

    fn is_group_engine_interface_available(&self) -> bool {
        false
    }

    fn is_client_info_available_in_fdinfo(&self) -> bool {
        true
    }

    fn is_vf_engine_utilization_supported(&self) -> bool {
        self.function_field.is_some()
    }

    fn is_media_frequency_factor_available(&self) -> bool {
        false
    }

    fn is_power_limit_available(&self) -> bool {
        true
    }

    fn sysfs_base_path(&self, subdevice_id: u32) -> PathBuf {
        PathBuf::from(format!("device/tile{subdevice_id}/gt{subdevice_id}"))
    }

    fn sysfs_file_path(&self, name: SysfsName, subdevice_id: u32, _base_dir_exists: bool) -> PathBuf {
        // physical memory size sits at the tile, not under the gt
        if name == SysfsName::PhysicalMemorySize {
            return PathBuf::from(format!("device/tile{subdevice_id}/physical_vram_size_bytes"));
        }

        let field = match name {
            SysfsName::MinFrequency => "freq0/min_freq",
            SysfsName::MaxFrequency => "freq0/max_freq",
            SysfsName::CurrentFrequency => "freq0/cur_freq",
            SysfsName::MinDefaultFrequency => "freq0/rpn_freq",
            SysfsName::MaxDefaultFrequency => "freq0/rp0_freq",
            SysfsName::MediaFrequencyFactor => "freq0/media_freq_factor",
            SysfsName::SustainedPowerLimit => "power1_max",
            SysfsName::SustainedPowerLimitInterval => "power1_max_interval",
            SysfsName::PhysicalMemorySize => unreachable!(),
        };

        self.sysfs_base_path(subdevice_id).join(field)
    }

    fn engine_base_path(&self, subdevice_id: u32) -> PathBuf {
        self.sysfs_base_path(subdevice_id).join("engines")
    }

    fn native_unit(&self, name: SysfsName) -> SysfsValueUnit {
        match name {
            SysfsName::SustainedPowerLimit => SysfsValueUnit::Micro,
            SysfsName::SustainedPowerLimitInterval => SysfsValueUnit::Milli,
            _ => SysfsValueUnit::Base,
        }
    }

    fn engine_activity_config(
        &self,
        group: EngineGroup,
        instance: u32,
        subdevice_id: u32,
    ) -> Result<CounterConfig> {
        // no aggregate engines on xe
        let class = class_for_group(group).ok_or(TelemetryError::UnsupportedFeature)?;

        Ok(CounterConfig {
            active_ticks: self.compose(self.active_base, class, instance, subdevice_id),
            total_ticks: Some(self.compose(self.total_base, class, instance, subdevice_id)),
        })
    }
}

/// `events/<name>` files look like `event=0x02` (sometimes a bare number).
pub(crate) fn parse_event_config(s: &str) -> Option<u64> {
    let s = s.trim();

    for part in s.split(',') {
        if let Some(value) = part.trim().strip_prefix("event=") {
            return parse_hex_or_dec(value);
        }
    }

    parse_hex_or_dec(s)
}

/// `format/<field>` files look like `config:20-27` (or `config:60` for a
/// single bit).
pub(crate) fn parse_format_field(s: &str) -> Option<BitField> {
    let range = s.trim().strip_prefix("config:")?;
    let low = range.split('-').next()?;

    Some(BitField { shift: low.parse().ok()? })
}

fn parse_hex_or_dec(s: &str) -> Option<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_and_format_parsing() {
        assert_eq!(parse_event_config("event=0x02\n"), Some(2));
        assert_eq!(parse_event_config("event=3"), Some(3));
        assert_eq!(parse_event_config("0x10"), Some(16));
        assert_eq!(parse_event_config("garbage"), None);

        assert_eq!(parse_format_field("config:20-27\n"), Some(BitField { shift: 20 }));
        assert_eq!(parse_format_field("config:60"), Some(BitField { shift: 60 }));
        assert_eq!(parse_format_field("config1:0-7"), None);
    }

    #[test]
    fn config_composes_class_instance_and_gt() {
        let kmd = Xe::for_tests(false);
        let config = kmd.engine_activity_config(EngineGroup::MediaDecodeSingle, 1, 1).unwrap();

        // video class 2 at bit 20, instance 1 at bit 12, gt 1 at bit 60
        assert_eq!(config.active_ticks, 0x02 | (2 << 20) | (1 << 12) | (1 << 60));
        assert_eq!(config.total_ticks, Some(0x03 | (2 << 20) | (1 << 12) | (1 << 60)));
    }

    #[test]
    fn aggregates_are_rejected() {
        let kmd = Xe::for_tests(false);

        assert_eq!(
            kmd.engine_activity_config(EngineGroup::MediaAll, 0, 0),
            Err(TelemetryError::UnsupportedFeature),
        );
    }

    #[test]
    fn function_scoped_config_needs_the_format_field() {
        let without = Xe::for_tests(false);
        assert!(!without.is_vf_engine_utilization_supported());
        assert_eq!(
            without.engine_activity_config_for_function(EngineGroup::RenderSingle, 0, 0, 1),
            Err(TelemetryError::UnsupportedFeature),
        );

        let with = Xe::for_tests(true);
        assert!(with.is_vf_engine_utilization_supported());

        let config = with
            .engine_activity_config_for_function(EngineGroup::RenderSingle, 0, 0, 2)
            .unwrap();
        assert_eq!(config.active_ticks & (0xffff << 44), 2 << 44);
    }
}
