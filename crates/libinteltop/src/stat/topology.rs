use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::device_fd::DeviceFd;
use crate::error::{Result, TelemetryError};
use crate::kmd::KmdInterface;
use super::{engine_class, groups_for_class, EngineGroup, EngineKey};

/// Raw engine tuple as the kernel reports it. Transient; consumed during one
/// resolution pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEngineDescriptor {
    pub engine_class: u16,
    pub engine_instance: u16,
    pub gt_id: u32,
}

/// Where raw engine descriptors come from. The production source walks
/// sysfs; tests substitute fixed descriptor lists.
pub trait TopologySource {
    /// `UnsupportedFeature` when the query itself is not supported by the
    /// running kernel.
    fn engine_descriptors(&self) -> Result<Vec<RawEngineDescriptor>>;
}

/// Scans the engine directories the KMD exports under the card's sysfs
/// node: `engine/rcs0`, `engine/vcs1`, ... for i915,
/// `device/tile<N>/gt<N>/engines/...` per tile for xe.
pub struct SysfsEngineScan {
    card_sysfs: PathBuf,
    kmd: Arc<dyn KmdInterface>,
    subdevice_count: u32,
}

impl SysfsEngineScan {
    pub fn new(card_sysfs: PathBuf, kmd: Arc<dyn KmdInterface>, subdevice_count: u32) -> Self {
        Self { card_sysfs, kmd, subdevice_count }
    }
}

impl TopologySource for SysfsEngineScan {
    fn engine_descriptors(&self) -> Result<Vec<RawEngineDescriptor>> {
        let mut descriptors = Vec::new();
        let mut any_dir = false;

        for subdevice in 0..self.subdevice_count {
            let base = self.card_sysfs.join(self.kmd.engine_base_path(subdevice));
            let Ok(entries) = fs::read_dir(&base) else { continue };
            any_dir = true;

            for entry in entries.flatten() {
                let Ok(name) = entry.file_name().into_string() else { continue };

                // i915 engine dirs carry explicit class/instance files,
                // engine names cover the rest
                let class: Option<u16> = crate::parse_sysfs(entry.path().join("class"));
                let instance: Option<u16> = crate::parse_sysfs(entry.path().join("instance"));

                let (engine_class, engine_instance) = match (class, instance) {
                    (Some(class), Some(instance)) => (class, instance),
                    _ => match parse_engine_name(&name) {
                        Some(pair) => pair,
                        None => continue,
                    },
                };

                descriptors.push(RawEngineDescriptor {
                    engine_class,
                    engine_instance,
                    gt_id: subdevice,
                });
            }
        }

        if !any_dir {
            return Err(TelemetryError::UnsupportedFeature);
        }

        Ok(descriptors)
    }
}

/// `rcs0`, `bcs1`, `vcs0`, `vecs0`, `ccs2` -> (class, instance).
fn parse_engine_name(name: &str) -> Option<(u16, u16)> {
    let (prefix, class) = [
        ("vecs", engine_class::VIDEO_ENHANCE),
        ("rcs", engine_class::RENDER),
        ("bcs", engine_class::COPY),
        ("vcs", engine_class::VIDEO),
        ("ccs", engine_class::COMPUTE),
    ].into_iter().find(|(prefix, _)| name.starts_with(prefix))?;

    let instance = name.strip_prefix(prefix)?.parse::<u16>().ok()?;

    Some((class, instance))
}

/// Expand every raw descriptor into its engine keys and deduplicate.
///
/// Requires a live device handle before any query is attempted. When the
/// backend has the group-engine interface, each matched single group also
/// contributes its "-all" key and the global `All` key on the same tile,
/// instance forced to 0.
pub fn resolve(
    source: &dyn TopologySource,
    kmd: &dyn KmdInterface,
    device: &Arc<DeviceFd>,
) -> Result<BTreeSet<EngineKey>> {
    let _guard = device.acquire()?;
    let descriptors = source.engine_descriptors()?;

    let mut keys = BTreeSet::new();

    for desc in &descriptors {
        for group in groups_for_class(desc.engine_class) {
            keys.insert(EngineKey {
                group: *group,
                instance: desc.engine_instance as u32,
                subdevice: desc.gt_id,
            });

            if !kmd.is_group_engine_interface_available() {
                continue;
            }

            if let Some(aggregate) = group.aggregate() {
                keys.insert(EngineKey { group: aggregate, instance: 0, subdevice: desc.gt_id });
            }
            keys.insert(EngineKey { group: EngineGroup::All, instance: 0, subdevice: desc.gt_id });
        }
    }

    Ok(keys)
}
