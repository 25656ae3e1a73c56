use anyhow::{anyhow, Context};
use std::fs;
use std::fmt;
use std::path::PathBuf;

const DRM_CLASS_PATH: &str = "/sys/class/drm";
const EVENT_SOURCE_PATH: &str = "/sys/bus/event_source/devices";
const INTEL_VENDOR_ID: u32 = 0x8086;
const DRM_RENDER: u32 = 128;

/// Kernel-mode driver generation bound to a device.
/// Selected once at device-discovery time, never re-probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmdKind {
    I915Upstream,
    I915Prelim,
    Xe,
}

impl fmt::Display for KmdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I915Upstream => write!(f, "i915"),
            Self::I915Prelim => write!(f, "i915 (prelim)"),
            Self::Xe => write!(f, "xe"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DevicePath {
    pub render: PathBuf,
    pub card: PathBuf,
    /// Canonical `/sys/class/drm/card<N>/device`.
    pub sysfs_path: PathBuf,
    /// PCI address, e.g. `0000:00:02.0`.
    pub pci: String,
    /// Matching perf PMU directory under `/sys/bus/event_source/devices`.
    pub pmu_path: Option<PathBuf>,
    pub kmd: KmdKind,
}

impl DevicePath {
    fn from_card_instance(instance: u32) -> anyhow::Result<Self> {
        let card = PathBuf::from(format!("{DRM_CLASS_PATH}/card{instance}"));
        let device_link = card.join("device");
        let sysfs_path = fs::canonicalize(&device_link)
            .with_context(|| format!("no device node for card{instance}"))?;

        let vendor = fs::read_to_string(sysfs_path.join("vendor"))?;
        let vendor = u32::from_str_radix(vendor.trim_end().trim_start_matches("0x"), 16)?;
        if vendor != INTEL_VENDOR_ID {
            return Err(anyhow!("card{instance} is not an Intel GPU (vendor {vendor:#06x})"));
        }

        let pci = sysfs_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .ok_or_else(|| anyhow!("pci: {sysfs_path:?}"))?;

        let driver = fs::read_link(sysfs_path.join("driver"))
            .ok()
            .and_then(|link| Some(link.file_name()?.to_str()?.to_string()))
            .unwrap_or_default();
        let pmu_path = find_pmu_dir(&pci, &driver);
        let kmd = match driver.as_str() {
            "i915" => {
                if pmu_has_prelim_events(pmu_path.as_deref()) {
                    KmdKind::I915Prelim
                } else {
                    KmdKind::I915Upstream
                }
            },
            "xe" => KmdKind::Xe,
            _ => return Err(anyhow!("card{instance}: unknown driver {driver:?}")),
        };

        Ok(Self {
            render: PathBuf::from(format!("/dev/dri/renderD{}", DRM_RENDER + instance)),
            card: PathBuf::from(format!("/dev/dri/card{instance}")),
            sysfs_path,
            pci,
            pmu_path,
            kmd,
        })
    }

    pub fn get_instance_number(&self) -> Option<u32> {
        self.card
            .to_str()?
            .trim_start_matches("/dev/dri/card")
            .parse::<u32>().ok()
    }

    pub fn get_device_path_list() -> Vec<Self> {
        let Ok(drm_class) = fs::read_dir(DRM_CLASS_PATH) else {
            eprintln!("No DRM class in sysfs.");
            return Vec::new();
        };

        drm_class.flat_map(|entry| {
            let name = entry.ok()?.file_name().into_string().ok()?;
            // `card0`, not `card0-DP-1` connector entries
            if name.contains('-') { return None }
            let instance = name.strip_prefix("card")?.parse::<u32>().ok()?;

            Self::from_card_instance(instance).ok()
        }).collect()
    }

    /// Number of tiles (xe) or GT directories (i915) this device exposes.
    /// A device always has at least one subdevice.
    pub fn subdevice_count(&self) -> u32 {
        let prefix = match self.kmd {
            KmdKind::Xe => "device/tile",
            KmdKind::I915Upstream |
            KmdKind::I915Prelim => "gt/gt",
        };
        let mut count = 0u32;

        while self.card_sysfs().join(format!("{prefix}{count}")).exists() {
            count += 1;
        }

        count.max(1)
    }

    /// `/sys/class/drm/card<N>` — the root the KMD path grammar appends to.
    pub fn card_sysfs(&self) -> PathBuf {
        PathBuf::from(format!(
            "{DRM_CLASS_PATH}/card{}",
            self.get_instance_number().unwrap_or(0),
        ))
    }
}

/// i915 exposes one PMU named `i915` (or `i915-<pci>` on multi-GPU systems),
/// xe one per device named `xe_<pci>` with underscores in the address.
fn find_pmu_dir(pci: &str, driver: &str) -> Option<PathBuf> {
    let candidates = match driver {
        "i915" => vec![
            format!("i915-{pci}"),
            "i915".to_string(),
        ],
        "xe" => vec![format!("xe_{}", pci.replacen(':', "_", 2))],
        _ => return None,
    };

    candidates.into_iter().map(|name| {
        PathBuf::from(EVENT_SOURCE_PATH).join(name)
    }).find(|path| path.join("type").exists())
}

/// The prelim i915 KMD exports its group-busy events by name; upstream does
/// not have them at all.
fn pmu_has_prelim_events(pmu_path: Option<&std::path::Path>) -> bool {
    pmu_path
        .map(|path| path.join("events/render-group-busy").exists())
        .unwrap_or(false)
}
