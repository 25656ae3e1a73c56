use serde_json::{json, Map, Value};
use std::sync::Arc;

use libinteltop::{kmd::KmdInterface, DevicePath};

use crate::EngineUsage;

pub trait OutputJson {
    fn json(&self) -> Value;
}

impl OutputJson for DevicePath {
    fn json(&self) -> Value {
        json!({
            "Instance": self.get_instance_number(),
            "PCI": self.pci,
            "KMD": self.kmd.to_string(),
            "Subdevices": self.subdevice_count(),
        })
    }
}

impl OutputJson for EngineUsage {
    fn json(&self) -> Value {
        json!({
            "usage": {
                "value": self.percent(),
                "unit": "%",
            },
            "active": {
                "value": self.delta_active_us,
                "unit": "us",
            },
            "total": {
                "value": self.delta_total_us,
                "unit": "us",
            },
        })
    }
}

pub fn snapshot_json(
    device_path: &DevicePath,
    kmd: &Arc<dyn KmdInterface>,
    rows: &[EngineUsage],
    period_ms: u64,
) -> Value {
    let engines: Map<String, Value> = rows
        .iter()
        .map(|row| (row.label(), row.json()))
        .collect();

    json!({
        "app": version_json(),
        "Device": device_path.json(),
        "Backend": kmd.name(),
        "period": {
            "duration": period_ms,
            "unit": "ms",
        },
        "Engines": engines,
    })
}

pub fn version_json() -> Value {
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    })
}
