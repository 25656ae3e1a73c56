use std::sync::Arc;
use std::time::Duration;

use libinteltop::{
    kmd::{self, KmdInterface},
    stat::{Engine, EngineRegistry, SysfsEngineScan},
    BusynessSample, DeviceFd, DevicePath,
};

mod args;
use args::{DumpMode, MainOpt};

mod dump_info;
mod json_output;

/// Busyness over one sample window, as two snapshot deltas.
pub struct EngineUsage {
    pub engine: Arc<Engine>,
    pub delta_active_us: u64,
    pub delta_total_us: u64,
}

impl EngineUsage {
    fn new(engine: Arc<Engine>, first: BusynessSample, second: BusynessSample) -> Self {
        Self {
            engine,
            delta_active_us: second.active_time_us.saturating_sub(first.active_time_us),
            delta_total_us: second.timestamp_us.saturating_sub(first.timestamp_us),
        }
    }

    pub fn percent(&self) -> u64 {
        if self.delta_total_us == 0 { return 0 }

        (self.delta_active_us.saturating_mul(100) / self.delta_total_us).min(100)
    }

    pub fn label(&self) -> String {
        let prop = self.engine.properties();

        if prop.on_subdevice {
            format!("{}/{} (GT{})", prop.group, self.engine.key().instance, prop.subdevice_id)
        } else {
            format!("{}/{}", prop.group, self.engine.key().instance)
        }
    }
}

fn main() {
    let main_opt = MainOpt::parse();
    let list = DevicePath::get_device_path_list();

    if list.is_empty() {
        eprintln!("No Intel GPU found.");
        std::process::exit(1);
    }

    if main_opt.dump_mode == DumpMode::List {
        dump_info::dump_device_list(&list);
        return;
    }

    let device_path = match main_opt.instance {
        Some(i) => list
            .iter()
            .find(|device_path| device_path.get_instance_number() == Some(i as u32))
            .cloned()
            .unwrap_or_else(|| {
                eprintln!("No Intel GPU for instance {i}.");
                std::process::exit(1);
            }),
        None => list[0].clone(),
    };

    let kmd = kmd::select_backend(&device_path).unwrap_or_else(|err| {
        eprintln!("[{}]: no usable perf PMU ({err})", device_path.pci);
        std::process::exit(1);
    });

    let subdevice_count = device_path.subdevice_count();
    let device_fd = DeviceFd::from_device_path(&device_path);
    let registry = EngineRegistry::new(kmd.clone(), device_fd, subdevice_count);
    let source = SysfsEngineScan::new(device_path.card_sysfs(), kmd.clone(), subdevice_count);

    if let Err(err) = registry.init(&source) {
        eprintln!("[{}]: engine discovery failed ({err})", device_path.pci);
    }

    let engines = registry.enumerate(0).unwrap_or_else(|err| {
        eprintln!("[{}]: {err}", device_path.pci);
        std::process::exit(1);
    });

    if main_opt.dump_mode == DumpMode::Info {
        dump_info::dump(&device_path, &kmd, &engines);
        return;
    }

    let rows = sample_usage(&engines, main_opt.refresh_period);

    if main_opt.json {
        let value = json_output::snapshot_json(
            &device_path,
            &kmd,
            &rows,
            main_opt.refresh_period,
        );
        println!("{value}");
    } else {
        print_usage_table(&device_path, &kmd, &rows);
    }
}

/// Two snapshots across one sleep; engines whose counters fail to read mid-
/// window are dropped from the output rather than reported as zero.
fn sample_usage(engines: &[Arc<Engine>], period_ms: u64) -> Vec<EngineUsage> {
    let first: Vec<_> = engines
        .iter()
        .map(|engine| engine.activity().ok())
        .collect();

    std::thread::sleep(Duration::from_millis(period_ms));

    engines
        .iter()
        .zip(first)
        .filter_map(|(engine, first)| {
            let first = first?;
            let second = engine.activity().ok()?;

            Some(EngineUsage::new(engine.clone(), first, second))
        })
        .collect()
}

fn print_usage_table(
    device_path: &DevicePath,
    kmd: &Arc<dyn KmdInterface>,
    rows: &[EngineUsage],
) {
    println!("[{}] ({})", device_path.pci, kmd.name());

    if rows.is_empty() {
        println!("    no engines");
        return;
    }

    for row in rows {
        println!("    {:24} {:3}%", row.label(), row.percent());
    }
}
