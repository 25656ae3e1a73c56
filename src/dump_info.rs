use std::sync::Arc;

use libinteltop::{
    kmd::{convert_unit, KmdInterface, SysfsName, SysfsValueUnit},
    stat::Engine,
    DevicePath,
};

pub fn dump_device_list(list: &[DevicePath]) {
    for device_path in list {
        let instance = device_path.get_instance_number().unwrap_or(0);

        println!(
            "#{instance} [{pci}] ({kmd}, {n} subdevice(s))",
            pci = device_path.pci,
            kmd = device_path.kmd,
            n = device_path.subdevice_count(),
        );
    }
}

pub fn dump(
    device_path: &DevicePath,
    kmd: &Arc<dyn KmdInterface>,
    engines: &[Arc<Engine>],
) {
    println!("--- [{}] ({}) ---", device_path.pci, device_path.kmd);
    println!("KMD backend       : {}", kmd.name());
    println!("perf PMU type     : {}", kmd.pmu_type());
    println!("Subdevices        : {}", device_path.subdevice_count());
    println!();
    println!("Capabilities:");
    println!("    group engine interface : {}", kmd.is_group_engine_interface_available());
    println!("    fdinfo client info     : {}", kmd.is_client_info_available_in_fdinfo());
    println!("    VF engine utilization  : {}", kmd.is_vf_engine_utilization_supported());
    println!("    media frequency factor : {}", kmd.is_media_frequency_factor_available());
    println!("    power limit            : {}", kmd.is_power_limit_available());
    println!();

    dump_frequency(device_path, kmd);
    dump_engine_list(engines);
}

fn dump_frequency(device_path: &DevicePath, kmd: &Arc<dyn KmdInterface>) {
    for subdevice_id in 0..device_path.subdevice_count() {
        let [min, max, cur] = [
            SysfsName::MinFrequency,
            SysfsName::MaxFrequency,
            SysfsName::CurrentFrequency,
        ].map(|name| read_sysfs_value(device_path, kmd, name, subdevice_id));

        let [Some(min), Some(max), Some(cur)] = [min, max, cur] else { continue };

        println!("GT{subdevice_id} Frequency     : {cur:4} MHz (min {min} MHz, max {max} MHz)");
    }
    println!();
}

/// Value rescaled to the base unit of its quantity.
fn read_sysfs_value(
    device_path: &DevicePath,
    kmd: &Arc<dyn KmdInterface>,
    name: SysfsName,
    subdevice_id: u32,
) -> Option<u64> {
    let card = device_path.card_sysfs();
    let base_dir_exists = card.join(kmd.sysfs_base_path(subdevice_id)).exists();
    let path = card.join(kmd.sysfs_file_path(name, subdevice_id, base_dir_exists));
    let raw: u64 = std::fs::read_to_string(path).ok()?.trim_end().parse().ok()?;

    Some(convert_unit(raw, kmd.native_unit(name), SysfsValueUnit::Base))
}

fn dump_engine_list(engines: &[Arc<Engine>]) {
    println!("Engines ({}):", engines.len());

    for engine in engines {
        let prop = engine.properties();
        let config = engine.counter_config();
        let sub = if prop.on_subdevice {
            format!(", GT{}", prop.subdevice_id)
        } else {
            String::new()
        };
        let total = match config.total_ticks {
            Some(total) => format!("{total:#x}"),
            None => "grouped".to_string(),
        };

        println!(
            "    {:14} instance {}{sub} (active {:#x}, total {total})",
            prop.group.to_string(),
            engine.key().instance,
            config.active_ticks,
        );
    }
}
