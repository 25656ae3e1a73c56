use std::sync::{Arc, Mutex};

use crate::device_fd::DeviceFd;
use crate::error::{Result, TelemetryError};
use crate::kmd::KmdInterface;
use super::topology::{resolve, TopologySource};
use super::Engine;

enum RegistryState {
    Uninitialized,
    /// Zero engines is the degraded-but-valid form of `Ready`.
    Ready(Vec<Arc<Engine>>),
    DependencyUnavailable,
}

/// Owns discovery and the lifetime of every engine object for one device.
///
/// Discovery runs once: the state mutex serializes concurrent first callers
/// and later callers observe the stored outcome. `enumerate` never
/// re-triggers discovery.
pub struct EngineRegistry {
    kmd: Arc<dyn KmdInterface>,
    device: Arc<DeviceFd>,
    subdevice_count: u32,
    state: Mutex<RegistryState>,
}

impl EngineRegistry {
    pub fn new(kmd: Arc<dyn KmdInterface>, device: Arc<DeviceFd>, subdevice_count: u32) -> Self {
        Self {
            kmd,
            device,
            subdevice_count,
            state: Mutex::new(RegistryState::Uninitialized),
        }
    }

    pub fn kmd(&self) -> &Arc<dyn KmdInterface> {
        &self.kmd
    }

    /// One-shot discovery. A failed topology query leaves a valid empty
    /// registry (reported once as `UnsupportedFeature`); only an
    /// unavailable device handle poisons the registry as a whole. Engines
    /// whose counters fail to open are omitted, not errors.
    pub fn init(&self, source: &dyn TopologySource) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        match &*state {
            RegistryState::Ready(_) => return Ok(()),
            RegistryState::DependencyUnavailable => return Err(TelemetryError::DependencyUnavailable),
            RegistryState::Uninitialized => {},
        }

        let keys = match resolve(source, &*self.kmd, &self.device) {
            Ok(keys) => keys,
            Err(TelemetryError::DependencyUnavailable) => {
                *state = RegistryState::DependencyUnavailable;
                return Err(TelemetryError::DependencyUnavailable);
            },
            Err(err) => {
                *state = RegistryState::Ready(Vec::new());
                return Err(err);
            },
        };

        let on_subdevice = self.subdevice_count > 1;
        let mut engines = Vec::with_capacity(keys.len());

        // per-instance engines first; the group handles of a real group PMU
        // are only opened once the full per-engine set exists
        for key in keys.iter().filter(|key| key.group.is_single()) {
            if let Ok(engine) = Engine::new(&*self.kmd, *key, on_subdevice) {
                engines.push(Arc::new(engine));
            }
        }
        for key in keys.iter().filter(|key| !key.group.is_single()) {
            if let Ok(engine) = Engine::new(&*self.kmd, *key, on_subdevice) {
                engines.push(Arc::new(engine));
            }
        }

        engines.sort_by_key(|engine| engine.key());
        *state = RegistryState::Ready(engines);

        Ok(())
    }

    /// `max_count` of zero means "everything"; a `max_count` past the end
    /// saturates. Before `init` the registry is empty.
    pub fn enumerate(&self, max_count: usize) -> Result<Vec<Arc<Engine>>> {
        let state = self.state.lock().unwrap();

        let engines = match &*state {
            RegistryState::DependencyUnavailable => return Err(TelemetryError::DependencyUnavailable),
            RegistryState::Uninitialized => return Ok(Vec::new()),
            RegistryState::Ready(engines) => engines,
        };

        let count = if max_count == 0 {
            engines.len()
        } else {
            max_count.min(engines.len())
        };

        Ok(engines[..count].to_vec())
    }

    pub fn engine_count(&self) -> Result<usize> {
        match &*self.state.lock().unwrap() {
            RegistryState::DependencyUnavailable => Err(TelemetryError::DependencyUnavailable),
            RegistryState::Uninitialized => Ok(0),
            RegistryState::Ready(engines) => Ok(engines.len()),
        }
    }

    /// Drops every engine, closing each counter descriptor exactly once,
    /// and allows a later re-init. Idempotent.
    pub fn release(&self) {
        *self.state.lock().unwrap() = RegistryState::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::path::PathBuf;

    use crate::kmd::{I915Prelim, SysfsName, SysfsValueUnit};
    use crate::perf::{CounterConfig, CounterHandle};
    use crate::stat::engine_class;
    use crate::stat::topology::RawEngineDescriptor;
    use crate::stat::EngineGroup;

    struct FakeTopology(Vec<RawEngineDescriptor>);

    impl TopologySource for FakeTopology {
        fn engine_descriptors(&self) -> Result<Vec<RawEngineDescriptor>> {
            Ok(self.0.clone())
        }
    }

    struct FailingTopology;

    impl TopologySource for FailingTopology {
        fn engine_descriptors(&self) -> Result<Vec<RawEngineDescriptor>> {
            Err(TelemetryError::UnsupportedFeature)
        }
    }

    // A PMU type id no kernel will have registered: every counter open
    // fails, which is exactly the all-opens-fail scenario.
    fn registry_without_pmu(device: Arc<DeviceFd>) -> EngineRegistry {
        EngineRegistry::new(Arc::new(I915Prelim::new(u32::MAX - 1)), device, 1)
    }

    fn some_topology() -> FakeTopology {
        FakeTopology(vec![
            RawEngineDescriptor { engine_class: engine_class::RENDER, engine_instance: 0, gt_id: 0 },
            RawEngineDescriptor { engine_class: engine_class::VIDEO, engine_instance: 0, gt_id: 0 },
        ])
    }

    #[test]
    fn all_counter_opens_failing_is_not_a_registry_error() {
        let registry = registry_without_pmu(DeviceFd::new("/dev/null", "/dev/null"));

        registry.init(&some_topology()).unwrap();
        assert_eq!(registry.engine_count(), Ok(0));
        assert!(registry.enumerate(0).unwrap().is_empty());
    }

    #[test]
    fn unavailable_device_poisons_the_registry() {
        let device = DeviceFd::new("/dev/dri/renderD999", "/dev/dri/card999");
        let registry = registry_without_pmu(device);

        assert_eq!(registry.init(&some_topology()), Err(TelemetryError::DependencyUnavailable));
        assert!(matches!(registry.enumerate(0), Err(TelemetryError::DependencyUnavailable)));
        assert_eq!(registry.engine_count(), Err(TelemetryError::DependencyUnavailable));
    }

    #[test]
    fn failed_topology_query_degrades_to_empty() {
        let registry = registry_without_pmu(DeviceFd::new("/dev/null", "/dev/null"));

        assert_eq!(registry.init(&FailingTopology), Err(TelemetryError::UnsupportedFeature));
        // degraded, not poisoned
        assert_eq!(registry.engine_count(), Ok(0));
        assert!(registry.enumerate(0).unwrap().is_empty());
    }

    #[test]
    fn init_runs_once_until_release() {
        let registry = registry_without_pmu(DeviceFd::new("/dev/null", "/dev/null"));

        registry.init(&some_topology()).unwrap();
        // second init must not re-discover: a now-failing source is ignored
        registry.init(&FailingTopology).unwrap();

        registry.release();
        assert_eq!(registry.engine_count(), Ok(0));

        // re-init after release with an unchanged topology is deterministic
        registry.init(&some_topology()).unwrap();
        assert_eq!(registry.engine_count(), Ok(0));

        registry.release();
        registry.release();
    }

    #[test]
    fn concurrent_first_callers_serialize() {
        let registry = registry_without_pmu(DeviceFd::new("/dev/null", "/dev/null"));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| registry.init(&some_topology()).unwrap());
            }
        });

        assert_eq!(registry.engine_count(), Ok(0));
    }

    #[test]
    fn enumerate_before_init_is_empty_and_saturating() {
        let registry = registry_without_pmu(DeviceFd::new("/dev/null", "/dev/null"));

        assert!(registry.enumerate(0).unwrap().is_empty());
        assert!(registry.enumerate(128).unwrap().is_empty());
    }

    /// Prelim configs and capability flags, but every counter open is
    /// backed by a pipe so engines actually populate the registry.
    struct PipeBackedKmd(I915Prelim);

    impl KmdInterface for PipeBackedKmd {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        fn pmu_type(&self) -> u32 {
            self.0.pmu_type()
        }

        fn is_group_engine_interface_available(&self) -> bool {
            self.0.is_group_engine_interface_available()
        }

        fn is_client_info_available_in_fdinfo(&self) -> bool {
            self.0.is_client_info_available_in_fdinfo()
        }

        fn is_vf_engine_utilization_supported(&self) -> bool {
            self.0.is_vf_engine_utilization_supported()
        }

        fn is_media_frequency_factor_available(&self) -> bool {
            self.0.is_media_frequency_factor_available()
        }

        fn is_power_limit_available(&self) -> bool {
            self.0.is_power_limit_available()
        }

        fn sysfs_base_path(&self, subdevice_id: u32) -> PathBuf {
            self.0.sysfs_base_path(subdevice_id)
        }

        fn sysfs_file_path(&self, name: SysfsName, subdevice_id: u32, base_dir_exists: bool) -> PathBuf {
            self.0.sysfs_file_path(name, subdevice_id, base_dir_exists)
        }

        fn engine_base_path(&self, subdevice_id: u32) -> PathBuf {
            self.0.engine_base_path(subdevice_id)
        }

        fn native_unit(&self, name: SysfsName) -> SysfsValueUnit {
            self.0.native_unit(name)
        }

        fn engine_activity_config(
            &self,
            group: EngineGroup,
            instance: u32,
            subdevice_id: u32,
        ) -> Result<CounterConfig> {
            self.0.engine_activity_config(group, instance, subdevice_id)
        }

        fn open_counter_handle(&self, config: &CounterConfig) -> Result<CounterHandle> {
            let active = OwnedFd::from(std::io::pipe().unwrap().0);
            let total = config
                .total_ticks
                .map(|_| OwnedFd::from(std::io::pipe().unwrap().0));

            Ok(CounterHandle::from_owned_fds(active, total))
        }
    }

    /// The documented prelim scenario: six valid descriptors plus one
    /// invalid class, yielding 8 single keys and 4 aggregates.
    fn prelim_scenario() -> FakeTopology {
        FakeTopology(vec![
            RawEngineDescriptor { engine_class: engine_class::RENDER, engine_instance: 0, gt_id: 0 },
            RawEngineDescriptor { engine_class: engine_class::RENDER, engine_instance: 1, gt_id: 0 },
            RawEngineDescriptor { engine_class: engine_class::VIDEO, engine_instance: 0, gt_id: 0 },
            RawEngineDescriptor { engine_class: engine_class::VIDEO, engine_instance: 1, gt_id: 0 },
            RawEngineDescriptor { engine_class: engine_class::COPY, engine_instance: 0, gt_id: 0 },
            RawEngineDescriptor { engine_class: engine_class::VIDEO_ENHANCE, engine_instance: 0, gt_id: 0 },
            RawEngineDescriptor { engine_class: 99, engine_instance: 0, gt_id: 0 },
        ])
    }

    #[test]
    fn populated_enumeration_saturates_and_reinit_is_deterministic() {
        let registry = EngineRegistry::new(
            Arc::new(PipeBackedKmd(I915Prelim::new(0))),
            DeviceFd::new("/dev/null", "/dev/null"),
            1,
        );
        let source = prelim_scenario();

        registry.init(&source).unwrap();
        assert_eq!(registry.engine_count(), Ok(12));

        assert_eq!(registry.enumerate(3).unwrap().len(), 3);
        assert_eq!(registry.enumerate(500).unwrap().len(), 12);
        assert_eq!(registry.enumerate(0).unwrap().len(), 12);

        // enumeration comes back sorted by key
        let groups: Vec<EngineGroup> = registry
            .enumerate(0)
            .unwrap()
            .iter()
            .map(|engine| engine.group())
            .collect();
        let mut sorted = groups.clone();
        sorted.sort();
        assert_eq!(groups, sorted);
        assert_eq!(groups[0], EngineGroup::All);

        // release and re-init against the unchanged topology: same count,
        // same group sequence
        registry.release();
        registry.init(&source).unwrap();

        let again: Vec<EngineGroup> = registry
            .enumerate(0)
            .unwrap()
            .iter()
            .map(|engine| engine.group())
            .collect();
        assert_eq!(groups, again);
    }
}
