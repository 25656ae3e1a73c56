use crate::error::Result;
use crate::kmd::KmdInterface;
use crate::perf::{BusynessSample, CounterConfig, CounterHandle};
use super::{EngineGroup, EngineKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineProperties {
    pub group: EngineGroup,
    pub subdevice_id: u32,
    pub on_subdevice: bool,
}

/// One resolved engine entity. Immutable after construction; only built when
/// its counter handle opened successfully, so a registry never exposes an
/// engine with a broken handle.
#[derive(Debug)]
pub struct Engine {
    key: EngineKey,
    config: CounterConfig,
    handle: CounterHandle,
    on_subdevice: bool,
}

impl Engine {
    pub(crate) fn new(kmd: &dyn KmdInterface, key: EngineKey, on_subdevice: bool) -> Result<Self> {
        let config = kmd.engine_activity_config(key.group, key.instance, key.subdevice)?;
        let handle = kmd.open_counter_handle(&config)?;

        Ok(Self { key, config, handle, on_subdevice })
    }

    pub fn key(&self) -> EngineKey {
        self.key
    }

    pub fn group(&self) -> EngineGroup {
        self.key.group
    }

    pub fn counter_config(&self) -> CounterConfig {
        self.config
    }

    /// Fresh sample on every call, never cached. Runtime read failures
    /// surface as `Unknown`.
    pub fn activity(&self) -> Result<BusynessSample> {
        self.handle.read_busyness()
    }

    /// Pure data, cannot fail.
    pub fn properties(&self) -> EngineProperties {
        EngineProperties {
            group: self.key.group,
            subdevice_id: self.key.subdevice,
            on_subdevice: self.on_subdevice,
        }
    }
}
