use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::errno::Errno;

use crate::error::{Result, TelemetryError};

const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

/// Engine counters tick in nanoseconds; samples are reported in microseconds.
const NS_PER_US: u64 = 1000;

/// `perf_event_attr`, leading fields only. The kernel accepts a shorter
/// `size` and treats everything past it as zero.
#[repr(C)]
#[derive(Default)]
struct PerfEventAttr {
    type_: u32,
    size: u32,
    config: u64,
    sample_period_or_freq: u64,
    sample_type: u64,
    read_format: u64,
    flags: u64,
    wakeup_events_or_watermark: u32,
    bp_type: u32,
    config1_or_bp_addr: u64,
    config2_or_bp_len: u64,
    branch_sample_type: u64,
    sample_regs_user: u64,
    sample_stack_user: u32,
    clockid: i32,
    sample_regs_intr: u64,
    aux_watermark: u32,
    sample_max_stack: u16,
    reserved_2: u16,
}

fn perf_event_open(attr: &PerfEventAttr, pid: i32, cpu: i32, group_fd: RawFd, flags: libc::c_ulong) -> i64 {
    unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            attr as *const PerfEventAttr as usize,
            pid,
            cpu,
            group_fd,
            flags,
        )
    }
}

/// Opening a counter can fail for a specific engine while the rest of the
/// device is fine, so a failed open is `UnsupportedFeature` and the caller
/// omits the engine. There is no retry.
fn open_counter(pmu_type: u32, config: u64, group_fd: RawFd, read_format: u64) -> Result<OwnedFd> {
    let mut attr = PerfEventAttr::default();
    attr.type_ = pmu_type;
    attr.size = std::mem::size_of::<PerfEventAttr>() as u32;
    attr.config = config;
    attr.read_format = read_format;

    let fd = perf_event_open(&attr, -1, 0, group_fd, PERF_FLAG_FD_CLOEXEC);
    if fd < 0 {
        return Err(TelemetryError::UnsupportedFeature);
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
}

/// A pair of opaque event configs produced by one KMD backend and only
/// meaningful to it. `total_ticks == None` selects grouped single-fd mode,
/// where the total comes out of the same read buffer as the active value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterConfig {
    pub active_ticks: u64,
    pub total_ticks: Option<u64>,
}

/// One busyness snapshot, produced fresh on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusynessSample {
    pub active_time_us: u64,
    pub timestamp_us: u64,
}

impl BusynessSample {
    pub(crate) fn from_ns(active_ns: u64, timestamp_ns: u64) -> Self {
        Self {
            active_time_us: active_ns / NS_PER_US,
            timestamp_us: timestamp_ns / NS_PER_US,
        }
    }
}

/// Exclusive owner of the perf descriptors behind one engine. One or two
/// descriptors, each closed exactly once when the engine goes away.
#[derive(Debug)]
pub struct CounterHandle {
    active: OwnedFd,
    /// `None` in grouped mode.
    total: Option<OwnedFd>,
}

impl CounterHandle {
    /// Two descriptors; the total counter joins the active counter's perf
    /// event group so both stop and start together.
    pub(crate) fn open_pair(pmu_type: u32, active_config: u64, total_config: u64) -> Result<Self> {
        let active = open_counter(pmu_type, active_config, -1, 0)?;
        let total = open_counter(pmu_type, total_config, active.as_raw_fd(), 0)?;

        Ok(Self { active, total: Some(total) })
    }

    /// Single descriptor; the kernel reports `[value, time_enabled]` in one
    /// read buffer at fixed offsets.
    pub(crate) fn open_grouped(pmu_type: u32, config: u64) -> Result<Self> {
        let active = open_counter(pmu_type, config, -1, PERF_FORMAT_TOTAL_TIME_ENABLED)?;

        Ok(Self { active, total: None })
    }

    pub fn is_grouped(&self) -> bool {
        self.total.is_none()
    }

    /// Read failures here are runtime failures on an established handle,
    /// so they surface as `Unknown`, never as stale or zeroed data.
    pub fn read_busyness(&self) -> Result<BusynessSample> {
        if let Some(total) = &self.total {
            let active_ns = read_u64(&self.active)?;
            let total_ns = read_u64(total)?;

            Ok(BusynessSample::from_ns(active_ns, total_ns))
        } else {
            let buf = read_exact::<16>(&self.active)?;
            let value = u64::from_ne_bytes(buf[..8].try_into().unwrap());
            let time_enabled = u64::from_ne_bytes(buf[8..].try_into().unwrap());

            Ok(BusynessSample::from_ns(value, time_enabled))
        }
    }

    #[cfg(test)]
    pub(crate) fn from_owned_fds(active: OwnedFd, total: Option<OwnedFd>) -> Self {
        Self { active, total }
    }
}

fn read_exact<const N: usize>(fd: &OwnedFd) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    let ret = unsafe {
        libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, N)
    };

    if ret < 0 {
        return Err(TelemetryError::Unknown(Errno::last()));
    }
    if ret as usize != N {
        return Err(TelemetryError::Unknown(Errno::EIO));
    }

    Ok(buf)
}

fn read_u64(fd: &OwnedFd) -> Result<u64> {
    read_exact::<8>(fd).map(u64::from_ne_bytes)
}
