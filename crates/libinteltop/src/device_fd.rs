use std::fs;
use std::os::fd::{IntoRawFd, RawFd};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{Result, TelemetryError};

struct FdState {
    fd: RawFd,
    count: u32,
}

/// The device-level fd that gates topology queries. Other subsystems may
/// hold it concurrently, so it is opened on first acquire and closed by the
/// last guard dropped, never unilaterally.
pub struct DeviceFd {
    render: PathBuf,
    card: PathBuf,
    state: Mutex<FdState>,
}

pub struct DeviceFdGuard {
    owner: Arc<DeviceFd>,
    fd: RawFd,
}

impl DeviceFd {
    pub fn new<P: Into<PathBuf>>(render: P, card: P) -> Arc<Self> {
        Arc::new(Self {
            render: render.into(),
            card: card.into(),
            state: Mutex::new(FdState { fd: -1, count: 0 }),
        })
    }

    pub fn from_device_path(device_path: &crate::DevicePath) -> Arc<Self> {
        Self::new(device_path.render.clone(), device_path.card.clone())
    }

    pub fn acquire(self: &Arc<Self>) -> Result<DeviceFdGuard> {
        let mut state = self.state.lock().unwrap();

        if state.count == 0 {
            // the render node may not exist in headless setups
            let file = fs::File::open(&self.render)
                .or_else(|_| fs::File::open(&self.card))
                .map_err(|_| TelemetryError::DependencyUnavailable)?;
            state.fd = file.into_raw_fd();
        }

        state.count += 1;

        Ok(DeviceFdGuard { owner: Arc::clone(self), fd: state.fd })
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();

        state.count -= 1;
        if state.count == 0 {
            unsafe { libc::close(state.fd); }
            state.fd = -1;
        }
    }
}

impl DeviceFdGuard {
    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for DeviceFdGuard {
    fn drop(&mut self) {
        self.owner.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_guard_closes() {
        let dev = DeviceFd::new("/dev/null", "/dev/null");
        let a = dev.acquire().unwrap();
        let b = dev.acquire().unwrap();
        assert_eq!(a.raw_fd(), b.raw_fd());

        drop(a);
        assert_eq!(dev.state.lock().unwrap().count, 1);

        drop(b);
        let state = dev.state.lock().unwrap();
        assert_eq!(state.count, 0);
        assert_eq!(state.fd, -1);
    }

    #[test]
    fn missing_device_is_dependency_unavailable() {
        let dev = DeviceFd::new("/dev/dri/renderD999", "/dev/dri/card999");
        assert_eq!(dev.acquire().err(), Some(TelemetryError::DependencyUnavailable));
    }
}
