//! Hardware wake alarm backed by a timer file descriptor.

use std::io;
use std::io::Error;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;
use std::time::Duration;

/// A timer able to wake the machine from a low power state.
///
/// Production code uses `CLOCK_BOOTTIME_ALARM`, which keeps counting while
/// the machine is suspended and wakes the hardware when it expires. Tests
/// use a plain monotonic clock, which needs no privileges.
pub struct WakeAlarm {
    fd: OwnedFd,
}

impl WakeAlarm {
    /// Creates a disarmed alarm on the given clock.
    pub fn new(clock: libc::clockid_t) -> io::Result<Self> {
        let fd =
            unsafe { libc::timerfd_create(clock, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC) };
        if fd < 0 {
            return Err(Error::last_os_error());
        }
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Arms the alarm to fire once, `delay` from now.
    pub fn arm(&self, delay: Duration) -> io::Result<()> {
        let mut ts: libc::itimerspec = unsafe { mem::zeroed() };
        ts.it_value.tv_sec = delay.as_secs() as _;
        ts.it_value.tv_nsec = delay.subsec_nanos() as _;
        // A literal zero it_value disarms a timerfd; clamp so a zero delay
        // still fires immediately.
        if ts.it_value.tv_sec == 0 && ts.it_value.tv_nsec == 0 {
            ts.it_value.tv_nsec = 1;
        }

        let ret =
            unsafe { libc::timerfd_settime(self.fd.as_raw_fd(), 0, &ts, ptr::null_mut()) };
        if ret < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    /// Tells whether the alarm has already fired, without waiting.
    ///
    /// This is a zero-timeout readiness poll, not a read: the caller only
    /// needs to know whether the expiry races ahead of the wakeup.
    pub fn fired(&self) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
        if ret < 0 {
            return Err(Error::last_os_error());
        }
        Ok(pfd.revents & libc::POLLIN != 0)
    }
}
