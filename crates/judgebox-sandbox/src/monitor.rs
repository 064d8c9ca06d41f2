//! Waiting on the child and reading its resource usage.
//!
//! `wait4` returns the termination status and the child's `rusage` in one
//! call, so the accounting always belongs to the status it came with.
//!
//! ## Stopped children
//!
//! `WUNTRACED` is passed, so a child stopped by a signal also ends the wait.
//! The stop status leaves a non-zero exit code, so it classifies as a runtime
//! error, and [`kill_and_reap`] collects it afterwards.

use judgebox_sys::last_errno;
use rustix::io::Errno;

/// Decoded `wait4` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    raw: i32,
}

impl ExitInfo {
    pub fn from_raw(raw: i32) -> Self {
        Self { raw }
    }

    /// Terminating signal, or 0 if the child was not killed by one.
    pub fn signal(self) -> i32 {
        if libc::WIFSIGNALED(self.raw) {
            libc::WTERMSIG(self.raw)
        } else {
            0
        }
    }

    /// `WEXITSTATUS` of the raw status.
    ///
    /// Only meaningful for a normal exit, but taken unconditionally: a
    /// stopped child reports its stop signal here.
    pub fn exit_code(self) -> i32 {
        libc::WEXITSTATUS(self.raw)
    }

    pub fn stopped(self) -> bool {
        libc::WIFSTOPPED(self.raw)
    }
}

/// What the kernel accounted for the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    /// User CPU time in milliseconds.
    pub cpu_time: u64,
    /// Peak RSS in bytes.
    pub memory: u64,
}

impl Usage {
    fn from_rusage(ru: &libc::rusage) -> Self {
        let utime = ru.ru_utime;
        let ms = utime.tv_sec.max(0) as u64 * 1000 + utime.tv_usec.max(0) as u64 / 1000;
        Self {
            cpu_time: ms,
            memory: (ru.ru_maxrss.max(0) as u64).saturating_mul(1024),
        }
    }
}

/// Block until `pid` terminates or stops.
pub fn wait_child(pid: i32) -> Result<(ExitInfo, Usage), Errno> {
    let mut status: libc::c_int = 0;
    // SAFETY: zeroed rusage is a valid out-parameter.
    let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        let ret = unsafe { libc::wait4(pid, &mut status, libc::WUNTRACED, &mut ru) };
        if ret >= 0 {
            return Ok((ExitInfo::from_raw(status), Usage::from_rusage(&ru)));
        }
        let errno = last_errno();
        if errno != Errno::INTR {
            return Err(errno);
        }
    }
}

/// Kill a child and collect it so it does not linger as a zombie.
pub fn kill_and_reap(pid: i32) {
    kill_child(pid);
    let mut status: libc::c_int = 0;
    loop {
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret >= 0 || last_errno() != Errno::INTR {
            break;
        }
    }
}

/// Best-effort SIGKILL.
pub fn kill_child(pid: i32) {
    // SAFETY: plain kill(2); failure (already gone) is ignored.
    unsafe { libc::kill(pid, libc::SIGKILL) };
}
