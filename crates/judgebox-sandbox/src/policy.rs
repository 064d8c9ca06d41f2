//! Syscall policies for the sandboxed child.
//!
//! A policy is a pure function of the executable path: the same path always
//! yields the same filter. Unmatched syscalls kill the process.
//!
//! ## Python
//!
//! | Rule | Condition |
//! |------|-----------|
//! | runtime whitelist | none |
//! | `execve` | `args[0]` is the configured executable pointer |
//! | `open` | `flags & (O_WRONLY \| O_RDWR) == 0` |
//! | `openat` | `flags & (O_WRONLY \| O_RDWR) == 0` |
//!
//! The `execve` check compares the raw pointer, not the string. The filter
//! must therefore be built from the very `CStr` later handed to `execve`.

use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

use judgebox_sys::{Action, ArgCmp, CompiledFilter, FilterContext, FilterError};
use thiserror::Error;

/// Syscalls a CPython interpreter needs to start and run a script.
const PYTHON_WHITELIST: &[i64] = &[
    libc::SYS_read,
    libc::SYS_fstat,
    libc::SYS_mmap,
    libc::SYS_mprotect,
    libc::SYS_munmap,
    libc::SYS_uname,
    libc::SYS_arch_prctl,
    libc::SYS_brk,
    libc::SYS_access,
    libc::SYS_exit_group,
    libc::SYS_close,
    libc::SYS_readlink,
    libc::SYS_sysinfo,
    libc::SYS_write,
    libc::SYS_writev,
    libc::SYS_lseek,
    libc::SYS_clock_gettime,
    libc::SYS_stat,
    libc::SYS_getdents,
    libc::SYS_lstat,
    libc::SYS_getcwd,
    libc::SYS_rt_sigprocmask,
    libc::SYS_rt_sigaction,
    libc::SYS_ioctl,
    libc::SYS_set_tid_address,
    libc::SYS_set_robust_list,
    libc::SYS_prlimit64,
    libc::SYS_getrandom,
    libc::SYS_futex,
    libc::SYS_getdents64,
    libc::SYS_sigaltstack,
    libc::SYS_pread64,
    libc::SYS_dup,
    libc::SYS_fcntl,
    libc::SYS_geteuid,
    libc::SYS_getuid,
    libc::SYS_getegid,
    libc::SYS_getgid,
    // Network access for a judged program is questionable. Kept for
    // compatibility with existing problem sets until explicitly re-approved.
    libc::SYS_socket,
    libc::SYS_connect,
];

const WRITE_FLAGS: u64 = (libc::O_WRONLY | libc::O_RDWR) as u64;

/// Named syscall policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeccompRule {
    Python,
}

impl SeccompRule {
    pub fn name(self) -> &'static str {
        match self {
            Self::Python => "python",
        }
    }

    /// Build the filter for a child that will `execve(exe, ..)`.
    pub fn build(self, exe: &CStr) -> Result<CompiledFilter, PolicyError> {
        match self {
            Self::Python => python(exe),
        }
    }
}

impl fmt::Display for SeccompRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown seccomp rule {0:?}")]
pub struct UnknownRule(String);

impl FromStr for SeccompRule {
    type Err = UnknownRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Self::Python),
            other => Err(UnknownRule(other.to_owned())),
        }
    }
}

/// Policy could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("filter: {0}")]
    Filter(#[from] FilterError),
}

fn python(exe: &CStr) -> Result<CompiledFilter, PolicyError> {
    let mut ctx = FilterContext::new(Action::KillProcess);
    for &nr in PYTHON_WHITELIST {
        ctx.allow(nr)?;
    }
    ctx.allow_if(libc::SYS_execve, ArgCmp::eq(0, exe.as_ptr() as u64))?;
    ctx.allow_if(libc::SYS_open, ArgCmp::masked_eq(1, WRITE_FLAGS, 0))?;
    ctx.allow_if(libc::SYS_openat, ArgCmp::masked_eq(2, WRITE_FLAGS, 0))?;
    Ok(ctx.compile()?)
}
