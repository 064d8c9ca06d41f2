//! Child-side bootstrap.
//!
//! Everything the child needs is prepared in the parent as a [`ChildPlan`]
//! before `fork`: C strings, pointer arrays, rlimits and the compiled syscall
//! filter. After `fork` the child only makes syscalls in this order:
//!
//! 1. Reset the `SIGUSR1` disposition and unblock it
//! 2. Apply rlimits
//! 3. `chroot` + `chdir("/")`
//! 4. Redirect stdin/stdout/stderr
//! 5. Drop groups, gid, uid
//! 6. Check the executable is executable
//! 7. Load the syscall filter
//! 8. `execve`
//!
//! Any failure is written to the run log and the child kills itself with
//! `SIGUSR1`, which the parent reports as `SYSTEM_ERROR`.
//!
//! ## Why the access check
//!
//! The filter does not allow `tgkill`. A failed `execve` after the filter is
//! loaded would die by `SIGSYS` on the way to raising `SIGUSR1`, and be
//! misread as a runtime error. Checking `X_OK` first catches the common case
//! (missing or non-executable file) while signals still work.

use std::convert::Infallible;
use std::ffi::{CString, c_char};
use std::fmt;
use std::os::fd::RawFd;
use std::path::Path;

use judgebox_sys::{CompiledFilter, FilterError, last_errno};
use rustix::io::Errno;
use thiserror::Error;

use crate::config::Config;
use crate::isolation::{Rlimit, apply_rlimits, plan_rlimits};
use crate::result::SetupError;

/// Signal the child raises when its own setup fails.
pub const INTERNAL_FAILURE_SIGNAL: i32 = libc::SIGUSR1;

const OUTPUT_FLAGS: i32 = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC;
const OUTPUT_MODE: libc::c_uint = 0o644;

/// Failure inside the child before `execve` took over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChildError {
    #[error("signal setup: {0}")]
    Signal(Errno),

    #[error("setrlimit: {0}")]
    Rlimit(Errno),

    #[error("chroot: {0}")]
    Chroot(Errno),

    #[error("redirect {fd}: {errno}")]
    Redirect { fd: i32, errno: Errno },

    #[error("drop privileges: {0}")]
    Identity(Errno),

    #[error("executable check: {0}")]
    NotExecutable(Errno),

    #[error("seccomp: {0}")]
    Seccomp(FilterError),

    #[error("execve: {0}")]
    Exec(Errno),
}

impl ChildError {
    pub fn setup_error(&self) -> SetupError {
        match self {
            Self::Signal(_) | Self::NotExecutable(_) | Self::Exec(_) => SetupError::ExecveFailed,
            Self::Rlimit(_) => SetupError::SetrlimitFailed,
            Self::Chroot(_) => SetupError::ChrootFailed,
            Self::Redirect { .. } => SetupError::Dup2Failed,
            Self::Identity(_) => SetupError::SetuidFailed,
            Self::Seccomp(_) => SetupError::LoadSeccompFailed,
        }
    }

    fn step(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::Rlimit(_) => "setrlimit",
            Self::Chroot(_) => "chroot",
            Self::Redirect { .. } => "redirect",
            Self::Identity(_) => "drop_privileges",
            Self::NotExecutable(_) => "access",
            Self::Seccomp(_) => "seccomp",
            Self::Exec(_) => "execve",
        }
    }

    fn raw_errno(&self) -> i32 {
        match self {
            Self::Signal(e)
            | Self::Rlimit(e)
            | Self::Chroot(e)
            | Self::Identity(e)
            | Self::NotExecutable(e)
            | Self::Exec(e)
            | Self::Redirect { errno: e, .. }
            | Self::Seccomp(FilterError::Load(e)) => e.raw_os_error(),
            Self::Seccomp(_) => 0,
        }
    }

    /// One log line describing the failure. Formats integers only, so it
    /// neither allocates nor locks.
    fn report(&self, w: &mut impl fmt::Write) -> fmt::Result {
        write!(
            w,
            "ERROR child setup failed: code={} step={}",
            self.setup_error().code(),
            self.step()
        )?;
        if let Self::Redirect { fd, .. } = self {
            write!(w, " fd={fd}")?;
        }
        writeln!(w, " errno={}", self.raw_errno())
    }
}

/// Fixed-size line buffer; text past the end is dropped.
struct ReportLine {
    buf: [u8; 128],
    len: usize,
}

impl ReportLine {
    const fn new() -> Self {
        Self {
            buf: [0; 128],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for ReportLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}

/// Where stdout and stderr go.
#[derive(Debug)]
enum Outputs {
    Separate {
        output: Option<CString>,
        error: Option<CString>,
    },
    /// Same file for both; opened once so writes do not clobber each other.
    Shared(CString),
}

/// Everything the child needs, resolved before `fork`.
#[derive(Debug)]
pub struct ChildPlan {
    exe: CString,
    // Keep the strings alive; the pointer arrays below point into them.
    _argv: Vec<CString>,
    _envp: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    envp_ptrs: Vec<*const c_char>,
    input: Option<CString>,
    outputs: Outputs,
    chroot: Option<CString>,
    uid: Option<u32>,
    gid: Option<u32>,
    rlimits: Vec<Rlimit>,
    filter: Option<CompiledFilter>,
}

impl ChildPlan {
    /// Resolve `config` into a plan. `config` must already be validated.
    pub fn new(config: &Config) -> Result<Self, SetupError> {
        let exe = path_cstr(&config.exe_path)?;

        let mut argv = Vec::with_capacity(config.args.len() + 1);
        argv.push(exe.clone());
        for arg in &config.args {
            argv.push(CString::new(arg.as_str()).map_err(|_| SetupError::InvalidConfig)?);
        }
        let envp = config
            .env
            .iter()
            .map(|(k, v)| CString::new(format!("{k}={v}")))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SetupError::InvalidConfig)?;

        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);

        let outputs = match (&config.output_path, &config.error_path) {
            (Some(out), Some(err)) if out == err => Outputs::Shared(path_cstr(out)?),
            (out, err) => Outputs::Separate {
                output: out.as_deref().map(path_cstr).transpose()?,
                error: err.as_deref().map(path_cstr).transpose()?,
            },
        };

        // The execve rule matches on this exact pointer. The CString's heap
        // buffer does not move when `exe` moves into the plan.
        let filter = config
            .seccomp_rule
            .map(|rule| rule.build(&exe))
            .transpose()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build seccomp filter");
                SetupError::LoadSeccompFailed
            })?;

        Ok(Self {
            exe,
            _argv: argv,
            _envp: envp,
            argv_ptrs,
            envp_ptrs,
            input: config.input_path.as_deref().map(path_cstr).transpose()?,
            outputs,
            chroot: config.chroot_path.as_deref().map(path_cstr).transpose()?,
            uid: config.uid,
            gid: config.gid,
            rlimits: plan_rlimits(config),
            filter,
        })
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Run the setup sequence and exec. Only returns on failure.
    fn enter(&self) -> Result<Infallible, ChildError> {
        reset_internal_signal().map_err(ChildError::Signal)?;
        apply_rlimits(&self.rlimits).map_err(ChildError::Rlimit)?;

        if let Some(root) = &self.chroot {
            check(unsafe { libc::chroot(root.as_ptr()) }).map_err(ChildError::Chroot)?;
            check(unsafe { libc::chdir(c"/".as_ptr()) }).map_err(ChildError::Chroot)?;
        }

        self.redirect_stdio()?;
        self.drop_privileges().map_err(ChildError::Identity)?;

        check(unsafe { libc::access(self.exe.as_ptr(), libc::X_OK) })
            .map_err(ChildError::NotExecutable)?;

        if let Some(filter) = &self.filter {
            filter.load().map_err(ChildError::Seccomp)?;
        }

        unsafe {
            libc::execve(
                self.exe.as_ptr(),
                self.argv_ptrs.as_ptr(),
                self.envp_ptrs.as_ptr(),
            );
        }
        Err(ChildError::Exec(last_errno()))
    }

    fn redirect_stdio(&self) -> Result<(), ChildError> {
        if let Some(input) = &self.input {
            redirect(input, libc::O_RDONLY | libc::O_CLOEXEC, libc::STDIN_FILENO)?;
        }
        match &self.outputs {
            Outputs::Shared(path) => {
                redirect(path, OUTPUT_FLAGS, libc::STDOUT_FILENO)?;
                if unsafe { libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) } < 0 {
                    return Err(ChildError::Redirect {
                        fd: libc::STDERR_FILENO,
                        errno: last_errno(),
                    });
                }
            }
            Outputs::Separate { output, error } => {
                if let Some(path) = output {
                    redirect(path, OUTPUT_FLAGS, libc::STDOUT_FILENO)?;
                }
                if let Some(path) = error {
                    redirect(path, OUTPUT_FLAGS, libc::STDERR_FILENO)?;
                }
            }
        }
        Ok(())
    }

    fn drop_privileges(&self) -> Result<(), Errno> {
        if let Some(gid) = self.gid {
            let groups = [gid];
            check(unsafe { libc::setgroups(1, groups.as_ptr()) })?;
            check(unsafe { libc::setgid(gid) })?;
        }
        if let Some(uid) = self.uid {
            check(unsafe { libc::setuid(uid) })?;
        }
        Ok(())
    }
}

/// Child entry point after `fork`. Never returns.
///
/// The child is a copy of a possibly multi-threaded parent, so a failure is
/// not logged through `tracing`: one preformatted line goes to `report_fd`
/// with a bare `write(2)`, then the child raises `SIGUSR1`.
///
/// One failure is misreported. If `execve` itself fails after the syscall
/// filter is loaded (`ENOEXEC` for an executable file that is not a valid
/// binary, say), `raise` needs `tgkill`, which the filter does not allow. The
/// child dies by `SIGSYS` and the run is judged `RUNTIME_ERROR` rather than
/// `SYSTEM_ERROR`.
pub fn bootstrap(plan: &ChildPlan, report_fd: Option<RawFd>) -> ! {
    let err = match plan.enter() {
        Ok(never) => match never {},
        Err(err) => err,
    };

    if let Some(fd) = report_fd {
        let mut line = ReportLine::new();
        // A truncated line is still worth writing.
        let _ = err.report(&mut line);
        let bytes = line.as_bytes();
        unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
    }

    unsafe {
        libc::raise(INTERNAL_FAILURE_SIGNAL);
        // Only reached if the signal could not be delivered.
        libc::_exit(127)
    }
}

/// Make sure `SIGUSR1` terminates the child even if the parent ignored or
/// blocked it.
fn reset_internal_signal() -> Result<(), Errno> {
    unsafe {
        if libc::signal(INTERNAL_FAILURE_SIGNAL, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(last_errno());
        }
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, INTERNAL_FAILURE_SIGNAL);
        check(libc::sigprocmask(
            libc::SIG_UNBLOCK,
            &set,
            std::ptr::null_mut(),
        ))
    }
}

fn redirect(path: &CString, flags: i32, target: i32) -> Result<(), ChildError> {
    let fd = unsafe { libc::open(path.as_ptr(), flags, OUTPUT_MODE) };
    if fd < 0 {
        return Err(ChildError::Redirect {
            fd: target,
            errno: last_errno(),
        });
    }
    if fd == target {
        // Target was closed and open() reused it; just drop O_CLOEXEC.
        return check(unsafe { libc::fcntl(fd, libc::F_SETFD, 0) })
            .map_err(|errno| ChildError::Redirect { fd: target, errno });
    }
    // dup2 clears O_CLOEXEC on the target.
    let ret = unsafe { libc::dup2(fd, target) };
    let errno = last_errno();
    unsafe { libc::close(fd) };
    if ret < 0 {
        return Err(ChildError::Redirect { fd: target, errno });
    }
    Ok(())
}

#[inline]
fn check(ret: libc::c_int) -> Result<(), Errno> {
    if ret < 0 { Err(last_errno()) } else { Ok(()) }
}

fn path_cstr(path: &Path) -> Result<CString, SetupError> {
    use std::os::unix::ffi::OsStrExt;

    CString::new(path.as_os_str().as_bytes()).map_err(|_| SetupError::InvalidConfig)
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}
