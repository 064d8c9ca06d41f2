//! Execution supervisor.
//!
//! Drives one run through its phases:
//!
//! ```text
//! Init -> Validating -> Forking -> Monitoring -> Waiting -> Classifying -> Done
//!                          \
//!                           child: bootstrap -> execve
//! ```
//!
//! Validating, Forking and Monitoring can abort with a [`SetupError`]; a live
//! child is killed on the way out. Everything per run (start time, watchdog)
//! is owned by the [`Supervisor`] of that call.

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use judgebox_sys::last_errno;

use crate::child::{self, ChildPlan};
use crate::classify::{Limits, classify};
use crate::config::Config;
use crate::log::RunLog;
use crate::monitor::{kill_and_reap, kill_child, wait_child};
use crate::result::{RunResult, SetupError};
use crate::watchdog::{Watchdog, WatchdogExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Validating,
    Forking,
    Monitoring,
    Waiting,
    Classifying,
    Done,
}

/// Run `config.exe_path` in the sandbox and classify how it ended.
///
/// Never fails: setup problems come back in [`RunResult::error`].
pub fn run(config: &Config) -> RunResult {
    let log = RunLog::open(config.log_path.as_deref());
    let result = Supervisor::new(config, log.report_fd()).run();
    log.close();
    result
}

/// Checks made before anything is forked.
pub(crate) fn preflight(config: &Config, is_root: bool) -> Result<(), SetupError> {
    if !is_root {
        return Err(SetupError::RootRequired);
    }
    config.validate().map_err(|e| {
        tracing::error!(error = %e, "invalid config");
        SetupError::InvalidConfig
    })
}

struct Supervisor<'a> {
    config: &'a Config,
    /// Where the child reports its own setup failures.
    report_fd: Option<RawFd>,
    phase: Phase,
}

impl<'a> Supervisor<'a> {
    fn new(config: &'a Config, report_fd: Option<RawFd>) -> Self {
        Self {
            config,
            report_fd,
            phase: Phase::Init,
        }
    }

    fn run(mut self) -> RunResult {
        match self.execute() {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(phase = ?self.phase, code = e.code(), error = %e, "run aborted");
                RunResult::setup_failed(e)
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    fn execute(&mut self) -> Result<RunResult, SetupError> {
        self.enter(Phase::Validating);
        preflight(self.config, rustix::process::getuid().is_root())?;
        let plan = ChildPlan::new(self.config)?;

        self.enter(Phase::Forking);
        tracing::debug!(
            exe = %self.config.exe_path.display(),
            seccomp = plan.has_filter(),
            "forking"
        );
        let start = Instant::now();
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            tracing::error!(errno = %last_errno(), "fork failed");
            return Err(SetupError::ForkFailed);
        }
        if pid == 0 {
            child::bootstrap(&plan, self.report_fd);
        }
        tracing::debug!(pid, "child forked");

        self.enter(Phase::Monitoring);
        let watchdog = match self.config.max_real_time.as_option() {
            Some(ms) => match Watchdog::start(pid, Duration::from_millis(ms)) {
                Ok(watchdog) => Some(watchdog),
                Err(e) => {
                    tracing::error!(pid, error = %e, "cannot start watchdog");
                    kill_and_reap(pid);
                    return Err(SetupError::PthreadFailed);
                }
            },
            None => None,
        };

        self.enter(Phase::Waiting);
        let waited = wait_child(pid);
        let real_time = start.elapsed().as_millis() as u64;
        // On error the watchdog is cancelled when dropped.
        let (exit, usage) = waited.map_err(|e| {
            tracing::warn!(pid, error = %e, "couldn't wait for child");
            kill_child(pid);
            SetupError::WaitFailed
        })?;

        if let Some(watchdog) = watchdog {
            match watchdog.cancel() {
                Some(WatchdogExit::Fired) => tracing::debug!(pid, "watchdog had fired"),
                Some(WatchdogExit::Cancelled) => {}
                None => tracing::warn!(pid, "watchdog did not shut down cleanly"),
            }
        }

        self.enter(Phase::Classifying);
        let result = classify(&Limits::from(self.config), exit, usage, real_time);
        if exit.stopped() {
            tracing::warn!(pid, stop_signal = exit.exit_code(), "child stopped, killing it");
            kill_and_reap(pid);
        }

        self.enter(Phase::Done);
        tracing::info!(
            outcome = ?result.outcome,
            cpu_time = result.cpu_time,
            real_time = result.real_time,
            memory = result.memory,
            signal = result.signal,
            exit_code = result.exit_code,
            "run finished"
        );
        Ok(result)
    }
}
