//! Wall-clock watchdog.
//!
//! A timer thread that kills the child once the real-time limit passes,
//! unless it is cancelled first.
//!
//! The thread blocks in `recv_timeout` on a channel. Dropping the sender
//! wakes it with `Disconnected`, which is the cancel path; running out the
//! clock is the fire path. Either way the thread exits, so it fires at most
//! once and cancelling after it fired just joins a finished thread.
//!
//! The child is addressed through a pidfd opened before the thread starts.
//! The supervisor reaps the child before cancelling; a raw pid could be
//! recycled in that window, a pidfd cannot.

use std::io;
use std::os::fd::OwnedFd;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustix::io::Errno;
use rustix::process::{Pid, PidfdFlags, Signal, pidfd_open, pidfd_send_signal};
use thiserror::Error;

/// Watchdog could not be started.
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("invalid pid {0}")]
    InvalidPid(i32),

    #[error("pidfd: {0}")]
    Pidfd(Errno),

    #[error("spawn: {0}")]
    Spawn(io::Error),
}

/// How the watchdog thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// Deadline passed; the child was sent SIGKILL.
    Fired,
    Cancelled,
}

/// Handle to a running watchdog. Cancels on drop.
#[derive(Debug)]
pub struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<WatchdogExit>>,
}

impl Watchdog {
    /// Arm a watchdog that kills `pid` after `timeout`.
    pub fn start(pid: i32, timeout: Duration) -> Result<Self, WatchdogError> {
        let target = Pid::from_raw(pid).ok_or(WatchdogError::InvalidPid(pid))?;
        let pidfd = pidfd_open(target, PidfdFlags::empty()).map_err(WatchdogError::Pidfd)?;

        let (tx, rx) = mpsc::channel();
        // Log into whatever the supervisor is logging into.
        let dispatch = tracing::dispatcher::get_default(tracing::Dispatch::clone);

        let handle = thread::Builder::new()
            .name("judgebox-watchdog".into())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || watch(&pidfd, &rx, timeout, pid))
            })
            .map_err(WatchdogError::Spawn)?;

        tracing::debug!(pid, timeout_ms = timeout.as_millis() as u64, "watchdog armed");
        Ok(Self {
            cancel: Some(tx),
            handle: Some(handle),
        })
    }

    /// Stop the watchdog and wait for its thread.
    ///
    /// Returns `None` only if the thread panicked.
    pub fn cancel(mut self) -> Option<WatchdogExit> {
        self.stop()
    }

    fn stop(&mut self) -> Option<WatchdogExit> {
        drop(self.cancel.take());
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(exit) => Some(exit),
            Err(_) => {
                tracing::warn!("watchdog thread panicked");
                None
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch(pidfd: &OwnedFd, rx: &Receiver<()>, timeout: Duration, pid: i32) -> WatchdogExit {
    match rx.recv_timeout(timeout) {
        Err(RecvTimeoutError::Timeout) => {
            // ESRCH just means the child is already gone.
            if let Err(e) = pidfd_send_signal(pidfd, Signal::KILL) {
                tracing::debug!(pid, error = %e, "watchdog kill failed");
            }
            tracing::info!(pid, "real time limit reached, child killed");
            WatchdogExit::Fired
        }
        Ok(()) | Err(RecvTimeoutError::Disconnected) => WatchdogExit::Cancelled,
    }
}
