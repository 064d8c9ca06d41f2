//! Per-run log file.
//!
//! [`RunLog::open`] installs a `tracing` subscriber writing to the run's log
//! file as the thread's default, and [`RunLog::close`] removes it. Everything
//! logged in between, including from the forked child and the watchdog
//! thread, lands in that file.
//!
//! The forked child cannot go through the subscriber: a lock held by another
//! thread at `fork` would never be released in the child. [`RunLog::report_fd`]
//! hands it a duplicate descriptor of the same file to `write(2)` into instead.
//!
//! Logging is best effort: a log file that cannot be opened leaves the
//! ambient subscriber in place.

use std::fs::OpenOptions;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing::subscriber::DefaultGuard;

/// Scoped handle to the log of one run.
#[derive(Debug)]
pub struct RunLog {
    guard: Option<DefaultGuard>,
    report: Option<OwnedFd>,
}

impl RunLog {
    pub fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::ambient();
        };

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open log file");
                return Self::ambient();
            }
        };
        let report = file.try_clone().ok().map(OwnedFd::from);

        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .with_thread_names(true)
            .finish();

        Self {
            guard: Some(tracing::subscriber::set_default(subscriber)),
            report,
        }
    }

    fn ambient() -> Self {
        Self {
            guard: None,
            report: None,
        }
    }

    /// Append-mode descriptor of the log file, for the forked child.
    pub fn report_fd(&self) -> Option<RawFd> {
        self.report.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// True if this run writes to its own file.
    pub fn is_file(&self) -> bool {
        self.guard.is_some()
    }

    /// Restore the previous subscriber and close the file.
    pub fn close(self) {
        drop(self.guard);
        drop(self.report);
    }
}
