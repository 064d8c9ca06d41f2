//! What a run hands back to its caller.
//!
//! Two channels are kept apart: [`Outcome`] says how the child fared, and
//! [`SetupError`] says whether the supervisor managed to run it at all.

use serde::Serialize;
use thiserror::Error;

/// Classified outcome of the sandboxed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    #[default]
    Success,
    CpuTimeLimitExceeded,
    RealTimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    /// Sandbox setup inside the child failed before the target ran.
    SystemError,
}

impl Outcome {
    /// Legacy numeric code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::CpuTimeLimitExceeded => 1,
            Self::RealTimeLimitExceeded => 2,
            Self::MemoryLimitExceeded => 3,
            Self::RuntimeError => 4,
            Self::SystemError => 5,
        }
    }
}

/// The supervisor could not establish or keep the sandbox.
///
/// The last five variants only ever occur inside the child; the parent sees
/// them as [`Outcome::SystemError`] and they are logged from the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupError {
    #[error("invalid configuration")]
    InvalidConfig,

    #[error("fork failed")]
    ForkFailed,

    #[error("watchdog thread could not be started")]
    PthreadFailed,

    #[error("wait4 failed")]
    WaitFailed,

    #[error("root privilege required")]
    RootRequired,

    #[error("seccomp filter could not be loaded")]
    LoadSeccompFailed,

    #[error("setrlimit failed")]
    SetrlimitFailed,

    #[error("dup2 failed")]
    Dup2Failed,

    #[error("dropping privileges failed")]
    SetuidFailed,

    #[error("execve failed")]
    ExecveFailed,

    #[error("chroot failed")]
    ChrootFailed,
}

impl SetupError {
    /// Legacy numeric code. Success is 0, so every error is negative.
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidConfig => -1,
            Self::ForkFailed => -2,
            Self::PthreadFailed => -3,
            Self::WaitFailed => -4,
            Self::RootRequired => -5,
            Self::LoadSeccompFailed => -6,
            Self::SetrlimitFailed => -7,
            Self::Dup2Failed => -8,
            Self::SetuidFailed => -9,
            Self::ExecveFailed => -10,
            Self::ChrootFailed => -11,
        }
    }
}

/// Result of one run.
///
/// Starts zeroed. Either classification or a setup error fills it, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunResult {
    pub outcome: Outcome,
    pub error: Option<SetupError>,
    /// User CPU time in milliseconds.
    pub cpu_time: u64,
    /// Wall-clock time in milliseconds.
    pub real_time: u64,
    /// Peak resident set size in bytes.
    pub memory: u64,
    pub signal: i32,
    pub exit_code: i32,
}

impl RunResult {
    pub(crate) fn setup_failed(error: SetupError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    #[inline]
    pub fn success(&self) -> bool {
        self.error.is_none() && self.outcome == Outcome::Success
    }

    /// Legacy numeric error code, 0 when the sandbox was set up fine.
    pub fn error_code(&self) -> i32 {
        self.error.map_or(0, SetupError::code)
    }
}
