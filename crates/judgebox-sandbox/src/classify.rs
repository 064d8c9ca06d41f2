//! Outcome classification.
//!
//! Pure: a function of the limits, the wait status, the rusage and the
//! measured wall time. No syscalls, so every branch is unit-tested here.
//!
//! ## Precedence
//!
//! 1. `SIGUSR1` means the bootstrap failed: `SystemError`, nothing else recorded
//! 2. Non-zero exit code: `RuntimeError`
//! 3. `SIGSEGV`: `MemoryLimitExceeded` if memory is over the limit, else `RuntimeError`
//! 4. Any other signal: `RuntimeError`
//! 5. Then each entry of [`LIMIT_CHECKS`] in order, a later match overwriting
//!    an earlier one: memory, real time, CPU time

use crate::child::INTERNAL_FAILURE_SIGNAL;
use crate::config::{Config, Limit};
use crate::monitor::{ExitInfo, Usage};
use crate::result::{Outcome, RunResult};

/// Limit checks in increasing priority.
pub const LIMIT_CHECKS: [LimitCheck; 3] = [
    LimitCheck::Memory,
    LimitCheck::RealTime,
    LimitCheck::CpuTime,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitCheck {
    Memory,
    RealTime,
    CpuTime,
}

impl LimitCheck {
    fn exceeded(self, limits: &Limits, result: &RunResult) -> bool {
        match self {
            Self::Memory => limits.memory.exceeded_by(result.memory),
            Self::RealTime => limits.real_time.exceeded_by(result.real_time),
            Self::CpuTime => limits.cpu_time.exceeded_by(result.cpu_time),
        }
    }

    fn outcome(self) -> Outcome {
        match self {
            Self::Memory => Outcome::MemoryLimitExceeded,
            Self::RealTime => Outcome::RealTimeLimitExceeded,
            Self::CpuTime => Outcome::CpuTimeLimitExceeded,
        }
    }
}

/// The limits classification compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    pub cpu_time: Limit,
    pub real_time: Limit,
    pub memory: Limit,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            cpu_time: config.max_cpu_time,
            real_time: config.max_real_time,
            memory: config.max_memory,
        }
    }
}

pub fn classify(limits: &Limits, exit: ExitInfo, usage: Usage, real_time: u64) -> RunResult {
    let mut result = RunResult {
        real_time,
        signal: exit.signal(),
        ..RunResult::default()
    };

    if result.signal == INTERNAL_FAILURE_SIGNAL {
        result.outcome = Outcome::SystemError;
        return result;
    }

    result.exit_code = exit.exit_code();
    result.cpu_time = usage.cpu_time;
    result.memory = usage.memory;

    if result.exit_code != 0 {
        tracing::debug!(exit_code = result.exit_code, "child exited with non-zero code");
        result.outcome = Outcome::RuntimeError;
    }

    if result.signal == libc::SIGSEGV {
        result.outcome = if limits.memory.exceeded_by(result.memory) {
            Outcome::MemoryLimitExceeded
        } else {
            Outcome::RuntimeError
        };
    } else if result.signal != 0 {
        result.outcome = Outcome::RuntimeError;
    }
    if result.signal != 0 {
        tracing::debug!(signal = result.signal, "child killed by signal");
    }

    for check in LIMIT_CHECKS {
        if check.exceeded(limits, &result) {
            result.outcome = check.outcome();
        }
    }

    result
}
