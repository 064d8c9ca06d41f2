//! judgebox-sandbox: run one untrusted binary and judge how it ended
//!
//! The supervisor forks a child that tightens itself before `execve`:
//!
//! - **Rlimits** - Stack, address space, CPU seconds, processes, file size
//! - **Jail** - Optional `chroot` and uid/gid drop
//! - **Seccomp-BPF** - Default-kill syscall policy, built per executable
//!
//! The parent races a wall-clock watchdog against the child, collects
//! `rusage` through `wait4` and classifies the outcome.
//!
//! ## Quick Start
//!
//! ```ignore
//! use judgebox_sandbox::{Config, Limit, Outcome, SeccompRule, run};
//!
//! let config = Config::new("/usr/bin/python3")
//!     .args(["solution.py"])
//!     .input_path("1.in")
//!     .output_path("1.out")
//!     .max_cpu_time(Limit::Max(1000))
//!     .max_real_time(Limit::Max(3000))
//!     .max_memory(Limit::Max(128 * 1024 * 1024))
//!     .seccomp_rule(SeccompRule::Python);
//!
//! let result = run(&config);
//! assert_eq!(result.outcome, Outcome::Success);
//! ```
//!
//! ## Requirements
//!
//! - Root (for rlimits, chroot and identity changes)
//! - Linux 5.3+ (pidfd) on x86_64
//! - Seccomp enabled in kernel

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod child;
pub mod classify;
pub mod config;
pub mod isolation;
pub mod log;
pub mod monitor;
pub mod policy;
pub mod result;
pub mod runner;
pub mod watchdog;

pub use classify::{LIMIT_CHECKS, LimitCheck, Limits, classify};
pub use config::{Config, ConfigError, Limit, ParseLimitError};
pub use log::RunLog;
pub use policy::{PolicyError, SeccompRule, UnknownRule};
pub use result::{Outcome, RunResult, SetupError};
pub use runner::run;
pub use watchdog::{Watchdog, WatchdogError, WatchdogExit};
