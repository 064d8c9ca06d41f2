//! Run configuration.
//!
//! A `Config` describes one sandboxed run: the executable, its argv and
//! environment, where stdio goes, the optional jail and identity, the syscall
//! policy and the resource limits.
//!
//! ## Example
//!
//! ```ignore
//! use judgebox_sandbox::{Config, Limit, SeccompRule};
//!
//! let config = Config::new("/usr/bin/python3")
//!     .args(["main.py"])
//!     .env("PYTHONIOENCODING", "utf-8")
//!     .output_path("/tmp/out.txt")
//!     .max_cpu_time(Limit::Max(1000))
//!     .max_real_time(Limit::Max(3000))
//!     .max_memory(Limit::Max(256 * 1024 * 1024))
//!     .seccomp_rule(SeccompRule::Python);
//! ```
//!
//! ## Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | every `Limit` | `Unlimited` |
//! | `max_stack` | 32 MiB |
//! | `memory_limit_check_only` | false |
//! | stdio paths | inherited |
//! | `seccomp_rule` | none |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::policy::SeccompRule;

const DEFAULT_STACK: u64 = 32 * 1024 * 1024;

/// A resource limit that may be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    Unlimited,
    Max(u64),
}

impl Limit {
    #[inline]
    pub fn is_limited(self) -> bool {
        matches!(self, Self::Max(_))
    }

    /// True when `used` is strictly above the limit.
    #[inline]
    pub fn exceeded_by(self, used: u64) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Max(max) => used > max,
        }
    }

    #[inline]
    pub fn as_option(self) -> Option<u64> {
        match self {
            Self::Unlimited => None,
            Self::Max(max) => Some(max),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Max(max) => write!(f, "{max}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid limit {0:?}: expected a non-negative integer, -1 or \"unlimited\"")]
pub struct ParseLimitError(String);

impl FromStr for Limit {
    type Err = ParseLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unlimited" | "-1" => Ok(Self::Unlimited),
            n => n
                .parse::<u64>()
                .map(Self::Max)
                .map_err(|_| ParseLimitError(s.to_owned())),
        }
    }
}

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1 or unlimited")]
    ZeroLimit(&'static str),

    #[error("max_stack must be at least 1")]
    ZeroStack,

    #[error("exe_path cannot be empty")]
    EmptyExePath,

    #[error("null byte in {0}")]
    NullByte(&'static str),

    #[error("invalid environment key {0:?}")]
    InvalidEnvKey(String),
}

/// Immutable description of a single sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub exe_path: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub input_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub error_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub chroot_path: Option<PathBuf>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub seccomp_rule: Option<SeccompRule>,
    pub max_cpu_time: Limit,
    pub max_real_time: Limit,
    pub max_memory: Limit,
    pub max_output_size: Limit,
    pub max_process_number: Limit,
    pub max_stack: u64,
    /// Judge memory from peak RSS only; no address space cap in the child.
    pub memory_limit_check_only: bool,
}

impl Config {
    pub fn new(exe_path: impl Into<PathBuf>) -> Self {
        Self {
            exe_path: exe_path.into(),
            args: Vec::new(),
            env: Vec::new(),
            input_path: None,
            output_path: None,
            error_path: None,
            log_path: None,
            chroot_path: None,
            uid: None,
            gid: None,
            seccomp_rule: None,
            max_cpu_time: Limit::Unlimited,
            max_real_time: Limit::Unlimited,
            max_memory: Limit::Unlimited,
            max_output_size: Limit::Unlimited,
            max_process_number: Limit::Unlimited,
            max_stack: DEFAULT_STACK,
            memory_limit_check_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn error_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn chroot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chroot_path = Some(path.into());
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = Some(gid);
        self
    }

    pub fn seccomp_rule(mut self, rule: SeccompRule) -> Self {
        self.seccomp_rule = Some(rule);
        self
    }

    /// CPU time in milliseconds.
    pub fn max_cpu_time(mut self, limit: Limit) -> Self {
        self.max_cpu_time = limit;
        self
    }

    /// Wall-clock time in milliseconds.
    pub fn max_real_time(mut self, limit: Limit) -> Self {
        self.max_real_time = limit;
        self
    }

    /// Peak resident memory in bytes.
    pub fn max_memory(mut self, limit: Limit) -> Self {
        self.max_memory = limit;
        self
    }

    /// Largest file the child may write, in bytes.
    pub fn max_output_size(mut self, limit: Limit) -> Self {
        self.max_output_size = limit;
        self
    }

    pub fn max_process_number(mut self, limit: Limit) -> Self {
        self.max_process_number = limit;
        self
    }

    /// Stack size in bytes. Always enforced.
    pub fn max_stack(mut self, bytes: u64) -> Self {
        self.max_stack = bytes;
        self
    }

    /// Skip `RLIMIT_AS` and let the child grow past `max_memory`. The run is
    /// still judged `MemoryLimitExceeded` afterwards if its peak RSS was over.
    pub fn memory_limit_check_only(mut self, check_only: bool) -> Self {
        self.memory_limit_check_only = check_only;
        self
    }

    fn limits(&self) -> [(&'static str, Limit); 5] {
        [
            ("max_cpu_time", self.max_cpu_time),
            ("max_real_time", self.max_real_time),
            ("max_memory", self.max_memory),
            ("max_output_size", self.max_output_size),
            ("max_process_number", self.max_process_number),
        ]
    }

    /// Check the limit invariant and that every string can reach the child intact.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, limit) in self.limits() {
            if limit == Limit::Max(0) {
                return Err(ConfigError::ZeroLimit(name));
            }
        }
        if self.max_stack == 0 {
            return Err(ConfigError::ZeroStack);
        }

        if self.exe_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyExePath);
        }
        check_path("exe_path", &self.exe_path)?;
        let optional_paths = [
            ("input_path", &self.input_path),
            ("output_path", &self.output_path),
            ("error_path", &self.error_path),
            ("chroot_path", &self.chroot_path),
        ];
        for (name, path) in optional_paths {
            if let Some(path) = path {
                check_path(name, path)?;
            }
        }

        if self.args.iter().any(|a| a.contains('\0')) {
            return Err(ConfigError::NullByte("args"));
        }
        for (key, value) in &self.env {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ConfigError::InvalidEnvKey(key.clone()));
            }
            if value.contains('\0') {
                return Err(ConfigError::NullByte("env"));
            }
        }
        Ok(())
    }
}

fn check_path(name: &'static str, path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::ffi::OsStrExt;

    if path.as_os_str().as_bytes().contains(&0) {
        return Err(ConfigError::NullByte(name));
    }
    Ok(())
}
