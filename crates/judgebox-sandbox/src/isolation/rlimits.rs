//! Resource limits for the sandboxed child.
//!
//! Applied in the child between `fork` and `execve`. Limits left as
//! `Unlimited` are not touched, so the child keeps whatever it inherited.
//!
//! ## Limits Applied
//!
//! | Limit | Source | Value |
//! |-------|--------|-------|
//! | `RLIMIT_STACK` | `max_stack` | bytes |
//! | `RLIMIT_AS` | `max_memory` | bytes * 2, skipped if `memory_limit_check_only` |
//! | `RLIMIT_CPU` | `max_cpu_time` | `(ms + 1000) / 1000` seconds |
//! | `RLIMIT_NPROC` | `max_process_number` | count |
//! | `RLIMIT_FSIZE` | `max_output_size` | bytes |
//!
//! ## Note on `RLIMIT_AS`
//!
//! The address space cap is twice the memory limit. Peak RSS is what gets
//! judged, and a tight `RLIMIT_AS` would fail allocations before the usage
//! could be observed above the limit. The kernel CPU limit is rounded up a
//! second for the same reason: the supervisor does the precise comparison.

use judgebox_sys::last_errno;
use rustix::io::Errno;

use crate::config::Config;

/// One `setrlimit` call to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rlimit {
    pub resource: libc::__rlimit_resource_t,
    pub value: u64,
}

/// Compute the limits to apply. Runs in the parent, before `fork`.
pub fn plan_rlimits(config: &Config) -> Vec<Rlimit> {
    let mut limits = vec![Rlimit {
        resource: libc::RLIMIT_STACK,
        value: config.max_stack,
    }];

    if let Some(bytes) = config
        .max_memory
        .as_option()
        .filter(|_| !config.memory_limit_check_only)
    {
        limits.push(Rlimit {
            resource: libc::RLIMIT_AS,
            value: bytes.saturating_mul(2),
        });
    }
    if let Some(ms) = config.max_cpu_time.as_option() {
        limits.push(Rlimit {
            resource: libc::RLIMIT_CPU,
            value: ms.saturating_add(1000) / 1000,
        });
    }
    if let Some(n) = config.max_process_number.as_option() {
        limits.push(Rlimit {
            resource: libc::RLIMIT_NPROC,
            value: n,
        });
    }
    if let Some(bytes) = config.max_output_size.as_option() {
        limits.push(Rlimit {
            resource: libc::RLIMIT_FSIZE,
            value: bytes,
        });
    }
    limits
}

/// Apply precomputed limits. Allocation free.
pub fn apply_rlimits(limits: &[Rlimit]) -> Result<(), Errno> {
    for limit in limits {
        set_rlimit(limit.resource, limit.value)?;
    }
    Ok(())
}

#[inline]
fn set_rlimit(resource: libc::__rlimit_resource_t, limit: u64) -> Result<(), Errno> {
    let rlim = libc::rlimit {
        rlim_cur: limit,
        rlim_max: limit,
    };
    // SAFETY: rlim is valid, resource is a valid constant.
    if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
        Err(last_errno())
    } else {
        Ok(())
    }
}
