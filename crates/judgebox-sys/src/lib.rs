//! Low-level Linux syscall wrappers for judgebox.
//!
//! This crate provides a small seccomp-BPF toolkit: a filter context that
//! collects allow rules (optionally constrained on syscall arguments), a
//! compiler that lowers those rules to a classic BPF program, and a loader
//! that installs the program into the calling process.
//!
//! ## Seccomp-BPF
//!
//! ```ignore
//! use judgebox_sys::seccomp::{Action, ArgCmp, FilterContext};
//!
//! let mut ctx = FilterContext::new(Action::KillProcess);
//! ctx.allow(libc::SYS_read)?;
//! ctx.allow_if(libc::SYS_openat, ArgCmp::masked_eq(2, 0b11, 0))?;
//! let filter = ctx.compile()?;
//! filter.load()?;
//! ```
//!
//! # Safety
//!
//! This crate contains raw syscall wrappers. Casts between integer types
//! are unavoidable when interfacing with the kernel ABI.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod seccomp;

pub use seccomp::{Action, ArgCmp, CompiledFilter, FilterContext, FilterError};

#[inline]
pub fn last_errno() -> rustix::io::Errno {
    // SAFETY: __errno_location always returns valid thread-local pointer.
    rustix::io::Errno::from_raw_os_error(unsafe { *libc::__errno_location() })
}
