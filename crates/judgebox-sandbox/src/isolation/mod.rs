//! Isolation applied to the child before `execve`.
//!
//! - **rlimits** - Kernel resource limits derived from the config
//!
//! The syscall filter lives in [`crate::policy`]; the jail, stdio and
//! identity changes are sequenced by [`crate::child`].

mod rlimits;

pub use rlimits::{Rlimit, apply_rlimits, plan_rlimits};
