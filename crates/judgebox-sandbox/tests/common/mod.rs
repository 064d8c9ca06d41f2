//! Common utilities for sandbox tests.

#![allow(dead_code)]

use std::path::PathBuf;

use judgebox_sandbox::Config;

/// Path of a pre-compiled C payload binary.
///
/// Payloads are compiled by build.rs and stored in `OUT_DIR/payloads/`.
pub fn payload(name: &str) -> PathBuf {
    find_payload(name).unwrap_or_else(|| {
        panic!("Payload '{name}' not found. Run `cargo build -p judgebox-sandbox` first.")
    })
}

/// Find payload in cargo's build directory structure.
fn find_payload(name: &str) -> Option<PathBuf> {
    // 1. Next to the test executable
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|e| e.parent().map(PathBuf::from)) {
        let path = exe_dir.join("payloads").join(name);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Cargo build directory
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let workspace_root = manifest_dir.parent()?.parent()?;

    let target_dirs = std::iter::once(workspace_root.join("target"))
        .chain(std::env::var("CARGO_TARGET_DIR").ok().map(PathBuf::from));

    for target_dir in target_dirs {
        for profile in ["debug", "release"] {
            let Ok(entries) = std::fs::read_dir(target_dir.join(profile).join("build")) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("judgebox-sandbox-")
                {
                    let path = entry.path().join("out").join("payloads").join(name);
                    if path.exists() {
                        return Some(path);
                    }
                }
            }
        }
    }

    None
}

pub fn is_root() -> bool {
    rustix::process::getuid().is_root()
}

/// Returns true (and says so) when the test cannot run without root.
pub fn skip_unless_root() -> bool {
    if is_root() {
        false
    } else {
        eprintln!("Skipping: requires root");
        true
    }
}

/// Config for a payload run under the syscall policy.
///
/// glibc registers rseq at startup, which the policy does not allow.
pub fn filtered(config: Config) -> Config {
    config.env("GLIBC_TUNABLES", "glibc.pthread.rseq=0")
}

/// SIGSYS signal number (seccomp violation).
pub const SIGSYS: i32 = 31;

/// SIGKILL signal number.
pub const SIGKILL: i32 = 9;

/// SIGSEGV signal number.
pub const SIGSEGV: i32 = 11;
