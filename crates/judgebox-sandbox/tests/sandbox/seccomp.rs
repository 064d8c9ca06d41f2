//! Syscall policy tests.
//!
//! Blocked syscalls should cause the process to be killed with SIGSYS
//! (signal 31).

use judgebox_sandbox::{Config, Outcome, SeccompRule, run};

use crate::common::{SIGSYS, filtered, payload};

fn python_policy(config: Config) -> Config {
    filtered(config).seccomp_rule(SeccompRule::Python)
}

/// Control test: a payload that only exits runs fine under the policy.
#[test]
#[ignore]
fn test_payload_runs_under_policy() {
    let result = run(&python_policy(Config::new(payload("exit_code")).arg("0")));

    assert_eq!(result.outcome, Outcome::Success, "signal {}", result.signal);
    assert_eq!(result.signal, 0);
}

#[test]
#[ignore]
fn test_read_only_open_allowed() {
    let result = run(&python_policy(
        Config::new(payload("open_read")).arg("/etc/passwd"),
    ));

    assert_eq!(result.outcome, Outcome::Success, "signal {}", result.signal);
}

#[test]
#[ignore]
fn test_write_open_blocked() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("escape.txt");
    let result = run(&python_policy(
        Config::new(payload("open_write")).arg(target.to_string_lossy()),
    ));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.signal, SIGSYS);
    assert!(!target.exists(), "file should not have been created");
}

#[test]
#[ignore]
fn test_read_write_open_blocked() {
    let result = run(&python_policy(
        Config::new(payload("open_rdwr")).arg("/etc/passwd"),
    ));

    assert_eq!(result.signal, SIGSYS);
}

/// Only the configured executable may be exec'd.
#[test]
#[ignore]
fn test_exec_other_binary_blocked() {
    let result = run(&python_policy(Config::new(payload("exec_other"))));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.signal, SIGSYS);
}

/// A missing target is caught before the filter, so it is still a system error.
#[test]
#[ignore]
fn test_missing_target_under_policy() {
    let result = run(&python_policy(Config::new("/nonexistent/solution")));

    assert_eq!(result.outcome, Outcome::SystemError);
}
