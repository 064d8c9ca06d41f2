//! Resource limit tests.
//!
//! These tests verify that the rlimits are applied in the child and that the
//! supervisor judges their violations correctly.

use judgebox_sandbox::{Config, Limit, Outcome, run};

use crate::common::{SIGSEGV, payload, skip_unless_root};

const MIB: u64 = 1024 * 1024;

/// Writing past `max_output_size` is stopped by `RLIMIT_FSIZE`.
#[test]
fn test_output_size_limit() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");

    let result = run(
        &Config::new("/bin/sh")
            .args(["-c", "yes | head -c 100000"])
            .output_path(&out)
            .max_output_size(Limit::Max(1024)),
    );

    assert_eq!(result.outcome, Outcome::RuntimeError);
    let written = std::fs::metadata(&out).unwrap().len();
    assert!(written <= 1024, "wrote {written} bytes past the limit");
}

#[test]
#[ignore]
fn test_memory_within_limit() {
    let result = run(
        &Config::new(payload("mem"))
            .arg("8")
            .max_memory(Limit::Max(64 * MIB)),
    );

    assert_eq!(result.outcome, Outcome::Success);
    assert!(result.memory >= 8 * MIB);
}

/// Touching more than the limit is judged on peak RSS.
#[test]
#[ignore]
fn test_memory_limit_exceeded() {
    let result = run(
        &Config::new(payload("mem"))
            .arg("200")
            .max_memory(Limit::Max(64 * MIB)),
    );

    assert_eq!(result.outcome, Outcome::MemoryLimitExceeded);
    assert!(result.memory > 64 * MIB);
}

/// Without the address space cap the program runs to completion, then gets
/// judged on what it used.
#[test]
#[ignore]
fn test_memory_limit_check_only() {
    let result = run(
        &Config::new(payload("mem"))
            .arg("300")
            .max_memory(Limit::Max(64 * MIB))
            .memory_limit_check_only(true),
    );

    assert_eq!(result.outcome, Outcome::MemoryLimitExceeded);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.signal, 0);
    assert!(result.memory > 256 * MIB, "peak was {} bytes", result.memory);
}

#[test]
#[ignore]
fn test_cpu_limit_busy_loop() {
    let result = run(
        &Config::new(payload("busy"))
            .max_cpu_time(Limit::Max(500))
            .max_real_time(Limit::Max(10_000)),
    );

    assert_eq!(result.outcome, Outcome::CpuTimeLimitExceeded);
    assert!(result.cpu_time > 500);
}

/// Wall-clock limit wins when the process never uses enough CPU.
#[test]
#[ignore]
fn test_real_time_beats_cpu_when_idle() {
    let result = run(
        &Config::new("/bin/sleep")
            .arg("5")
            .max_cpu_time(Limit::Max(1000))
            .max_real_time(Limit::Max(300)),
    );

    assert_eq!(result.outcome, Outcome::RealTimeLimitExceeded);
}

/// A stack overflow is a runtime error, not a memory verdict.
#[test]
#[ignore]
fn test_stack_overflow() {
    let result = run(
        &Config::new(payload("stack"))
            .max_stack(MIB)
            .max_memory(Limit::Max(256 * MIB)),
    );

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.signal, SIGSEGV);
}

#[test]
#[ignore]
fn test_segv_payload() {
    let result = run(&Config::new(payload("segv")).max_memory(Limit::Max(64 * MIB)));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.signal, SIGSEGV);
}

/// A child that stops itself is reported and then cleaned up.
#[test]
#[ignore]
fn test_stopped_child() {
    let result = run(&Config::new(payload("sigstop")).max_real_time(Limit::Max(5000)));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.exit_code, libc::SIGSTOP);
    assert_eq!(result.signal, 0);
}

#[test]
#[ignore]
fn test_exit_code_payload() {
    let result = run(&Config::new(payload("exit_code")).arg("42"));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.exit_code, 42);
}
