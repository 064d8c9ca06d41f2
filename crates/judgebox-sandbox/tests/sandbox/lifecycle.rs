//! Supervisor lifecycle tests.
//!
//! These run `/bin/sh` and `/bin/sleep` without a syscall policy and check
//! setup errors, exit classification and the wall-clock watchdog.

use std::time::{Duration, Instant};

use judgebox_sandbox::{Config, Limit, Outcome, SetupError, run};

use crate::common::{SIGKILL, SIGSEGV, is_root, skip_unless_root};

fn sh(script: &str) -> Config {
    Config::new("/bin/sh").args(["-c", script])
}

/// Invalid limits are rejected before any fork; non-root is rejected first.
#[test]
fn test_invalid_config() {
    let result = run(&sh("exit 0").max_cpu_time(Limit::Max(0)));

    let expected = if is_root() {
        SetupError::InvalidConfig
    } else {
        SetupError::RootRequired
    };
    assert_eq!(result.error, Some(expected));
    assert_eq!(result.real_time, 0, "nothing should have run");
}

#[test]
fn test_clean_exit() {
    if skip_unless_root() {
        return;
    }
    let result = run(
        &sh("exit 0")
            .max_cpu_time(Limit::Max(1000))
            .max_real_time(Limit::Max(5000))
            .max_memory(Limit::Max(256 * 1024 * 1024)),
    );

    assert_eq!(result.error, None);
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.signal, 0);
    assert!(result.memory > 0, "peak RSS should be reported");
}

#[test]
fn test_exit_code_is_runtime_error() {
    if skip_unless_root() {
        return;
    }
    let result = run(&sh("exit 3"));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.signal, 0);
}

/// A sleeping child is killed by the watchdog.
#[test]
fn test_real_time_limit() {
    if skip_unless_root() {
        return;
    }
    let start = Instant::now();
    let result = run(&Config::new("/bin/sleep").arg("5").max_real_time(Limit::Max(200)));

    assert_eq!(result.outcome, Outcome::RealTimeLimitExceeded);
    assert_eq!(result.signal, SIGKILL);
    assert!(result.real_time >= 200, "real_time {} < limit", result.real_time);
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "watchdog should kill quickly, took {:?}",
        start.elapsed()
    );
}

/// An early exit with a watchdog armed neither waits for it nor gets killed.
#[test]
fn test_watchdog_cancelled_on_early_exit() {
    if skip_unless_root() {
        return;
    }
    let start = Instant::now();
    let result = run(&sh("exit 0").max_real_time(Limit::Max(10_000)));

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.signal, 0);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_segv_under_memory_limit() {
    if skip_unless_root() {
        return;
    }
    let result = run(&sh("kill -SEGV $$").max_memory(Limit::Max(512 * 1024 * 1024)));

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.signal, SIGSEGV);
}

/// A CPU-bound loop is stopped by RLIMIT_CPU and judged on CPU time.
#[test]
fn test_cpu_time_limit() {
    if skip_unless_root() {
        return;
    }
    let result = run(
        &sh("while :; do :; done")
            .max_cpu_time(Limit::Max(300))
            .max_real_time(Limit::Max(10_000)),
    );

    assert_eq!(result.outcome, Outcome::CpuTimeLimitExceeded);
    assert!(result.cpu_time > 300);
}

/// Failing to exec is a sandbox failure, not the program's fault.
#[test]
fn test_missing_executable() {
    if skip_unless_root() {
        return;
    }
    let result = run(&Config::new("/nonexistent/judgebox-target"));

    assert_eq!(result.error, None);
    assert_eq!(result.outcome, Outcome::SystemError);
    assert_eq!(result.signal, libc::SIGUSR1);
    assert_eq!(result.cpu_time, 0);
    assert_eq!(result.memory, 0);
}

#[test]
fn test_run_log_written() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("judge.log");
    let result = run(&sh("exit 0").log_path(&log));
    assert_eq!(result.outcome, Outcome::Success);

    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("child forked"));
    assert!(text.contains("run finished"));
}

/// Child-side setup failures are logged by the child into the run log.
#[test]
fn test_child_failure_logged() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("judge.log");
    let result = run(&Config::new("/nonexistent/judgebox-target").log_path(&log));
    assert_eq!(result.outcome, Outcome::SystemError);

    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("child setup failed"));
    assert!(text.contains("code=-10 step=access errno=2"));
}
