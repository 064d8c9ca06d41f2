//! Stdio redirection, argv and environment.

use judgebox_sandbox::{Config, Outcome, run};

use crate::common::{payload, skip_unless_root};

fn sh(script: &str) -> Config {
    Config::new("/bin/sh").args(["-c", script])
}

#[test]
fn test_stdout_redirect() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");

    let result = run(&sh("echo hello").output_path(&out));

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");
}

#[test]
fn test_stdin_redirect() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("1.in");
    let out = dir.path().join("1.out");
    std::fs::write(&input, "3 4\n").unwrap();

    let result = run(&sh("read a b; echo $((a + b))").input_path(&input).output_path(&out));

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "7\n");
}

/// Same path for stdout and stderr: both streams end up in the file.
#[test]
fn test_shared_output_and_error() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let both = dir.path().join("both.txt");

    let result = run(&sh("echo out; echo err >&2").output_path(&both).error_path(&both));

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&both).unwrap(), "out\nerr\n");
}

#[test]
fn test_separate_error_file() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let err = dir.path().join("err.txt");

    let result = run(&sh("echo out; echo err >&2").output_path(&out).error_path(&err));

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "out\n");
    assert_eq!(std::fs::read_to_string(&err).unwrap(), "err\n");
}

/// Only configured variables reach the child.
#[test]
fn test_environment_not_inherited() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("env.txt");

    let result = run(
        &sh("echo \"$JUDGE_VAR:$CARGO_MANIFEST_DIR\"")
            .env("JUDGE_VAR", "42")
            .output_path(&out),
    );

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "42:\n");
}

#[test]
fn test_args_passed() {
    if skip_unless_root() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("args.txt");

    let result = run(
        &Config::new("/bin/sh")
            .args(["-c", "echo \"$0 $1\"", "first", "second"])
            .output_path(&out),
    );

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "first second\n");
}

/// An output path that cannot be created fails the bootstrap.
#[test]
fn test_unwritable_output_is_system_error() {
    if skip_unless_root() {
        return;
    }
    let result = run(&sh("echo hi").output_path("/nonexistent/dir/out.txt"));

    assert_eq!(result.outcome, Outcome::SystemError);
}

#[test]
#[ignore]
fn test_payload_echo_io() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let out = dir.path().join("out.txt");
    let err = dir.path().join("err.txt");
    std::fs::write(&input, "judge me\n").unwrap();

    let result = run(
        &Config::new(payload("echo_io"))
            .input_path(&input)
            .output_path(&out)
            .error_path(&err),
    );

    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "judge me\n");
    assert_eq!(std::fs::read_to_string(&err).unwrap(), "stderr line\n");
}
