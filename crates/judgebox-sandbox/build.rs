//! Build script for judgebox-sandbox.
//!
//! Compiles the C test programs in `tests/payloads/` into static binaries
//! under `OUT_DIR/payloads`. Integration tests run them as the judged child.
//! A missing compiler only produces a warning; the tests that need a payload
//! are ignored by default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=tests/payloads");

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };
    let payload_dir = out_dir.join("payloads");
    if fs::create_dir_all(&payload_dir).is_err() {
        println!("cargo:warning=Cannot create {}", payload_dir.display());
        return;
    }

    let Ok(entries) = fs::read_dir("tests/payloads") else {
        return;
    };

    for path in entries.flatten().map(|e| e.path()) {
        if path.extension().is_some_and(|e| e == "c") {
            let Some(stem) = path.file_stem() else {
                continue;
            };
            compile_payload(&path, &payload_dir.join(stem));
        }
    }
}

fn compile_payload(source: &Path, output: &Path) {
    let name = source.display();

    // Static first so the payload also runs inside an empty chroot.
    for compiler in ["musl-gcc", "gcc", "cc"] {
        if run_compiler(compiler, &["-static"], source, output) {
            return;
        }
    }

    if run_compiler("cc", &[], source, output) {
        println!("cargo:warning=Compiled payload (dynamic): {name}");
    } else {
        println!("cargo:warning=Failed to compile payload: {name}");
    }
}

fn run_compiler(compiler: &str, extra: &[&str], source: &Path, output: &Path) -> bool {
    Command::new(compiler)
        .args(extra)
        .args(["-O1", "-Wall", "-o"])
        .arg(output)
        .arg(source)
        .status()
        .is_ok_and(|s| s.success())
}
