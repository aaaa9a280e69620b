//! Runs artifacts on the real toolchains. Ignored by default:
//!
//! ```bash
//! cargo test --test integration toolchain -- --ignored
//! ```
//!
//! Needs `java` on PATH, and `gcc` with 32-bit multilib support.

use crate::support::*;
use stackc::backends::{JvmBackend, JvmOptions, X86Backend};
use stackc::middle::{BinaryKind, StackProgram};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

const RUNTIME_C: &str = r#"
#include <stdio.h>

int read(void) {
    int value = 0;
    if (scanf("%d", &value) != 1) {
        return 0;
    }
    return value;
}

void write(int value) {
    printf("%d\n", value);
    fflush(stdout);
}
"#;

fn run_with_input(
    command: &mut Command,
    input: &[i32],
) -> Vec<i32> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn command");
    {
        let mut stdin = child.stdin.take().unwrap();
        for value in input {
            writeln!(stdin, "{}", value).unwrap();
        }
    }
    let output = child.wait_with_output().expect("Failed to collect child output");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| line.trim().parse().unwrap())
        .collect()
}

fn sum_and_sign() -> Vec<stackc::middle::StackStatement> {
    let mut body = sign_routine();
    body.extend([read(), read(), binop(BinaryKind::Plus), write()]);
    body
}

#[test]
#[ignore = "needs a JVM"]
fn test_java_runs_class() {
    let dir = tempfile::tempdir().unwrap();
    let backend = JvmBackend::with_options(JvmOptions {
        class_name: "Sum".to_string(),
        debug_info: true,
    });
    let bytes = backend.compile(&sum_and_sign()).unwrap();
    fs::write(dir.path().join("Sum.class"), bytes).unwrap();

    let output = run_with_input(
        Command::new("java").arg("-cp").arg(dir.path()).arg("Sum"),
        &[-7, 40, 2],
    );
    assert_eq!(output, vec![0, 42]);
}

fn assemble(
    dir: &Path,
    asm: &str,
) -> std::path::PathBuf {
    let source = dir.join("program.s");
    let runtime = dir.join("runtime.c");
    let binary = dir.join("program");
    fs::write(&source, asm).unwrap();
    fs::write(&runtime, RUNTIME_C).unwrap();

    let status = Command::new("gcc")
        .arg("-m32")
        .arg("-no-pie")
        .arg(&source)
        .arg(&runtime)
        .arg("-o")
        .arg(&binary)
        .status()
        .expect("Failed to spawn gcc");
    assert!(status.success(), "gcc failed");
    binary
}

#[test]
#[ignore = "needs gcc -m32"]
fn test_gcc_links_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let asm = X86Backend::default()
        .compile(&StackProgram::from_main(sum_and_sign()))
        .unwrap();
    let binary = assemble(dir.path(), &asm);

    assert_eq!(run_with_input(&mut Command::new(&binary), &[9, 40, 2]), vec![1, 42]);
}
