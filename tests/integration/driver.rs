//! File-level driver: JSON IR in, artifacts out.

use crate::support::jvm_sim;
use crate::support::x86_sim;
use stackc::backends::{CodegenError, TargetPlatform};
use stackc::util::config::{self, StackcConfig};
use stackc::{
    compile, compile_file, default_output_path, load_program, run_file, write_artifact, Artifact,
    OutputFormat,
};
use std::fs;
use std::path::Path;

const SUM_IR: &str = r#"[
    {
        "declaration": { "name": "add", "parameters": ["x", "y"] },
        "body": [{ "Ld": "x" }, { "Ld": "y" }, { "Binop": "Plus" }, "Ret1"]
    },
    {
        "declaration": { "name": "main" },
        "body": [
            { "Call": { "Intrinsic": "READ" } },
            { "Call": { "Intrinsic": "READ" } },
            { "Call": { "Function": { "name": "add", "parameters": ["x", "y"] } } },
            { "Call": { "Intrinsic": "WRITE" } }
        ]
    }
]"#;

const ROUTINE_IR: &str = r#"[
    {
        "declaration": { "name": "main" },
        "body": [
            { "Call": { "Intrinsic": "READ" } },
            { "St": "n" },
            { "Ld": "n" },
            { "Ld": "n" },
            { "Binop": "Times" },
            { "Call": { "Intrinsic": "WRITE" } }
        ]
    }
]"#;

fn write_ir(
    dir: &Path,
    name: &str,
    text: &str,
) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_load_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir(dir.path(), "sum.json", SUM_IR);

    let program = load_program(&path).unwrap();
    assert_eq!(program.len(), 2);
    assert_eq!(program.entry().unwrap().0.name, "main");
}

#[test]
fn test_load_errors_carry_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    let err = load_program(&missing).unwrap_err();
    assert!(err.to_string().contains("missing.json"));

    let broken = write_ir(dir.path(), "broken.json", "[{\"declaration\":");
    let err = load_program(&broken).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse IR"));
}

#[test]
fn test_compile_file_x86() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir(dir.path(), "sum.json", SUM_IR);

    let artifact = compile_file(&path, OutputFormat::X86, &StackcConfig::default()).unwrap();
    let Artifact::Assembly(asm) = &artifact else {
        panic!("expected assembly");
    };
    assert_eq!(artifact.format(), OutputFormat::X86);
    assert_eq!(x86_sim::run_asm(asm, "main", &[20, 22]).unwrap().output, vec![42]);

    let out = default_output_path(&path, OutputFormat::X86, &StackcConfig::default());
    assert_eq!(out, dir.path().join("sum.s"));
    write_artifact(&artifact, &out).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), *asm);
}

#[test]
fn test_platform_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir(dir.path(), "sum.json", SUM_IR);
    let config_path = dir.path().join("stackc.toml");
    fs::write(&config_path, "[native]\nplatform = \"WIN\"\n").unwrap();

    let config = config::load_config(Some(&config_path)).unwrap();
    assert_eq!(config.native.platform, TargetPlatform::Win);

    let artifact = compile_file(&path, OutputFormat::X86, &config).unwrap();
    let text = std::str::from_utf8(artifact.as_bytes()).unwrap();
    assert!(text.contains("call _add"));
    assert_eq!(x86_sim::run_asm(text, "_main", &[1, 2]).unwrap().output, vec![3]);
}

#[test]
fn test_compile_file_jvm() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir(dir.path(), "square.json", ROUTINE_IR);
    let mut config = StackcConfig::default();
    config.managed.class_name = "demo/Square".to_string();

    let artifact = compile_file(&path, OutputFormat::Jvm, &config).unwrap();
    assert_eq!(artifact.format(), OutputFormat::Jvm);
    assert_eq!(jvm_sim::run_class(artifact.as_bytes(), &[-12]).unwrap(), vec![144]);

    let out = default_output_path(&path, OutputFormat::Jvm, &config);
    assert_eq!(out, dir.path().join("Square.class"));
    write_artifact(&artifact, &out).unwrap();
    assert_eq!(&fs::read(&out).unwrap()[0..4], &[0xca, 0xfe, 0xba, 0xbe]);
}

#[test]
fn test_jvm_rejects_multi_function_programs_without_main() {
    let dir = tempfile::tempdir().unwrap();
    let text = SUM_IR.replace("\"main\"", "\"start\"");
    let path = write_ir(dir.path(), "nomain.json", &text);
    let program = load_program(&path).unwrap();

    let err = compile(&program, OutputFormat::Jvm, &StackcConfig::default()).unwrap_err();
    assert!(matches!(err, CodegenError::MissingEntry));
}

#[test]
fn test_jvm_rejects_user_calls() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir(dir.path(), "sum.json", SUM_IR);

    let err = compile_file(&path, OutputFormat::Jvm, &StackcConfig::default()).unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("Failed to compile"));
    assert!(chain.contains("Unsupported opcode in managed target, main#2: call add"));
}

#[test]
fn test_run_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_ir(dir.path(), "sum.json", SUM_IR);
    assert_eq!(run_file(&path, &[5, 6]).unwrap(), vec![11]);

    let err = run_file(&path, &[5]).unwrap_err();
    assert!(format!("{err:#}").contains("Input exhausted"));
}

#[test]
fn test_output_format_names() {
    assert_eq!("jvm".parse::<OutputFormat>().unwrap(), OutputFormat::Jvm);
    assert_eq!("x86".parse::<OutputFormat>().unwrap(), OutputFormat::X86);
    assert!("wasm".parse::<OutputFormat>().is_err());
}
