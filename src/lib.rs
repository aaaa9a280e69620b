//! stackc: a dual-backend code generator for a small stack IR
//!
//! The IR (see [`middle::ir`]) is a linear sequence of instructions over an
//! implicit operand stack plus named variables. Two backends lower it:
//!
//! - [`backends::jvm`]: one flat sequence → a class file with a single
//!   `public static void main(String[])`
//! - [`backends::x86`]: a program of functions → 32-bit AT&T assembly text
//!
//! # Example
//!
//! ```
//! use stackc::backends::X86Backend;
//! use stackc::middle::{BinaryKind, Callee, Constant, Intrinsic, StackProgram, StackStatement};
//!
//! let program = StackProgram::from_main(vec![
//!     StackStatement::Push(Constant(2)),
//!     StackStatement::Push(Constant(3)),
//!     StackStatement::Binop(BinaryKind::Plus),
//!     StackStatement::Call(Callee::Intrinsic(Intrinsic::Write)),
//! ]);
//! let asm = X86Backend::default().compile(&program).unwrap();
//! assert!(asm.starts_with(".text"));
//! ```

#![warn(rust_2018_idioms)]

pub mod backends;
pub mod middle;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};

use crate::backends::{CodegenError, CodegenResult, JvmBackend, X86Backend};
use crate::middle::StackProgram;
use crate::util::config::StackcConfig;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tool name
pub const NAME: &str = "stackc";

/// Which backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// JVM class file
    Jvm,
    /// x86 assembly text
    X86,
}

impl fmt::Display for OutputFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            OutputFormat::Jvm => f.write_str("jvm"),
            OutputFormat::X86 => f.write_str("x86"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jvm" | "class" => Ok(OutputFormat::Jvm),
            "x86" | "asm" => Ok(OutputFormat::X86),
            other => Err(format!("unknown output format `{other}`")),
        }
    }
}

/// Compiled output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Class(Vec<u8>),
    Assembly(String),
}

impl Artifact {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Artifact::Class(bytes) => bytes,
            Artifact::Assembly(text) => text.as_bytes(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            Artifact::Class(_) => OutputFormat::Jvm,
            Artifact::Assembly(_) => OutputFormat::X86,
        }
    }
}

/// Feed `program` to the backend selected by `format`.
///
/// The managed target compiles the entry routine (`main`, or the only
/// function) as one flat sequence.
pub fn compile(
    program: &StackProgram,
    format: OutputFormat,
    config: &StackcConfig,
) -> CodegenResult<Artifact> {
    debug!("compile: {} function(s) to {}", program.len(), format);
    match format {
        OutputFormat::Jvm => {
            let (_, body) = program.entry().ok_or(CodegenError::MissingEntry)?;
            let backend = JvmBackend::with_options(config.managed.jvm_options());
            backend.compile(body).map(Artifact::Class)
        }
        OutputFormat::X86 => {
            let backend = X86Backend::new(config.native.platform);
            backend.compile(program).map(Artifact::Assembly)
        }
    }
}

/// Read a JSON IR file
pub fn load_program(path: &Path) -> Result<StackProgram> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read IR: {}", path.display()))?;
    let program = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse IR: {}", path.display()))?;
    Ok(program)
}

/// Load and compile a JSON IR file
pub fn compile_file(
    path: &Path,
    format: OutputFormat,
    config: &StackcConfig,
) -> Result<Artifact> {
    let program = load_program(path)?;
    let artifact = compile(&program, format, config)
        .with_context(|| format!("Failed to compile {} to {}", path.display(), format))?;
    info!("compiled {} ({} bytes)", path.display(), artifact.as_bytes().len());
    Ok(artifact)
}

/// Where an artifact goes when no output path is given: `Program.class` or
/// `<input>.s` next to the input file
pub fn default_output_path(
    input: &Path,
    format: OutputFormat,
    config: &StackcConfig,
) -> PathBuf {
    match format {
        OutputFormat::Jvm => {
            let class_name = &config.managed.class_name;
            let simple = class_name.rsplit('/').next().unwrap_or(class_name);
            input.with_file_name(format!("{simple}.class"))
        }
        OutputFormat::X86 => input.with_extension("s"),
    }
}

/// Write an artifact to disk
pub fn write_artifact(
    artifact: &Artifact,
    path: &Path,
) -> Result<()> {
    fs::write(path, artifact.as_bytes())
        .with_context(|| format!("Failed to write output: {}", path.display()))?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Run a JSON IR file on the reference interpreter
pub fn run_file(
    path: &Path,
    input: &[i32],
) -> Result<Vec<i32>> {
    let program = load_program(path)?;
    let output = middle::interp::run_program(&program, input)
        .with_context(|| format!("Failed to run: {}", path.display()))?;
    Ok(output)
}
