//! Native target: stack IR → x86 assembly
//!
//! 32-bit AT&T syntax. The machine stack doubles as the IR operand stack;
//! `%eax` and `%ecx` hold the operands of one instruction and `%eax` carries
//! return values. Every function gets a `%ebp` frame (see [`frame`]).
//!
//! ## 模块职责
//!
//! - `mod.rs`: per-function lowering
//! - `frame.rs`: `%ebp`-relative storage for locals and parameters
//! - `asm.rs`: output text accumulator

pub mod asm;
pub mod frame;


use crate::backends::error::{CodegenError, CodegenResult, TargetKind};
use crate::backends::x86::asm::{immediate, memory, AsmBuffer};
use crate::backends::x86::frame::{FrameLayout, SLOT_SIZE};
use crate::backends::{check_jump_target, Backend};
use crate::middle::ir::{
    jump_targets, BinaryKind, Callee, FunctionDeclaration, StackProgram, StackStatement, UnaryKind,
    Variable,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Symbol naming convention of the target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    /// System V: symbols as written
    #[default]
    #[serde(alias = "UNIX", alias = "Unix")]
    Unix,
    /// Windows: symbols prefixed with `_`
    #[serde(alias = "WIN", alias = "Win")]
    Win,
}

impl TargetPlatform {
    pub fn format_symbol(
        self,
        name: &str,
    ) -> String {
        match self {
            TargetPlatform::Unix => name.to_string(),
            TargetPlatform::Win => format!("_{name}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetPlatform::Unix => "UNIX",
            TargetPlatform::Win => "WIN",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised platform name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown target platform `{0}` (expected UNIX or WIN)")]
pub struct UnknownPlatform(pub String);

impl FromStr for TargetPlatform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unix") {
            Ok(TargetPlatform::Unix)
        } else if s.eq_ignore_ascii_case("win") {
            Ok(TargetPlatform::Win)
        } else {
            Err(UnknownPlatform(s.to_string()))
        }
    }
}

/// Condition code `set<cc>` uses for a comparison
pub fn condition_code(kind: BinaryKind) -> Option<&'static str> {
    let cc = match kind {
        BinaryKind::Eq => "z",
        BinaryKind::Neq => "nz",
        BinaryKind::Gt => "g",
        BinaryKind::Lt => "l",
        BinaryKind::Leq => "le",
        BinaryKind::Geq => "ge",
        _ => return None,
    };
    Some(cc)
}

/// Function-local label for instruction `index`
pub fn statement_label(
    function: &str,
    index: usize,
) -> String {
    format!("{function}_l{index}")
}

/// x86 assembly backend
#[derive(Debug, Clone, Copy, Default)]
pub struct X86Backend {
    platform: TargetPlatform,
}

impl X86Backend {
    pub fn new(platform: TargetPlatform) -> Self {
        X86Backend { platform }
    }

    pub fn platform(&self) -> TargetPlatform {
        self.platform
    }

    /// Compile every function of `program`, in insertion order
    pub fn compile(
        &self,
        program: &StackProgram,
    ) -> CodegenResult<String> {
        debug!(
            "x86: compiling {} function(s) for {}",
            program.len(),
            self.platform
        );

        self.check_symbols(program)?;

        let mut asm = AsmBuffer::new();
        asm.directive(".text");
        for (declaration, body) in program.functions() {
            FunctionLowering::new(self.platform, program, declaration, body, &mut asm).lower()?;
        }

        debug!("x86: emitted {} line(s)", asm.line_count());
        Ok(asm.finish())
    }
}

impl X86Backend {
    /// 函数符号不能与任何语句标签同名，否则汇编器报重复定义
    fn check_symbols(
        &self,
        program: &StackProgram,
    ) -> CodegenResult<()> {
        let labels: HashSet<String> = program
            .functions()
            .flat_map(|(declaration, body)| {
                (0..=body.len()).map(move |index| statement_label(&declaration.name, index))
            })
            .collect();

        for (declaration, _) in program.functions() {
            let symbol = self.platform.format_symbol(&declaration.name);
            if labels.contains(&symbol) {
                return Err(CodegenError::SymbolClash {
                    function: declaration.name.clone(),
                    symbol,
                });
            }
        }
        Ok(())
    }
}

impl Backend for X86Backend {
    type Source = StackProgram;
    type Output = String;

    fn target(&self) -> TargetKind {
        TargetKind::X86
    }

    fn compile(
        &self,
        source: &Self::Source,
    ) -> CodegenResult<Self::Output> {
        X86Backend::compile(self, source)
    }
}

/// Lowering state for one function
struct FunctionLowering<'a> {
    platform: TargetPlatform,
    program: &'a StackProgram,
    declaration: &'a FunctionDeclaration,
    body: &'a [StackStatement],
    frame: FrameLayout,
    asm: &'a mut AsmBuffer,
}

impl<'a> FunctionLowering<'a> {
    fn new(
        platform: TargetPlatform,
        program: &'a StackProgram,
        declaration: &'a FunctionDeclaration,
        body: &'a [StackStatement],
        asm: &'a mut AsmBuffer,
    ) -> Self {
        FunctionLowering {
            platform,
            program,
            declaration,
            body,
            frame: FrameLayout::new(declaration, body),
            asm,
        }
    }

    fn name(&self) -> &str {
        &self.declaration.name
    }

    fn lower(mut self) -> CodegenResult<()> {
        let symbol = self.platform.format_symbol(self.name());
        debug!(
            "x86: {} ({} statement(s), {} byte(s) of locals)",
            symbol,
            self.body.len(),
            self.frame.locals_size()
        );

        self.asm.directive(&format!(".globl {symbol}"));
        self.asm.label(&symbol);
        self.asm.insn("pushl", &["%ebp"]);
        self.asm.insn("movl", &["%esp", "%ebp"]);
        if self.frame.locals_size() > 0 {
            self.asm
                .insn("subl", &[&immediate(self.frame.locals_size()), "%esp"]);
        }

        let body = self.body;
        for (index, statement) in body.iter().enumerate() {
            let label = statement_label(self.name(), index);
            self.asm.label_with_comment(&label, statement);
            self.lower_statement(index, statement)?;
        }

        // 隐式 ret0：落到末尾或跳到 len 时都需要标准尾声
        let end = statement_label(self.name(), body.len());
        if self.needs_implicit_return() {
            self.asm.label_with_comment(&end, &StackStatement::Ret0);
            self.lower_statement(body.len(), &StackStatement::Ret0)?;
        } else {
            self.asm.label(&end);
        }
        Ok(())
    }

    fn needs_implicit_return(&self) -> bool {
        let len = self.body.len();
        let ends_in_return = self.body.last().is_some_and(StackStatement::is_return);
        !ends_in_return || jump_targets(self.body).any(|(_, target)| target == len)
    }

    fn slot(
        &self,
        variable: &Variable,
    ) -> CodegenResult<String> {
        self.frame
            .offset(variable)
            .map(|offset| memory(offset, "%ebp"))
            .ok_or_else(|| CodegenError::UnresolvedVariable {
                function: self.name().to_string(),
                variable: variable.name().to_string(),
            })
    }

    fn jump_label(
        &self,
        index: usize,
        target: usize,
    ) -> CodegenResult<String> {
        let target = check_jump_target(self.name(), index, target, self.body.len())?;
        Ok(statement_label(self.name(), target))
    }

    fn lower_statement(
        &mut self,
        index: usize,
        statement: &StackStatement,
    ) -> CodegenResult<()> {
        match statement {
            StackStatement::Nop => {}
            StackStatement::Push(c) => self.asm.insn("pushl", &[&immediate(c.value())]),
            StackStatement::Ld(v) => {
                let slot = self.slot(v)?;
                self.asm.insn("pushl", &[&slot]);
            }
            StackStatement::St(v) => {
                let slot = self.slot(v)?;
                self.asm.insn("popl", &[&slot]);
            }
            StackStatement::Unop(UnaryKind::Not) => {
                self.asm.insn("popl", &["%eax"]);
                self.asm.insn("negl", &["%eax"]);
                self.asm.insn("pushl", &["%eax"]);
            }
            StackStatement::Binop(kind) => self.lower_binary(*kind),
            StackStatement::Jmp(target) => {
                let label = self.jump_label(index, *target)?;
                self.asm.insn("jmp", &[&label]);
            }
            StackStatement::Jz(target) => {
                let label = self.jump_label(index, *target)?;
                self.asm.insn("popl", &["%eax"]);
                self.asm.insn("cmpl", &["$0", "%eax"]);
                self.asm.insn("jz", &[&label]);
            }
            StackStatement::Call(callee) => self.lower_call(callee)?,
            StackStatement::Ret0 => {
                self.asm.insn("movl", &["$0", "%eax"]);
                self.asm.insn("leave", &[]);
                self.asm.insn("ret", &[]);
            }
            StackStatement::Ret1 => {
                self.asm.insn("popl", &["%eax"]);
                self.asm.insn("leave", &[]);
                self.asm.insn("ret", &[]);
            }
            StackStatement::Pop => self.asm.insn("popl", &["%eax"]),
            StackStatement::PreArgs => {
                return Err(CodegenError::unsupported(
                    TargetKind::X86,
                    self.name(),
                    index,
                    statement,
                ));
            }
        }
        Ok(())
    }

    /// Right operand in `%ecx`, left in `%eax`
    fn lower_binary(
        &mut self,
        kind: BinaryKind,
    ) {
        self.asm.insn("popl", &["%ecx"]);
        self.asm.insn("popl", &["%eax"]);

        let result = match kind {
            BinaryKind::Plus => self.arith("addl"),
            BinaryKind::Minus => self.arith("subl"),
            BinaryKind::Times => self.arith("imull"),
            BinaryKind::And => self.arith("andl"),
            BinaryKind::Or => self.arith("orl"),
            BinaryKind::Div | BinaryKind::Rem => {
                // sign-extend %eax into %edx:%eax
                self.asm.insn("cltd", &[]);
                self.asm.insn("idivl", &["%ecx"]);
                if kind == BinaryKind::Div {
                    "%eax"
                } else {
                    "%edx"
                }
            }
            BinaryKind::Eq
            | BinaryKind::Neq
            | BinaryKind::Gt
            | BinaryKind::Lt
            | BinaryKind::Leq
            | BinaryKind::Geq => {
                let cc = condition_code(kind).unwrap_or("z");
                self.asm.insn("subl", &["%ecx", "%eax"]);
                self.asm.insn(&format!("set{cc}"), &["%al"]);
                self.asm.insn("andl", &["$1", "%eax"]);
                "%eax"
            }
        };

        self.asm.insn("pushl", &[result]);
    }

    fn arith(
        &mut self,
        mnemonic: &str,
    ) -> &'static str {
        self.asm.insn(mnemonic, &["%ecx", "%eax"]);
        "%eax"
    }

    /// Arguments sit on the stack in declaration order, so the first one is
    /// deepest. Copying them top-down reverses them into cdecl order; the
    /// copies and the originals are both released after the call.
    fn lower_call(
        &mut self,
        callee: &Callee,
    ) -> CodegenResult<()> {
        let target = match callee {
            Callee::Intrinsic(intrinsic) => intrinsic.symbol(),
            Callee::Function(declaration) => {
                self.check_declared(declaration)?;
                declaration.name.as_str()
            }
        };
        let arity = callee.arity() as i32;

        for j in 0..arity {
            self.asm
                .insn("pushl", &[&memory(2 * SLOT_SIZE * j, "%esp")]);
        }
        self.asm
            .insn("call", &[&self.platform.format_symbol(target)]);
        if arity > 0 {
            let width = immediate(SLOT_SIZE * arity);
            self.asm.insn("addl", &[&width, "%esp"]);
            self.asm.insn("addl", &[&width, "%esp"]);
        }
        if callee.returns_value() {
            self.asm.insn("pushl", &["%eax"]);
        }
        Ok(())
    }

    /// The callee must be defined in the program with the same arity
    fn check_declared(
        &self,
        declaration: &FunctionDeclaration,
    ) -> CodegenResult<()> {
        match self.program.function(&declaration.name) {
            Some((found, _)) if found.parameters.len() == declaration.parameters.len() => Ok(()),
            _ => Err(CodegenError::UnresolvedFunction {
                name: declaration.name.clone(),
                arity: declaration.parameters.len(),
            }),
        }
    }
}
