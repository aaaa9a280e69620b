//! Managed target: stack IR → JVM class file
//!
//! ## 模块职责
//!
//! - `mod.rs`: lowering of one flat instruction sequence into `main`
//! - `opcode.rs`: JVM opcode subset
//! - `emitter.rs`: symbolic code buffer, branch backfill, `max_stack`
//! - `buffer.rs`: constant pool
//! - `classfile.rs`: class-file layout and serialization
//!
//! The whole program becomes one `public static void main(String[])`. Slot 0
//! holds `args`, slot 1 a `BufferedReader` over `System.in` opened once at
//! entry, and every IR variable gets its own `int` slot from 2 upward.

pub mod buffer;
pub mod classfile;
pub mod emitter;
pub mod opcode;


use crate::backends::error::{CodegenError, CodegenResult, TargetKind};
use crate::backends::jvm::buffer::ConstantPool;
use crate::backends::jvm::classfile::{ClassFile, ACC_PUBLIC, ACC_STATIC};
use crate::backends::jvm::emitter::{CodeBuilder, Insn, Label, MethodCode};
use crate::backends::jvm::opcode::Opcode;
use crate::backends::{check_jump_target, Backend};
use crate::middle::ir::{BinaryKind, Callee, Intrinsic, StackStatement, UnaryKind, Variable};
use crate::middle::scope::collect_variables;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

const OBJECT: &str = "java/lang/Object";
const SYSTEM: &str = "java/lang/System";
const INTEGER: &str = "java/lang/Integer";
const PRINT_STREAM: &str = "java/io/PrintStream";
const INPUT_STREAM_READER: &str = "java/io/InputStreamReader";
const BUFFERED_READER: &str = "java/io/BufferedReader";

const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// `String[] args`
pub const ARGS_SLOT: u16 = 0;
/// Console reader opened at entry
pub const INPUT_SLOT: u16 = 1;
/// First slot handed to IR variables
pub const FIRST_VARIABLE_SLOT: u16 = 2;

/// Name the routine carries in diagnostics
const ROUTINE: &str = "main";

/// Managed backend options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmOptions {
    /// Internal name of the generated class
    pub class_name: String,
    /// Emit a `LocalVariableTable`
    pub debug_info: bool,
}

impl Default for JvmOptions {
    fn default() -> Self {
        JvmOptions {
            class_name: "Program".to_string(),
            debug_info: true,
        }
    }
}

/// JVM class-file backend
#[derive(Debug, Clone, Default)]
pub struct JvmBackend {
    options: JvmOptions,
}

impl JvmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: JvmOptions) -> Self {
        JvmBackend { options }
    }

    pub fn options(&self) -> &JvmOptions {
        &self.options
    }

    /// Compile to class-file bytes
    pub fn compile(
        &self,
        source: &[StackStatement],
    ) -> CodegenResult<Vec<u8>> {
        self.compile_class(source)?.to_bytes()
    }

    /// Compile to an in-memory class file
    pub fn compile_class(
        &self,
        source: &[StackStatement],
    ) -> CodegenResult<ClassFile> {
        debug!(
            "jvm: compiling {} statement(s) into class {}",
            source.len(),
            self.options.class_name
        );

        let mut class = ClassFile::new(&self.options.class_name, OBJECT)?;

        let constructor = lower_constructor(&mut class.constant_pool)?;
        class.add_method(ACC_PUBLIC, "<init>", "()V", constructor, 1, &[])?;

        let slots = allocate_slots(source)?;
        let max_locals = FIRST_VARIABLE_SLOT + slots.len() as u16;
        let method = MainLowering::new(&mut class.constant_pool, &slots, source.len()).lower(source)?;
        debug!(
            "jvm: main uses {} byte(s) of code, max_stack {}, max_locals {}",
            method.code.len(),
            method.max_stack,
            max_locals
        );

        let debug_entries = if self.options.debug_info {
            debug_locals(&slots)
        } else {
            Vec::new()
        };
        class.add_method(
            ACC_PUBLIC | ACC_STATIC,
            "main",
            MAIN_DESCRIPTOR,
            method,
            max_locals,
            &debug_entries,
        )?;

        Ok(class)
    }
}

impl Backend for JvmBackend {
    type Source = [StackStatement];
    type Output = Vec<u8>;

    fn target(&self) -> TargetKind {
        TargetKind::Jvm
    }

    fn compile(
        &self,
        source: &Self::Source,
    ) -> CodegenResult<Self::Output> {
        JvmBackend::compile(self, source)
    }
}

/// One slot per distinct variable, in scope order, starting past the reserved slots
pub fn allocate_slots(source: &[StackStatement]) -> CodegenResult<IndexMap<Variable, u16>> {
    let variables = collect_variables(source);
    let count = FIRST_VARIABLE_SLOT as usize + variables.len();
    if count > u16::MAX as usize {
        return Err(CodegenError::TooManyLocals { count });
    }
    Ok(variables
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, FIRST_VARIABLE_SLOT + i as u16))
        .collect())
}

/// Branch taken when a comparison does NOT hold
pub fn otherwise_branch(kind: BinaryKind) -> Option<Opcode> {
    let op = match kind {
        BinaryKind::Eq => Opcode::IfIcmpne,
        BinaryKind::Neq => Opcode::IfIcmpeq,
        BinaryKind::Gt => Opcode::IfIcmple,
        BinaryKind::Lt => Opcode::IfIcmpge,
        BinaryKind::Geq => Opcode::IfIcmplt,
        BinaryKind::Leq => Opcode::IfIcmpgt,
        _ => return None,
    };
    Some(op)
}

/// `(name, descriptor, slot)` for the debug table. Names that are not legal
/// JVM identifiers, or that clash with the reserved slots, are left out.
fn debug_locals(slots: &IndexMap<Variable, u16>) -> Vec<(&str, &str, u16)> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries = vec![
        ("args", "[Ljava/lang/String;", ARGS_SLOT),
        ("input", "Ljava/io/BufferedReader;", INPUT_SLOT),
    ];
    seen.extend(["args", "input"]);
    for (variable, &slot) in slots {
        let name = variable.name();
        if is_unqualified_name(name) && seen.insert(name) {
            entries.push((name, "I", slot));
        }
    }
    entries
}

fn is_unqualified_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', ';', '[', '/'])
}

/// `Object.<init>` passthrough
fn lower_constructor(pool: &mut ConstantPool) -> CodegenResult<MethodCode> {
    let object_init = pool.method_ref(OBJECT, "<init>", "()V")?;
    let mut builder = CodeBuilder::new();
    builder.local(Opcode::Aload, 0);
    builder.member(Opcode::Invokespecial, object_init, 1, 0);
    builder.op(Opcode::Return);
    builder.assemble()
}

/// Per-call lowering state for `main`
struct MainLowering<'a> {
    pool: &'a mut ConstantPool,
    slots: &'a IndexMap<Variable, u16>,
    builder: CodeBuilder,
    /// One label per IR index plus the end sentinel
    labels: Vec<Label>,
}

impl<'a> MainLowering<'a> {
    fn new(
        pool: &'a mut ConstantPool,
        slots: &'a IndexMap<Variable, u16>,
        len: usize,
    ) -> Self {
        let mut builder = CodeBuilder::new();
        let labels = (0..=len).map(|_| builder.new_label()).collect();
        MainLowering {
            pool,
            slots,
            builder,
            labels,
        }
    }

    fn lower(
        mut self,
        source: &[StackStatement],
    ) -> CodegenResult<MethodCode> {
        self.open_input()?;
        self.zero_variables();

        for (index, statement) in source.iter().enumerate() {
            self.builder.bind(self.labels[index]);
            self.lower_statement(index, statement)?;
        }

        self.builder.bind(self.labels[source.len()]);
        self.builder.op(Opcode::Return);
        self.builder.assemble()
    }

    /// `input = new BufferedReader(new InputStreamReader(System.in))`
    fn open_input(&mut self) -> CodegenResult<()> {
        let reader_class = self.pool.class(BUFFERED_READER)?;
        let stream_reader_class = self.pool.class(INPUT_STREAM_READER)?;
        let system_in = self.pool.field_ref(SYSTEM, "in", "Ljava/io/InputStream;")?;
        let stream_reader_init =
            self.pool
                .method_ref(INPUT_STREAM_READER, "<init>", "(Ljava/io/InputStream;)V")?;
        let reader_init = self
            .pool
            .method_ref(BUFFERED_READER, "<init>", "(Ljava/io/Reader;)V")?;

        self.builder.emit(Insn::Short(Opcode::New, reader_class));
        self.builder.op(Opcode::Dup);
        self.builder.emit(Insn::Short(Opcode::New, stream_reader_class));
        self.builder.op(Opcode::Dup);
        self.builder.member(Opcode::Getstatic, system_in, 0, 1);
        self.builder.member(Opcode::Invokespecial, stream_reader_init, 2, 0);
        self.builder.member(Opcode::Invokespecial, reader_init, 2, 0);
        self.builder.local(Opcode::Astore, INPUT_SLOT);
        Ok(())
    }

    /// The verifier rejects reads of never-written slots
    fn zero_variables(&mut self) {
        for &slot in self.slots.values() {
            self.builder.op(Opcode::Iconst0);
            self.builder.local(Opcode::Istore, slot);
        }
    }

    fn slot(
        &self,
        variable: &Variable,
    ) -> CodegenResult<u16> {
        self.slots
            .get(variable)
            .copied()
            .ok_or_else(|| CodegenError::UnresolvedVariable {
                function: ROUTINE.to_string(),
                variable: variable.name().to_string(),
            })
    }

    fn label(
        &self,
        index: usize,
        target: usize,
    ) -> CodegenResult<Label> {
        let len = self.labels.len() - 1;
        let target = check_jump_target(ROUTINE, index, target, len)?;
        Ok(self.labels[target])
    }

    fn push_int(
        &mut self,
        value: i32,
    ) -> CodegenResult<()> {
        if let Some(op) = Opcode::iconst(value) {
            self.builder.op(op);
        } else if let Ok(byte) = i8::try_from(value) {
            self.builder.emit(Insn::Byte(Opcode::Bipush, byte as u8));
        } else if let Ok(short) = i16::try_from(value) {
            self.builder.emit(Insn::Short(Opcode::Sipush, short as u16));
        } else {
            let index = self.pool.integer(value)?;
            match u8::try_from(index) {
                Ok(index) => self.builder.emit(Insn::Byte(Opcode::Ldc, index)),
                Err(_) => self.builder.emit(Insn::Short(Opcode::LdcW, index)),
            }
        }
        Ok(())
    }

    fn lower_statement(
        &mut self,
        index: usize,
        statement: &StackStatement,
    ) -> CodegenResult<()> {
        match statement {
            StackStatement::Nop => self.builder.op(Opcode::Nop),
            StackStatement::Push(c) => self.push_int(c.value())?,
            StackStatement::Ld(v) => {
                let slot = self.slot(v)?;
                self.builder.local(Opcode::Iload, slot);
            }
            StackStatement::St(v) => {
                let slot = self.slot(v)?;
                self.builder.local(Opcode::Istore, slot);
            }
            StackStatement::Unop(UnaryKind::Not) => self.builder.op(Opcode::Ineg),
            StackStatement::Binop(kind) => self.lower_binary(*kind),
            StackStatement::Jmp(target) => {
                let label = self.label(index, *target)?;
                self.builder.jump(Opcode::Goto, label);
            }
            StackStatement::Jz(target) => {
                let label = self.label(index, *target)?;
                self.builder.op(Opcode::Iconst0);
                self.builder.jump(Opcode::IfIcmpeq, label);
            }
            StackStatement::Call(Callee::Intrinsic(Intrinsic::Read)) => {
                let read_line =
                    self.pool
                        .method_ref(BUFFERED_READER, "readLine", "()Ljava/lang/String;")?;
                let parse_int = self
                    .pool
                    .method_ref(INTEGER, "parseInt", "(Ljava/lang/String;)I")?;
                self.builder.local(Opcode::Aload, INPUT_SLOT);
                self.builder.member(Opcode::Invokevirtual, read_line, 1, 1);
                self.builder.member(Opcode::Invokestatic, parse_int, 1, 1);
            }
            StackStatement::Call(Callee::Intrinsic(Intrinsic::Write)) => {
                let out = self
                    .pool
                    .field_ref(SYSTEM, "out", "Ljava/io/PrintStream;")?;
                let println = self.pool.method_ref(PRINT_STREAM, "println", "(I)V")?;
                self.builder.member(Opcode::Getstatic, out, 0, 1);
                self.builder.op(Opcode::Swap);
                self.builder.member(Opcode::Invokevirtual, println, 2, 0);
            }
            StackStatement::Pop => self.builder.op(Opcode::Pop),
            StackStatement::Call(Callee::Function(_))
            | StackStatement::Ret0
            | StackStatement::Ret1
            | StackStatement::PreArgs => {
                return Err(CodegenError::unsupported(
                    TargetKind::Jvm,
                    ROUTINE,
                    index,
                    statement,
                ));
            }
        }
        Ok(())
    }

    fn lower_binary(
        &mut self,
        kind: BinaryKind,
    ) {
        let op = match kind {
            BinaryKind::Plus => Opcode::Iadd,
            BinaryKind::Minus => Opcode::Isub,
            BinaryKind::Times => Opcode::Imul,
            BinaryKind::Div => Opcode::Idiv,
            BinaryKind::Rem => Opcode::Irem,
            BinaryKind::And => Opcode::Iand,
            BinaryKind::Or => Opcode::Ior,
            BinaryKind::Eq
            | BinaryKind::Neq
            | BinaryKind::Gt
            | BinaryKind::Lt
            | BinaryKind::Leq
            | BinaryKind::Geq => {
                self.lower_comparison(kind);
                return;
            }
        };
        self.builder.op(op);
    }

    /// Branch on the negated condition, materialise 1 or 0
    fn lower_comparison(
        &mut self,
        kind: BinaryKind,
    ) {
        let Some(branch) = otherwise_branch(kind) else {
            return;
        };
        let otherwise = self.builder.new_label();
        let after = self.builder.new_label();
        self.builder.jump(branch, otherwise);
        self.builder.op(Opcode::Iconst1);
        self.builder.jump(Opcode::Goto, after);
        self.builder.bind(otherwise);
        self.builder.op(Opcode::Iconst0);
        self.builder.bind(after);
    }
}
