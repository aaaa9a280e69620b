//! Codegen errors

use std::fmt;
use thiserror::Error;

/// Codegen result
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Which backend raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Jvm,
    X86,
}

impl fmt::Display for TargetKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TargetKind::Jvm => f.write_str("managed"),
            TargetKind::X86 => f.write_str("native"),
        }
    }
}

/// Codegen errors. Any of these aborts the whole compilation call.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Unsupported opcode in {target} target, {function}#{index}: {statement}")]
    Unsupported {
        target: TargetKind,
        function: String,
        index: usize,
        statement: String,
    },

    #[error("Unresolved variable `{variable}` in {function}")]
    UnresolvedVariable { function: String, variable: String },

    #[error("Unresolved jump target {target} at {function}#{index} (sequence length {len})")]
    UnresolvedJumpTarget {
        function: String,
        index: usize,
        target: usize,
        len: usize,
    },

    #[error("Unresolved function `{name}` with {arity} argument(s)")]
    UnresolvedFunction { name: String, arity: usize },

    #[error("Symbol `{symbol}` of function `{function}` collides with a statement label")]
    SymbolClash { function: String, symbol: String },

    #[error("Program has no entry routine")]
    MissingEntry,

    // === Class-file assembly ===
    #[error("Operand stack underflow at code offset {offset}")]
    StackUnderflow { offset: usize },

    #[error("Operand stack height mismatch at code offset {offset}: {expected} vs {found}")]
    StackMismatch {
        offset: usize,
        expected: u16,
        found: u16,
    },

    #[error("Branch offset {offset} does not fit in 16 bits")]
    BranchOutOfRange { offset: i64 },

    #[error("Method body of {len} bytes exceeds the class-file limit")]
    CodeTooLarge { len: usize },

    #[error("Constant pool overflow")]
    ConstantPoolOverflow,

    #[error("Too many local slots: {count}")]
    TooManyLocals { count: usize },

    #[error("Unbound label {0}")]
    UnboundLabel(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    pub fn unsupported(
        target: TargetKind,
        function: &str,
        index: usize,
        statement: &impl fmt::Display,
    ) -> Self {
        CodegenError::Unsupported {
            target,
            function: function.to_string(),
            index,
            statement: statement.to_string(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, CodegenError::Unsupported { .. })
    }
}
