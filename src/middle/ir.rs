//! Stack IR
//!
//! 栈式中间表示：一串作用于隐式操作数栈的指令，外加按名字寻址的变量。
//! Both backends read these values and never mutate them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// IR construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("Duplicate function declaration: {0}")]
    DuplicateFunction(String),
}

/// Named variable. Identity is the name; scope is the enclosing function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variable(String);

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Variable::new(name)
    }
}

/// Integer literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constant(pub i32);

impl Constant {
    pub fn value(self) -> i32 {
        self.0
    }
}

/// Unary operators. `Not` is arithmetic negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryKind {
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryKind {
    Plus,
    Minus,
    Times,
    Div,
    Rem,
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Lt,
    Leq,
    Geq,
}

impl BinaryKind {
    pub const ALL: [BinaryKind; 13] = [
        BinaryKind::Plus,
        BinaryKind::Minus,
        BinaryKind::Times,
        BinaryKind::Div,
        BinaryKind::Rem,
        BinaryKind::And,
        BinaryKind::Or,
        BinaryKind::Eq,
        BinaryKind::Neq,
        BinaryKind::Gt,
        BinaryKind::Lt,
        BinaryKind::Leq,
        BinaryKind::Geq,
    ];

    pub const COMPARISONS: [BinaryKind; 6] = [
        BinaryKind::Eq,
        BinaryKind::Neq,
        BinaryKind::Gt,
        BinaryKind::Lt,
        BinaryKind::Leq,
        BinaryKind::Geq,
    ];

    /// Comparison kinds produce 1 or 0
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryKind::Eq
                | BinaryKind::Neq
                | BinaryKind::Gt
                | BinaryKind::Lt
                | BinaryKind::Leq
                | BinaryKind::Geq
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryKind::Plus => "+",
            BinaryKind::Minus => "-",
            BinaryKind::Times => "*",
            BinaryKind::Div => "/",
            BinaryKind::Rem => "%",
            BinaryKind::And => "&",
            BinaryKind::Or => "|",
            BinaryKind::Eq => "==",
            BinaryKind::Neq => "!=",
            BinaryKind::Gt => ">",
            BinaryKind::Lt => "<",
            BinaryKind::Leq => "<=",
            BinaryKind::Geq => ">=",
        }
    }
}

/// Built-in console services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intrinsic {
    /// Reads one line from standard input and pushes it as an integer
    Read,
    /// Pops one integer and prints it on its own line
    Write,
}

impl Intrinsic {
    /// Runtime symbol the native target links against
    pub fn symbol(self) -> &'static str {
        match self {
            Intrinsic::Read => "read",
            Intrinsic::Write => "write",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Intrinsic::Read => 0,
            Intrinsic::Write => 1,
        }
    }

    pub fn returns_value(self) -> bool {
        matches!(self, Intrinsic::Read)
    }
}

/// Function signature: name plus ordered parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Variable>,
}

impl FunctionDeclaration {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Variable>,
    ) -> Self {
        FunctionDeclaration {
            name: name.into(),
            parameters,
        }
    }
}

/// Call target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callee {
    Intrinsic(Intrinsic),
    Function(FunctionDeclaration),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Intrinsic(intrinsic) => intrinsic.symbol(),
            Callee::Function(decl) => &decl.name,
        }
    }

    /// Number of operands the call pops
    pub fn arity(&self) -> usize {
        match self {
            Callee::Intrinsic(intrinsic) => intrinsic.arity(),
            Callee::Function(decl) => decl.parameters.len(),
        }
    }

    /// Whether the call pushes a result
    pub fn returns_value(&self) -> bool {
        match self {
            Callee::Intrinsic(intrinsic) => intrinsic.returns_value(),
            Callee::Function(_) => true,
        }
    }
}

/// One stack IR instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackStatement {
    Nop,
    Push(Constant),
    Ld(Variable),
    St(Variable),
    Unop(UnaryKind),
    Binop(BinaryKind),
    /// Unconditional jump to an index of the same sequence
    Jmp(usize),
    /// Pops one value, jumps if it is zero
    Jz(usize),
    Call(Callee),
    Ret0,
    Ret1,
    Pop,
    /// Reserved; no backend lowers it
    PreArgs,
}

impl StackStatement {
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            StackStatement::Jmp(target) | StackStatement::Jz(target) => Some(*target),
            _ => None,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, StackStatement::Ret0 | StackStatement::Ret1)
    }
}

impl fmt::Display for StackStatement {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            StackStatement::Nop => write!(f, "nop"),
            StackStatement::Push(c) => write!(f, "push {}", c.0),
            StackStatement::Ld(v) => write!(f, "ld {}", v),
            StackStatement::St(v) => write!(f, "st {}", v),
            StackStatement::Unop(UnaryKind::Not) => write!(f, "unop -"),
            StackStatement::Binop(kind) => write!(f, "binop {}", kind.symbol()),
            StackStatement::Jmp(target) => write!(f, "jmp {}", target),
            StackStatement::Jz(target) => write!(f, "jz {}", target),
            StackStatement::Call(callee) => write!(f, "call {}", callee.name()),
            StackStatement::Ret0 => write!(f, "ret0"),
            StackStatement::Ret1 => write!(f, "ret1"),
            StackStatement::Pop => write!(f, "pop"),
            StackStatement::PreArgs => write!(f, "preargs"),
        }
    }
}

/// Every jump target in `body`, in statement order
pub fn jump_targets(body: &[StackStatement]) -> impl Iterator<Item = (usize, usize)> + '_ {
    body.iter()
        .enumerate()
        .filter_map(|(index, s)| s.jump_target().map(|target| (index, target)))
}

/// Serialized form of one program entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub declaration: FunctionDeclaration,
    pub body: Vec<StackStatement>,
}

/// Whole program: function declarations mapped to their bodies, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FunctionDefinition>", into = "Vec<FunctionDefinition>")]
pub struct StackProgram {
    functions: IndexMap<FunctionDeclaration, Vec<StackStatement>>,
}

impl StackProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function. Names must be unique within a program.
    pub fn add_function(
        &mut self,
        declaration: FunctionDeclaration,
        body: Vec<StackStatement>,
    ) -> Result<(), IrError> {
        if self.function(&declaration.name).is_some() {
            return Err(IrError::DuplicateFunction(declaration.name));
        }
        self.functions.insert(declaration, body);
        Ok(())
    }

    /// Builder form of [`StackProgram::add_function`]
    pub fn with_function(
        mut self,
        declaration: FunctionDeclaration,
        body: Vec<StackStatement>,
    ) -> Result<Self, IrError> {
        self.add_function(declaration, body)?;
        Ok(self)
    }

    /// Single-function program named `main` without parameters
    pub fn from_main(body: Vec<StackStatement>) -> Self {
        let mut functions = IndexMap::new();
        functions.insert(FunctionDeclaration::new("main", Vec::new()), body);
        StackProgram { functions }
    }

    pub fn functions(&self) -> impl Iterator<Item = (&FunctionDeclaration, &[StackStatement])> {
        self.functions
            .iter()
            .map(|(decl, body)| (decl, body.as_slice()))
    }

    pub fn function(
        &self,
        name: &str,
    ) -> Option<(&FunctionDeclaration, &[StackStatement])> {
        self.functions()
            .find(|(decl, _)| decl.name == name)
    }

    /// `main`, or the only function of a one-function program
    pub fn entry(&self) -> Option<(&FunctionDeclaration, &[StackStatement])> {
        self.function("main").or_else(|| {
            if self.functions.len() == 1 {
                self.functions().next()
            } else {
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl TryFrom<Vec<FunctionDefinition>> for StackProgram {
    type Error = IrError;

    fn try_from(definitions: Vec<FunctionDefinition>) -> Result<Self, Self::Error> {
        let mut program = StackProgram::new();
        for def in definitions {
            program.add_function(def.declaration, def.body)?;
        }
        Ok(program)
    }
}

impl From<StackProgram> for Vec<FunctionDefinition> {
    fn from(program: StackProgram) -> Self {
        program
            .functions
            .into_iter()
            .map(|(declaration, body)| FunctionDefinition { declaration, body })
            .collect()
    }
}
