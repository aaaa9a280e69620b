//! Reference stack machine
//!
//! 直接解释执行栈式 IR，用作两个后端的语义基准。
//!
//! Arithmetic is 32-bit two's complement with wrapping, matching both targets.
//! Reading a variable that was never stored yields 0.

use crate::middle::ir::{
    BinaryKind, Callee, Intrinsic, StackProgram, StackStatement, UnaryKind, Variable,
};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::trace;

/// Interpreter result
pub type InterpResult<T> = Result<T, InterpError>;

/// Interpreter errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("Stack underflow in {function} at #{index}")]
    StackUnderflow { function: String, index: usize },

    #[error("Division by zero in {function} at #{index}")]
    DivisionByZero { function: String, index: usize },

    #[error("Input exhausted")]
    InputExhausted,

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Jump target {target} out of range in {function}")]
    JumpOutOfRange { function: String, target: usize },

    #[error("Unsupported opcode in {function} at #{index}: {statement}")]
    Unsupported {
        function: String,
        index: usize,
        statement: String,
    },

    #[error("Call depth limit ({0}) exceeded")]
    CallDepthExceeded(usize),

    #[error("Step limit ({0}) exceeded")]
    StepLimitExceeded(u64),
}

/// Execution limits
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    pub max_call_depth: usize,
    pub max_steps: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            max_call_depth: 1024,
            max_steps: 10_000_000,
        }
    }
}

/// Stack IR interpreter over one program
#[derive(Debug)]
pub struct StackMachine<'p> {
    program: &'p StackProgram,
    config: MachineConfig,
    input: VecDeque<i32>,
    output: Vec<i32>,
    steps: u64,
}

impl<'p> StackMachine<'p> {
    pub fn new(program: &'p StackProgram) -> Self {
        StackMachine {
            program,
            config: MachineConfig::default(),
            input: VecDeque::new(),
            output: Vec::new(),
            steps: 0,
        }
    }

    pub fn with_config(
        mut self,
        config: MachineConfig,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn with_input(
        mut self,
        input: impl IntoIterator<Item = i32>,
    ) -> Self {
        self.input.extend(input);
        self
    }

    /// Values written so far
    pub fn output(&self) -> &[i32] {
        &self.output
    }

    pub fn into_output(self) -> Vec<i32> {
        self.output
    }

    /// Run the program entry (`main`, or the single function) with no arguments
    pub fn run_entry(&mut self) -> InterpResult<i32> {
        let program = self.program;
        let (decl, body) = program
            .entry()
            .ok_or_else(|| InterpError::UnknownFunction("main".to_string()))?;
        self.execute(&decl.name, &decl.parameters, body, Vec::new(), 0)
    }

    /// Run a flat sequence that is not part of the program
    pub fn run_routine(
        &mut self,
        body: &[StackStatement],
    ) -> InterpResult<i32> {
        self.execute("main", &[], body, Vec::new(), 0)
    }

    fn execute(
        &mut self,
        function: &str,
        parameters: &[Variable],
        body: &[StackStatement],
        args: Vec<i32>,
        depth: usize,
    ) -> InterpResult<i32> {
        if depth >= self.config.max_call_depth {
            return Err(InterpError::CallDepthExceeded(self.config.max_call_depth));
        }
        trace!("enter {} (depth {})", function, depth);

        let mut locals: HashMap<&Variable, i32> = parameters.iter().zip(args).collect();
        let mut stack: Vec<i32> = Vec::new();
        let mut pc = 0;

        while pc < body.len() {
            self.steps += 1;
            if self.steps > self.config.max_steps {
                return Err(InterpError::StepLimitExceeded(self.config.max_steps));
            }

            let index = pc;
            let underflow = || InterpError::StackUnderflow {
                function: function.to_string(),
                index,
            };
            pc += 1;

            match &body[index] {
                StackStatement::Nop => {}
                StackStatement::Push(c) => stack.push(c.value()),
                StackStatement::Ld(v) => stack.push(locals.get(v).copied().unwrap_or(0)),
                StackStatement::St(v) => {
                    let value = stack.pop().ok_or_else(underflow)?;
                    locals.insert(v, value);
                }
                StackStatement::Unop(UnaryKind::Not) => {
                    let value = stack.pop().ok_or_else(underflow)?;
                    stack.push(value.wrapping_neg());
                }
                StackStatement::Binop(kind) => {
                    let right = stack.pop().ok_or_else(underflow)?;
                    let left = stack.pop().ok_or_else(underflow)?;
                    let result = eval_binary(*kind, left, right).ok_or_else(|| {
                        InterpError::DivisionByZero {
                            function: function.to_string(),
                            index,
                        }
                    })?;
                    stack.push(result);
                }
                StackStatement::Jmp(target) => {
                    pc = self.checked_target(function, body, *target)?;
                }
                StackStatement::Jz(target) => {
                    let value = stack.pop().ok_or_else(underflow)?;
                    let target = self.checked_target(function, body, *target)?;
                    if value == 0 {
                        pc = target;
                    }
                }
                StackStatement::Call(callee) => {
                    let arity = callee.arity();
                    if stack.len() < arity {
                        return Err(underflow());
                    }
                    let args = stack.split_off(stack.len() - arity);
                    match callee {
                        Callee::Intrinsic(Intrinsic::Read) => {
                            let value = self.input.pop_front().ok_or(InterpError::InputExhausted)?;
                            stack.push(value);
                        }
                        Callee::Intrinsic(Intrinsic::Write) => self.output.extend(args),
                        Callee::Function(decl) => {
                            let program = self.program;
                            let (callee_decl, callee_body) = program
                                .function(&decl.name)
                                .filter(|(d, _)| d.parameters.len() == arity)
                                .ok_or_else(|| InterpError::UnknownFunction(decl.name.clone()))?;
                            let result = self.execute(
                                &callee_decl.name,
                                &callee_decl.parameters,
                                callee_body,
                                args,
                                depth + 1,
                            )?;
                            stack.push(result);
                        }
                    }
                }
                StackStatement::Ret0 => return Ok(0),
                StackStatement::Ret1 => return stack.pop().ok_or_else(underflow),
                StackStatement::Pop => {
                    stack.pop().ok_or_else(underflow)?;
                }
                StackStatement::PreArgs => {
                    return Err(InterpError::Unsupported {
                        function: function.to_string(),
                        index,
                        statement: body[index].to_string(),
                    })
                }
            }
        }

        trace!("leave {} by falling off the end", function);
        Ok(0)
    }

    fn checked_target(
        &self,
        function: &str,
        body: &[StackStatement],
        target: usize,
    ) -> InterpResult<usize> {
        if target > body.len() {
            return Err(InterpError::JumpOutOfRange {
                function: function.to_string(),
                target,
            });
        }
        Ok(target)
    }
}

/// `None` on division by zero
pub fn eval_binary(
    kind: BinaryKind,
    left: i32,
    right: i32,
) -> Option<i32> {
    let value = match kind {
        BinaryKind::Plus => left.wrapping_add(right),
        BinaryKind::Minus => left.wrapping_sub(right),
        BinaryKind::Times => left.wrapping_mul(right),
        BinaryKind::Div => {
            if right == 0 {
                return None;
            }
            left.wrapping_div(right)
        }
        BinaryKind::Rem => {
            if right == 0 {
                return None;
            }
            left.wrapping_rem(right)
        }
        BinaryKind::And => left & right,
        BinaryKind::Or => left | right,
        BinaryKind::Eq => (left == right) as i32,
        BinaryKind::Neq => (left != right) as i32,
        BinaryKind::Gt => (left > right) as i32,
        BinaryKind::Lt => (left < right) as i32,
        BinaryKind::Leq => (left <= right) as i32,
        BinaryKind::Geq => (left >= right) as i32,
    };
    Some(value)
}

/// Run the program entry with `input` and collect everything it writes
pub fn run_program(
    program: &StackProgram,
    input: &[i32],
) -> InterpResult<Vec<i32>> {
    let mut machine = StackMachine::new(program).with_input(input.iter().copied());
    machine.run_entry()?;
    Ok(machine.into_output())
}

/// Run a flat sequence with `input`, the way the managed target sees it
pub fn run_routine(
    body: &[StackStatement],
    input: &[i32],
) -> InterpResult<Vec<i32>> {
    let program = StackProgram::new();
    let mut machine = StackMachine::new(&program).with_input(input.iter().copied());
    machine.run_routine(body)?;
    Ok(machine.into_output())
}
