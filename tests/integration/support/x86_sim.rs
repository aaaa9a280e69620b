//! Simulator for the x86 subset the native backend emits.
//!
//! Runs AT&T text directly: registers, a word-addressed stack, the
//! comparison flags of the last `subl`/`cmpl`, and `read`/`write` as
//! built-in symbols.

use std::collections::{HashMap, VecDeque};

const STACK_TOP: u32 = 0x0010_0000;
/// Return address that ends the run
const HALT: i32 = -1;
const STEP_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    Parse(String),
    UnknownLabel(String),
    UnknownInstruction(String),
    DivideError,
    InputExhausted,
    StepLimit,
    /// `%esp` differs from its starting value when `main` returns
    Unbalanced { esp: u32 },
}

#[derive(Debug, Clone)]
struct Insn {
    mnemonic: String,
    operands: Vec<String>,
}

/// Result of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub output: Vec<i32>,
    pub exit: i32,
}

#[derive(Debug)]
pub struct X86Sim {
    insns: Vec<Insn>,
    labels: HashMap<String, usize>,
    globals: Vec<String>,
    registers: HashMap<&'static str, i32>,
    memory: HashMap<u32, i32>,
    /// Operands of the last flag-setting instruction: `dst` and `src`
    flags: (i32, i32),
    input: VecDeque<i32>,
    output: Vec<i32>,
}

const REGISTERS: [&str; 6] = ["%eax", "%ecx", "%edx", "%ebx", "%esp", "%ebp"];

impl X86Sim {
    pub fn parse(text: &str) -> Result<Self, SimError> {
        let mut insns = Vec::new();
        let mut labels = HashMap::new();
        let mut globals = Vec::new();

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(symbol) = line.strip_prefix(".globl ") {
                globals.push(symbol.trim().to_string());
                continue;
            }
            if line.starts_with('.') {
                continue;
            }
            if let Some(label) = line.strip_suffix(':') {
                if labels.insert(label.to_string(), insns.len()).is_some() {
                    return Err(SimError::Parse(format!("duplicate label {label}")));
                }
                continue;
            }
            let (mnemonic, rest) = line.split_once(' ').unwrap_or((line, ""));
            let operands = rest
                .split(", ")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            insns.push(Insn {
                mnemonic: mnemonic.to_string(),
                operands,
            });
        }

        let registers = REGISTERS.iter().map(|&r| (r, 0)).collect();
        Ok(X86Sim {
            insns,
            labels,
            globals,
            registers,
            memory: HashMap::new(),
            flags: (0, 0),
            input: VecDeque::new(),
            output: Vec::new(),
        })
    }

    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    /// Call `entry` with no arguments and run until it returns
    pub fn run(
        mut self,
        entry: &str,
        input: &[i32],
    ) -> Result<Run, SimError> {
        self.input = input.iter().copied().collect();
        self.set("%esp", STACK_TOP as i32);
        self.set("%ebp", 0x7777);
        self.push(HALT);
        let mut pc = self.label(entry)?;

        for _ in 0..STEP_LIMIT {
            let insn = self
                .insns
                .get(pc)
                .cloned()
                .ok_or_else(|| SimError::Parse(format!("fell off the end at {pc}")))?;
            pc += 1;

            let ops: Vec<&str> = insn.operands.iter().map(String::as_str).collect();
            match (insn.mnemonic.as_str(), ops.as_slice()) {
                ("pushl", [src]) => {
                    let value = self.read(src)?;
                    self.push(value);
                }
                ("popl", [dst]) => {
                    let value = self.pop();
                    self.write(dst, value)?;
                }
                ("movl", [src, dst]) => {
                    let value = self.read(src)?;
                    self.write(dst, value)?;
                }
                ("addl", [src, dst]) => self.arith(src, dst, i32::wrapping_add)?,
                ("imull", [src, dst]) => self.arith(src, dst, i32::wrapping_mul)?,
                ("andl", [src, dst]) => self.arith(src, dst, |a, b| a & b)?,
                ("orl", [src, dst]) => self.arith(src, dst, |a, b| a | b)?,
                ("subl", [src, dst]) => {
                    self.flags = (self.read(dst)?, self.read(src)?);
                    self.arith(src, dst, i32::wrapping_sub)?;
                }
                ("cmpl", [src, dst]) => self.flags = (self.read(dst)?, self.read(src)?),
                ("negl", [dst]) => {
                    let value = self.read(dst)?;
                    self.write(dst, value.wrapping_neg())?;
                }
                ("cltd", []) => {
                    let eax = self.get("%eax");
                    self.set("%edx", if eax < 0 { -1 } else { 0 });
                }
                ("idivl", [src]) => {
                    let divisor = self.read(src)? as i64;
                    let dividend = ((self.get("%edx") as i64) << 32) | (self.get("%eax") as u32 as i64);
                    if divisor == 0 {
                        return Err(SimError::DivideError);
                    }
                    let quotient = dividend / divisor;
                    let quotient = i32::try_from(quotient).map_err(|_| SimError::DivideError)?;
                    self.set("%eax", quotient);
                    self.set("%edx", (dividend % divisor) as i32);
                }
                (set, ["%al"]) if set.starts_with("set") => {
                    let bit = self.condition(&set[3..])? as i32;
                    let eax = self.get("%eax");
                    self.set("%eax", (eax & !0xff) | bit);
                }
                ("jmp", [target]) => pc = self.label(target)?,
                ("jz", [target]) => {
                    if self.flags.0 == self.flags.1 {
                        pc = self.label(target)?;
                    }
                }
                ("call", [target]) => match builtin(target) {
                    Some("read") => {
                        let value = self.input.pop_front().ok_or(SimError::InputExhausted)?;
                        self.set("%eax", value);
                        self.clobber();
                    }
                    Some(_) => {
                        let value = self.load(self.get("%esp") as u32);
                        self.output.push(value);
                        self.set("%eax", 0);
                        self.clobber();
                    }
                    None => {
                        self.push(pc as i32);
                        pc = self.label(target)?;
                    }
                },
                ("leave", []) => {
                    let ebp = self.get("%ebp");
                    self.set("%esp", ebp);
                    let saved = self.pop();
                    self.set("%ebp", saved);
                }
                ("ret", []) => {
                    let address = self.pop();
                    if address == HALT {
                        let esp = self.get("%esp") as u32;
                        if esp != STACK_TOP {
                            return Err(SimError::Unbalanced { esp });
                        }
                        let exit = self.get("%eax");
                        return Ok(Run {
                            output: self.output,
                            exit,
                        });
                    }
                    pc = address as usize;
                }
                _ => return Err(SimError::UnknownInstruction(format!("{insn:?}"))),
            }
        }
        Err(SimError::StepLimit)
    }

    fn label(
        &self,
        name: &str,
    ) -> Result<usize, SimError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownLabel(name.to_string()))
    }

    fn condition(
        &self,
        cc: &str,
    ) -> Result<bool, SimError> {
        let (a, b) = self.flags;
        Ok(match cc {
            "z" | "e" => a == b,
            "nz" | "ne" => a != b,
            "g" => a > b,
            "l" => a < b,
            "le" => a <= b,
            "ge" => a >= b,
            other => return Err(SimError::UnknownInstruction(format!("set{other}"))),
        })
    }

    fn arith(
        &mut self,
        src: &str,
        dst: &str,
        op: impl Fn(i32, i32) -> i32,
    ) -> Result<(), SimError> {
        let value = op(self.read(dst)?, self.read(src)?);
        self.write(dst, value)
    }

    /// Caller-saved registers hold garbage after a runtime call
    fn clobber(&mut self) {
        self.set("%ecx", 0x5eed);
        self.set("%edx", -0x5eed);
    }

    fn get(
        &self,
        register: &str,
    ) -> i32 {
        self.registers.get(register).copied().unwrap_or(0)
    }

    fn set(
        &mut self,
        register: &str,
        value: i32,
    ) {
        if let Some(slot) = self.registers.get_mut(register) {
            *slot = value;
        }
    }

    fn load(
        &self,
        address: u32,
    ) -> i32 {
        self.memory.get(&address).copied().unwrap_or(0)
    }

    fn push(
        &mut self,
        value: i32,
    ) {
        let esp = (self.get("%esp") as u32).wrapping_sub(4);
        self.set("%esp", esp as i32);
        self.memory.insert(esp, value);
    }

    fn pop(&mut self) -> i32 {
        let esp = self.get("%esp") as u32;
        let value = self.load(esp);
        self.set("%esp", esp.wrapping_add(4) as i32);
        value
    }

    /// `(offset, base register)` of a memory operand
    fn address(
        &self,
        operand: &str,
    ) -> Result<u32, SimError> {
        let (offset, base) = operand
            .strip_suffix(')')
            .and_then(|s| s.split_once('('))
            .ok_or_else(|| SimError::Parse(format!("bad operand {operand}")))?;
        let offset: i32 = if offset.is_empty() {
            0
        } else {
            offset
                .parse()
                .map_err(|_| SimError::Parse(format!("bad offset {operand}")))?
        };
        if !REGISTERS.contains(&base) {
            return Err(SimError::Parse(format!("bad base {operand}")));
        }
        Ok((self.get(base) as u32).wrapping_add(offset as u32))
    }

    fn read(
        &self,
        operand: &str,
    ) -> Result<i32, SimError> {
        if let Some(value) = operand.strip_prefix('$') {
            return value
                .parse()
                .map_err(|_| SimError::Parse(format!("bad immediate {operand}")));
        }
        if REGISTERS.contains(&operand) {
            return Ok(self.get(operand));
        }
        Ok(self.load(self.address(operand)?))
    }

    fn write(
        &mut self,
        operand: &str,
        value: i32,
    ) -> Result<(), SimError> {
        if REGISTERS.contains(&operand) {
            self.set(operand, value);
            return Ok(());
        }
        let address = self.address(operand)?;
        self.memory.insert(address, value);
        Ok(())
    }
}

/// Runtime symbol behind `target`, with or without the `_` prefix
fn builtin(target: &str) -> Option<&'static str> {
    match target.trim_start_matches('_') {
        "read" => Some("read"),
        "write" => Some("write"),
        _ => None,
    }
}

/// Assemble-and-run shorthand
pub fn run_asm(
    text: &str,
    entry: &str,
    input: &[i32],
) -> Result<Run, SimError> {
    X86Sim::parse(text)?.run(entry, input)
}
