//! 字节码发射器
//!
//! Collects symbolic instructions, then assembles them: lays out offsets,
//! backfills branch offsets from bound labels, and computes `max_stack` with a
//! worklist pass over the control-flow graph.

use crate::backends::error::{CodegenError, CodegenResult};
use crate::backends::jvm::opcode::Opcode;

/// Largest method body the class-file format allows
const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Branch target inside one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

impl Label {
    pub fn id(self) -> usize {
        self.0
    }
}

/// Symbolic instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Opcode without operands
    Op(Opcode),
    /// Opcode with a one-byte operand (`bipush`, `ldc`)
    Byte(Opcode, u8),
    /// Opcode with a two-byte operand (`sipush`, `ldc_w`, `new`)
    Short(Opcode, u16),
    /// Local-variable access; encoded in the shortest form for `slot`
    Local(Opcode, u16),
    /// Field or method reference with an explicit stack effect
    Member {
        op: Opcode,
        index: u16,
        pops: u16,
        pushes: u16,
    },
    Jump(Opcode, Label),
    /// Pseudo-instruction marking a label position
    Bind(Label),
}

impl Insn {
    pub fn encoded_size(&self) -> usize {
        match self {
            Insn::Op(_) => 1,
            Insn::Byte(..) => 2,
            Insn::Short(..) | Insn::Member { .. } | Insn::Jump(..) => 3,
            Insn::Local(_, slot) => match *slot {
                0..=3 => 1,
                4..=255 => 2,
                _ => 4,
            },
            Insn::Bind(_) => 0,
        }
    }

    /// `(pops, pushes)`
    pub fn stack_effect(&self) -> (u16, u16) {
        match self {
            Insn::Op(op) | Insn::Byte(op, _) | Insn::Short(op, _) | Insn::Local(op, _) => {
                op.stack_effect()
            }
            Insn::Member { pops, pushes, .. } => (*pops, *pushes),
            Insn::Jump(op, _) => op.stack_effect(),
            Insn::Bind(_) => (0, 0),
        }
    }

    fn encode_into(
        &self,
        out: &mut Vec<u8>,
    ) {
        match self {
            Insn::Op(op) => out.push(*op as u8),
            Insn::Byte(op, operand) => out.extend_from_slice(&[*op as u8, *operand]),
            Insn::Short(op, operand) => {
                out.push(*op as u8);
                out.extend_from_slice(&operand.to_be_bytes());
            }
            Insn::Local(op, slot) => match (*slot, op.short_form_base()) {
                (0..=3, Some(base)) => out.push(base + *slot as u8),
                (0..=255, _) => out.extend_from_slice(&[*op as u8, *slot as u8]),
                _ => {
                    out.extend_from_slice(&[Opcode::Wide as u8, *op as u8]);
                    out.extend_from_slice(&slot.to_be_bytes());
                }
            },
            Insn::Member { op, index, .. } => {
                out.push(*op as u8);
                out.extend_from_slice(&index.to_be_bytes());
            }
            // offsets are written by the caller
            Insn::Jump(op, _) => out.extend_from_slice(&[*op as u8, 0, 0]),
            Insn::Bind(_) => {}
        }
    }
}

/// Assembled method body
#[derive(Debug, Clone)]
pub struct MethodCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    /// Code offset of every label, indexed by label id
    pub label_offsets: Vec<usize>,
}

/// Method body under construction
#[derive(Debug, Default)]
pub struct CodeBuilder {
    insns: Vec<Insn>,
    label_count: usize,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.label_count);
        self.label_count += 1;
        label
    }

    pub fn bind(
        &mut self,
        label: Label,
    ) {
        self.insns.push(Insn::Bind(label));
    }

    pub fn emit(
        &mut self,
        insn: Insn,
    ) {
        self.insns.push(insn);
    }

    pub fn op(
        &mut self,
        op: Opcode,
    ) {
        self.emit(Insn::Op(op));
    }

    pub fn jump(
        &mut self,
        op: Opcode,
        target: Label,
    ) {
        self.emit(Insn::Jump(op, target));
    }

    pub fn local(
        &mut self,
        op: Opcode,
        slot: u16,
    ) {
        self.emit(Insn::Local(op, slot));
    }

    pub fn member(
        &mut self,
        op: Opcode,
        index: u16,
        pops: u16,
        pushes: u16,
    ) {
        self.emit(Insn::Member {
            op,
            index,
            pops,
            pushes,
        });
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    /// Lay out, encode and analyse the body
    pub fn assemble(self) -> CodegenResult<MethodCode> {
        let mut offsets = Vec::with_capacity(self.insns.len());
        let mut label_offsets: Vec<Option<usize>> = vec![None; self.label_count];
        let mut label_positions: Vec<Option<usize>> = vec![None; self.label_count];
        let mut offset = 0usize;
        for (position, insn) in self.insns.iter().enumerate() {
            offsets.push(offset);
            if let Insn::Bind(label) = insn {
                label_offsets[label.0] = Some(offset);
                label_positions[label.0] = Some(position);
            }
            offset += insn.encoded_size();
        }
        if offset > MAX_CODE_LENGTH {
            return Err(CodegenError::CodeTooLarge { len: offset });
        }

        let label_offsets = label_offsets
            .into_iter()
            .enumerate()
            .map(|(id, offset)| offset.ok_or(CodegenError::UnboundLabel(id)))
            .collect::<CodegenResult<Vec<usize>>>()?;
        let label_positions = label_positions
            .into_iter()
            .enumerate()
            .map(|(id, position)| position.ok_or(CodegenError::UnboundLabel(id)))
            .collect::<CodegenResult<Vec<usize>>>()?;

        // 回填跳转偏移
        let mut code = Vec::with_capacity(offset);
        for (insn, &at) in self.insns.iter().zip(&offsets) {
            insn.encode_into(&mut code);
            if let Insn::Jump(_, target) = insn {
                let relative = label_offsets[target.0] as i64 - at as i64;
                let relative = i16::try_from(relative)
                    .map_err(|_| CodegenError::BranchOutOfRange { offset: relative })?;
                code[at + 1..at + 3].copy_from_slice(&relative.to_be_bytes());
            }
        }

        let max_stack = self.max_stack(&offsets, &label_positions)?;

        Ok(MethodCode {
            code,
            max_stack,
            label_offsets,
        })
    }

    /// Worklist pass computing the deepest operand stack any path reaches
    fn max_stack(
        &self,
        offsets: &[usize],
        label_positions: &[usize],
    ) -> CodegenResult<u16> {
        let count = self.insns.len();
        let mut heights: Vec<Option<u16>> = vec![None; count];
        let mut work = Vec::new();
        let mut max = 0u16;

        if count > 0 {
            heights[0] = Some(0);
            work.push(0);
        }

        while let Some(position) = work.pop() {
            let Some(height) = heights[position] else {
                continue;
            };
            let insn = &self.insns[position];
            let (pops, pushes) = insn.stack_effect();
            if height < pops {
                return Err(CodegenError::StackUnderflow {
                    offset: offsets[position],
                });
            }
            let after = height - pops + pushes;
            max = max.max(height).max(after);

            let mut successors = [None, None];
            match insn {
                Insn::Jump(Opcode::Goto, target) => {
                    successors[0] = Some(label_positions[target.0]);
                }
                Insn::Jump(_, target) => {
                    successors[0] = Some(position + 1);
                    successors[1] = Some(label_positions[target.0]);
                }
                Insn::Op(Opcode::Return) => {}
                _ => successors[0] = Some(position + 1),
            }

            for next in successors.into_iter().flatten() {
                if next >= count {
                    continue;
                }
                match heights[next] {
                    None => {
                        heights[next] = Some(after);
                        work.push(next);
                    }
                    Some(existing) if existing != after => {
                        return Err(CodegenError::StackMismatch {
                            offset: offsets[next],
                            expected: existing,
                            found: after,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(max)
    }
}
