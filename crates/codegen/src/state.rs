//! The emission accumulator.
//!
//! One [`State`] is threaded by move through every lowering step of a
//! function. It owns the growing assembly buffer, a typed model of the EVM
//! operand stack, the pending patch list, and the block-offset map. Stack
//! effects are checked as instructions are appended, so an impossible
//! composition fails construction instead of producing broken bytecode.

use std::collections::BTreeMap;

use cantata_ir::{BlockId, Provenance, TempId, U256};

use crate::{
    error::CodegenError,
    opcode::{AsmInst, Opcode},
};

/// What a stack position holds, as far as the emitter knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEntry {
    /// The value of an SSA temp kept on the stack.
    Temp(TempId),
    /// A transient value: pushed constant, loaded word, dup copy.
    Scratch,
}

/// A deferred fix-up of a PUSH2 placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Index of the placeholder instruction in the assembly list.
    pub asm_index: usize,
    /// Absolute byte offset of the two immediate bytes.
    pub byte_offset: usize,
    pub target: PatchTarget,
}

/// Patch targets are typed so block patches cannot leak into the
/// inter-function phase, nor function patches into the intra-function one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchTarget {
    Block(BlockId),
    Function(String),
}

#[derive(Debug)]
pub struct State {
    pub asm: Vec<AsmInst>,
    pub stack: Vec<StackEntry>,
    /// Absolute byte offset of the next emitted instruction.
    pub offset: usize,
    pub patches: Vec<Patch>,
    pub block_offsets: BTreeMap<BlockId, usize>,
    /// Provenance attached to instructions as they are emitted.
    pub debug: Provenance,
}

impl State {
    pub fn new(base_offset: usize) -> Self {
        Self {
            asm: Vec::new(),
            stack: Vec::new(),
            offset: base_offset,
            patches: Vec::new(),
            block_offsets: BTreeMap::new(),
            debug: Provenance::none(),
        }
    }

    pub fn set_debug(mut self, debug: Provenance) -> Self {
        self.debug = debug;
        self
    }

    /// Record the current offset as the start of `block`.
    pub fn mark_block(mut self, block: BlockId) -> Self {
        self.block_offsets.insert(block, self.offset);
        self
    }

    /// Append a nullary opcode, checking and applying its stack effect.
    pub fn op(mut self, op: Opcode) -> Result<Self, CodegenError> {
        debug_assert_eq!(op.immediate_len(), 0, "use push_* for immediates");
        self.apply_stack_effect(op)?;
        self.asm.push(AsmInst::new(op, self.debug.clone()));
        self.offset += 1;
        Ok(self)
    }

    /// Push a constant with the narrowest PUSH encoding (PUSH0 for zero).
    pub fn push_num(mut self, value: U256) -> Result<Self, CodegenError> {
        let bytes: [u8; 32] = value.to_big_endian();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        let imm = &bytes[skip..];
        let op = Opcode::Push(imm.len() as u8);
        self.asm.push(AsmInst::with_imm(op, imm, self.debug.clone()));
        self.offset += 1 + imm.len();
        self.stack.push(StackEntry::Scratch);
        Ok(self)
    }

    pub fn push_usize(self, value: usize) -> Result<Self, CodegenError> {
        self.push_num(U256::from(value))
    }

    /// Push a PUSH2 placeholder and record a patch for `target`.
    pub fn push_patch(mut self, target: PatchTarget) -> Result<Self, CodegenError> {
        self.patches.push(Patch {
            asm_index: self.asm.len(),
            byte_offset: self.offset + 1,
            target,
        });
        self.asm.push(AsmInst::with_imm(
            Opcode::Push(2),
            &[0, 0],
            self.debug.clone(),
        ));
        self.offset += 3;
        self.stack.push(StackEntry::Scratch);
        Ok(self)
    }

    /// Depth (0 = top) of the stack entry holding `temp`.
    pub fn temp_depth(&self, temp: TempId) -> Option<usize> {
        self.stack
            .iter()
            .rev()
            .position(|e| *e == StackEntry::Temp(temp))
    }

    /// Re-tag the top of the stack as holding `temp`.
    pub fn tag_top(mut self, temp: TempId) -> Self {
        if let Some(top) = self.stack.last_mut() {
            *top = StackEntry::Temp(temp);
        }
        self
    }

    /// Pop every remaining stack entry. All of them are dead by the time a
    /// terminator runs: anything that outlives the block is in memory.
    pub fn pop_all(mut self) -> Result<Self, CodegenError> {
        while !self.stack.is_empty() {
            self = self.op(Opcode::Pop)?;
        }
        Ok(self)
    }

    /// Clear the stack model without emitting pops; used after control
    /// leaves the block with values in flight (call args, return values).
    pub fn forget_stack(mut self) -> Self {
        self.stack.clear();
        self
    }

    fn apply_stack_effect(&mut self, op: Opcode) -> Result<(), CodegenError> {
        match op {
            Opcode::Dup(n) => {
                let n = n as usize;
                if self.stack.len() < n {
                    return Err(self.underflow(op, n));
                }
                let entry = self.stack[self.stack.len() - n];
                self.stack.push(entry);
            }
            Opcode::Swap(n) => {
                let n = n as usize;
                if self.stack.len() < n + 1 {
                    return Err(self.underflow(op, n + 1));
                }
                let top = self.stack.len() - 1;
                self.stack.swap(top, top - n);
            }
            _ => {
                let (pops, pushes) = op.stack_io();
                if self.stack.len() < pops {
                    return Err(self.underflow(op, pops));
                }
                self.stack.truncate(self.stack.len() - pops);
                for _ in 0..pushes {
                    self.stack.push(StackEntry::Scratch);
                }
            }
        }
        Ok(())
    }

    fn underflow(&self, op: Opcode, needs: usize) -> CodegenError {
        CodegenError::StackUnderflow {
            op: op.mnemonic(),
            needs,
            depth: self.stack.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_uses_minimal_width() {
        let state = State::new(0);
        let state = state.push_num(U256::zero()).unwrap();
        assert_eq!(state.asm[0].op, Opcode::Push(0));
        let state = state.push_num(U256::from(0xffffu64)).unwrap();
        assert_eq!(state.asm[1].op, Opcode::Push(2));
        assert_eq!(&state.asm[1].imm[..], &[0xff, 0xff]);
        assert_eq!(state.offset, 1 + 3);
        assert_eq!(state.stack.len(), 2);
    }

    #[test]
    fn stack_underflow_is_a_construction_error() {
        let state = State::new(0);
        let err = state.op(Opcode::Add).unwrap_err();
        assert!(matches!(err, CodegenError::StackUnderflow { .. }));
    }

    #[test]
    fn dup_copies_the_tag() {
        let state = State::new(0)
            .push_num(U256::from(1u64))
            .unwrap()
            .tag_top(TempId(7));
        let state = state.op(Opcode::Dup(1)).unwrap();
        assert_eq!(state.stack.len(), 2);
        assert_eq!(state.temp_depth(TempId(7)), Some(0));
    }

    #[test]
    fn patch_records_immediate_offset() {
        let state = State::new(10)
            .push_num(U256::one())
            .unwrap()
            .push_patch(PatchTarget::Block(BlockId(3)))
            .unwrap();
        let patch = &state.patches[0];
        assert_eq!(patch.asm_index, 1);
        // PUSH1 imm occupies 10..12; the PUSH2 opcode sits at 12.
        assert_eq!(patch.byte_offset, 13);
    }
}
