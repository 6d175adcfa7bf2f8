//! Per-function lowering into EVM assembly.

mod control_flow;
mod operations;

use std::collections::BTreeMap;

use cantata_ir::{BlockId, Function, TempId, Terminator, Value};
use rustc_hash::FxHashMap;

use crate::{
    error::CodegenError,
    layout::block_order,
    liveness::compute_liveness,
    memory::{self, MemoryPlan},
    opcode::{AsmInst, Opcode},
    state::{Patch, PatchTarget, State},
};

/// Which calling convention a function body is lowered under.
///
/// `Main` and `Create` are entrypoints: `return` halts (or falls through at
/// the end of the code). `User` functions return through the call protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Create,
    Main,
    User,
}

/// Result of emitting one function.
#[derive(Debug)]
pub struct FuncOutput {
    pub asm: Vec<AsmInst>,
    /// Unresolved inter-function patches; block patches are already applied.
    pub patches: Vec<Patch>,
    pub block_offsets: BTreeMap<BlockId, usize>,
    pub size: usize,
}

pub struct FuncEmitter<'a> {
    pub(crate) func: &'a Function,
    pub(crate) plan: MemoryPlan,
    pub(crate) kind: FuncKind,
    /// Last block's void return may fall through (end of create body, or end
    /// of the runtime code when nothing follows `main`).
    pub(crate) falls_through: bool,
    layout: Vec<BlockId>,
    /// Call continuation block -> result temp bound on entry.
    cont_dests: FxHashMap<BlockId, Option<TempId>>,
    /// Byte-string constants, consulted when lowering `hash`.
    pub(crate) const_bytes: FxHashMap<TempId, Vec<u8>>,
}

impl<'a> FuncEmitter<'a> {
    pub fn new(func: &'a Function, kind: FuncKind, falls_through: bool) -> Self {
        let liveness = compute_liveness(func);
        let plan = memory::plan_memory(func, &liveness);
        let layout = block_order(func);

        let mut cont_dests = FxHashMap::default();
        let mut const_bytes = FxHashMap::default();
        for block in func.blocks.values() {
            if let Terminator::Call {
                dest, continuation, ..
            } = &block.terminator
            {
                cont_dests.insert(*continuation, *dest);
            }
            for inst in &block.insts {
                if let cantata_ir::Inst::Const {
                    dest,
                    value: cantata_ir::Immediate::Bytes(b),
                    ..
                } = inst
                {
                    const_bytes.insert(*dest, b.clone());
                }
            }
        }

        Self {
            func,
            plan,
            kind,
            falls_through,
            layout,
            cont_dests,
            const_bytes,
        }
    }

    /// Emit the function starting at `base_offset`, resolving intra-function
    /// jump patches against the finished block-offset map.
    pub fn run(&self, base_offset: usize) -> Result<FuncOutput, CodegenError> {
        let mut state = State::new(base_offset);

        state = self.emit_prologue(state)?;

        let last = *self.layout.last().expect("layout contains the entry block");
        for &block in &self.layout {
            state = self.emit_block(state, block, block == last)?;
        }

        self.resolve_block_patches(state)
    }

    fn emit_prologue(&self, mut state: State) -> Result<State, CodegenError> {
        match self.kind {
            FuncKind::User => {
                // Call target. Arguments arrive on the stack, pushed left to
                // right by the caller; store them into their slots from the
                // top down.
                state = state.op(Opcode::JumpDest)?;
                for _ in &self.func.params {
                    state.stack.push(crate::state::StackEntry::Scratch);
                }
                for param in self.func.params.iter().rev() {
                    state = self.store_to_slot(state, param.temp)?;
                }
            }
            FuncKind::Main | FuncKind::Create => {
                // Initialize the free-memory pointer past the planned frame.
                state = state
                    .push_usize(self.plan.frame_end() as usize)?
                    .push_usize(memory::FREE_PTR_SLOT as usize)?
                    .op(Opcode::MStore)?;
            }
        }
        Ok(state)
    }

    fn emit_block(
        &self,
        mut state: State,
        block: BlockId,
        is_last: bool,
    ) -> Result<State, CodegenError> {
        state = state.mark_block(block).op(Opcode::JumpDest)?;

        // A call continuation finds the callee's result on the stack.
        if let Some(Some(dest)) = self.cont_dests.get(&block) {
            state.stack.push(crate::state::StackEntry::Scratch);
            state = self.store_to_slot(state, *dest)?;
        }

        let data = self.func.block(block);
        for inst in &data.insts {
            state = state.set_debug(inst.debug().combined());
            state = operations::emit_inst(self, state, inst)?;
        }

        state = state.set_debug(data.terminator.debug().combined());
        control_flow::emit_terminator(self, state, block, is_last)
    }

    /// Push an operand onto the EVM stack: constants by value, planned temps
    /// from their memory slot, block-local temps by DUP.
    pub(crate) fn push_value(&self, state: State, value: &Value) -> Result<State, CodegenError> {
        match value {
            Value::Const(imm) => match imm.as_num() {
                Some(n) => state.push_num(n),
                None => Err(CodegenError::ByteConstantOperand),
            },
            Value::Temp(t) => {
                if let Some(slot) = self.plan.slot_of(*t) {
                    return state.push_usize(slot as usize)?.op(Opcode::MLoad);
                }
                match state.temp_depth(*t) {
                    Some(depth) if depth < 16 => state.op(Opcode::Dup(depth as u8 + 1)),
                    Some(depth) => Err(CodegenError::StackTooDeep { temp: *t, depth }),
                    None => Err(CodegenError::MissingValue(*t)),
                }
            }
        }
    }

    /// Store the stack top into `temp`'s planned slot.
    pub(crate) fn store_to_slot(&self, state: State, temp: TempId) -> Result<State, CodegenError> {
        let slot = self
            .plan
            .slot_of(temp)
            .ok_or(CodegenError::MissingValue(temp))?;
        state.push_usize(slot as usize)?.op(Opcode::MStore)
    }

    /// Bind the freshly computed stack top to `dest`: planned temps are
    /// spilled to memory, block-local temps stay on the stack under a tag.
    pub(crate) fn bind_dest(&self, state: State, dest: TempId) -> Result<State, CodegenError> {
        if self.plan.slot_of(dest).is_some() {
            self.store_to_slot(state, dest)
        } else {
            Ok(state.tag_top(dest))
        }
    }

    fn resolve_block_patches(&self, state: State) -> Result<FuncOutput, CodegenError> {
        let State {
            mut asm,
            patches,
            block_offsets,
            ..
        } = state;

        let mut pending = Vec::new();
        for patch in patches {
            match &patch.target {
                PatchTarget::Block(block) => {
                    let target = *block_offsets
                        .get(block)
                        .ok_or(CodegenError::UnresolvedJumpTarget(*block))?;
                    let bytes = u16::try_from(target)
                        .map_err(|_| CodegenError::JumpTargetOutOfRange(target))?
                        .to_be_bytes();
                    asm[patch.asm_index].imm.copy_from_slice(&bytes);
                }
                PatchTarget::Function(_) => pending.push(patch),
            }
        }

        let size = asm.iter().map(AsmInst::size).sum();

        Ok(FuncOutput {
            asm,
            patches: pending,
            block_offsets,
            size,
        })
    }
}
