//! Lowering of block terminators.
//!
//! Every terminator starts by popping whatever block-local values remain on
//! the stack; anything consumed past this point is a constant or lives in a
//! planned memory slot.

use cantata_ir::{BlockId, Terminator, Value};

use crate::{
    error::CodegenError,
    memory::RETURN_PC_SLOT,
    opcode::Opcode,
    state::{PatchTarget, State},
};

use super::{FuncEmitter, FuncKind};

pub(super) fn emit_terminator(
    em: &FuncEmitter<'_>,
    state: State,
    block: BlockId,
    is_last: bool,
) -> Result<State, CodegenError> {
    let state = state.pop_all()?;

    match &em.func.block(block).terminator {
        Terminator::Jump { target, .. } => {
            let state = emit_phi_moves(em, state, block, *target)?;
            let state = state.push_patch(PatchTarget::Block(*target))?.op(Opcode::Jump)?;
            Ok(state.forget_stack())
        }

        Terminator::Branch {
            cond,
            then_dest,
            else_dest,
            ..
        } => {
            // Phi edges were split ahead of emission, so neither side
            // carries moves here.
            let state = em.push_value(state, cond)?;
            let state = state
                .push_patch(PatchTarget::Block(*then_dest))?
                .op(Opcode::JumpI)?;
            let state = state
                .push_patch(PatchTarget::Block(*else_dest))?
                .op(Opcode::Jump)?;
            Ok(state.forget_stack())
        }

        Terminator::Return { value, .. } => emit_return(em, state, value, is_last),

        Terminator::Call {
            callee,
            args,
            continuation,
            ..
        } => {
            if em.kind == FuncKind::Create {
                // The constructor has no function registry to jump into.
                return Err(CodegenError::UnsupportedCallTerminator);
            }
            // Stash the continuation address in the return-PC slot.
            let mut state = state
                .push_patch(PatchTarget::Block(*continuation))?
                .push_usize(RETURN_PC_SLOT as usize)?
                .op(Opcode::MStore)?;
            // Arguments left to right; the callee prologue unwinds them
            // from the top.
            for arg in args {
                state = em.push_value(state, arg)?;
            }
            let state = state
                .push_patch(PatchTarget::Function(callee.clone()))?
                .op(Opcode::Jump)?;
            Ok(state.forget_stack())
        }
    }
}

fn emit_return(
    em: &FuncEmitter<'_>,
    state: State,
    value: &Option<Value>,
    is_last: bool,
) -> Result<State, CodegenError> {
    match em.kind {
        FuncKind::User => {
            // Push the result (if any), then jump through the return PC.
            let state = match value {
                Some(value) => em.push_value(state, value)?,
                None => state,
            };
            let state = state
                .push_usize(RETURN_PC_SLOT as usize)?
                .op(Opcode::MLoad)?
                .op(Opcode::Jump)?;
            Ok(state.forget_stack())
        }
        FuncKind::Main | FuncKind::Create => match value {
            None => {
                if is_last && em.falls_through {
                    // Falls off the end: into the deployment wrapper for
                    // `create`, off the end of the runtime for `main`.
                    Ok(state)
                } else {
                    state.op(Opcode::Stop)
                }
            }
            Some(value) => {
                // Stage the word just past the frame and RETURN it.
                let stage = em.plan.frame_end() as usize;
                let state = em.push_value(state, value)?;
                let state = state.push_usize(stage)?.op(Opcode::MStore)?;
                state
                    .push_usize(32)?
                    .push_usize(stage)?
                    .op(Opcode::Return)
            }
        },
    }
}

/// Parallel phi moves for the edge `from -> target`: push every incoming
/// value first, then store them in reverse, so a phi whose source reads
/// another phi's destination sees the pre-move value.
fn emit_phi_moves(
    em: &FuncEmitter<'_>,
    mut state: State,
    from: BlockId,
    target: BlockId,
) -> Result<State, CodegenError> {
    let phis = &em.func.block(target).phis;
    if phis.is_empty() {
        return Ok(state);
    }

    for phi in phis {
        let value = phi
            .value_for(from)
            .ok_or(CodegenError::MissingPhiSource(target, from))?;
        state = em.push_value(state, value)?;
    }
    for phi in phis.iter().rev() {
        state = em.store_to_slot(state, phi.dest)?;
    }
    Ok(state)
}
