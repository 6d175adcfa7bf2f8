//! Structural IR validation.
//!
//! Checks the invariants every pass assumes and must re-establish: a single
//! terminator per block (by construction), SSA single definition, operands
//! defined somewhere in the function, terminator targets present, and phi
//! sources matching actual predecessors.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{
    function::{BlockId, Function},
    inst::Terminator,
    value::{TempId, Value},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("temp {0} is defined more than once")]
    Redefined(TempId),

    #[error("temp {0} is used but never defined")]
    UndefinedUse(TempId),

    #[error("terminator of {0} targets missing block {1}")]
    MissingTarget(BlockId, BlockId),

    #[error("entry block {0} is missing")]
    MissingEntry(BlockId),

    #[error("phi in {block} names {src}, which is not a predecessor")]
    StalePhiSource { block: BlockId, src: BlockId },

    #[error("phi in {block} has no source for predecessor {pred}")]
    IncompletePhi { block: BlockId, pred: BlockId },
}

pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    if !func.blocks.contains_key(&func.entry) {
        return Err(VerifyError::MissingEntry(func.entry));
    }

    let mut defined: FxHashSet<TempId> = FxHashSet::default();
    for param in &func.params {
        if !defined.insert(param.temp) {
            return Err(VerifyError::Redefined(param.temp));
        }
    }
    for block in func.blocks.values() {
        for phi in &block.phis {
            if !defined.insert(phi.dest) {
                return Err(VerifyError::Redefined(phi.dest));
            }
        }
        for inst in &block.insts {
            if let Some(dest) = inst.dest() {
                if !defined.insert(dest) {
                    return Err(VerifyError::Redefined(dest));
                }
            }
        }
        if let Some(dest) = block.terminator.dest() {
            if !defined.insert(dest) {
                return Err(VerifyError::Redefined(dest));
            }
        }
    }

    let check_use = |value: &Value| match value {
        Value::Temp(t) if !defined.contains(t) => Err(VerifyError::UndefinedUse(*t)),
        _ => Ok(()),
    };
    for block in func.blocks.values() {
        let mut err = None;
        for phi in &block.phis {
            for (_, value) in &phi.args {
                if err.is_none() {
                    err = check_use(value).err();
                }
            }
        }
        block.insts.iter().for_each(|inst| {
            inst.for_each_value(|v| {
                if err.is_none() {
                    err = check_use(v).err();
                }
            })
        });
        block.terminator.for_each_value(|v| {
            if err.is_none() {
                err = check_use(v).err();
            }
        });
        if let Some(err) = err {
            return Err(err);
        }
    }

    for (&id, block) in &func.blocks {
        for dest in block.terminator.dests() {
            if !func.blocks.contains_key(&dest) {
                return Err(VerifyError::MissingTarget(id, dest));
            }
        }
    }

    verify_phis(func)
}

fn verify_phis(func: &Function) -> Result<(), VerifyError> {
    // Work from freshly derived predecessors; the stored sets may be stale
    // mid-pass.
    let mut preds: std::collections::BTreeMap<BlockId, BTreeSet<BlockId>> = Default::default();
    for (&id, block) in &func.blocks {
        for dest in block.terminator.dests() {
            // A call's continuation edge carries no phi operands; the callee
            // returns through the call protocol, not a CFG edge with values.
            if matches!(block.terminator, Terminator::Call { .. }) {
                continue;
            }
            preds.entry(dest).or_default().insert(id);
        }
    }

    for (&id, block) in &func.blocks {
        let actual = preds.remove(&id).unwrap_or_default();
        for phi in &block.phis {
            for (src, _) in &phi.args {
                if !actual.contains(src) {
                    return Err(VerifyError::StalePhiSource { block: id, src: *src });
                }
            }
            for pred in &actual {
                if phi.value_for(*pred).is_none() {
                    return Err(VerifyError::IncompletePhi {
                        block: id,
                        pred: *pred,
                    });
                }
            }
        }
    }
    Ok(())
}
