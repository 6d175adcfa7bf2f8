//! Constant propagation.
//!
//! Substitutes known-constant temps directly into the operand positions of
//! other instructions and terminators. Tracking is deliberately coarse: any
//! side-effecting instruction (`write`) clears every tracked constant. No
//! alias analysis backs this pass; correctness comes from giving up early.

use cantata_ir::{Function, Immediate, Inst, TempId, Value};
use rustc_hash::FxHashMap;

use super::{OptimizationContext, TransformKind};

#[derive(Debug, Default)]
pub struct ConstantPropagation;

impl ConstantPropagation {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&mut self, func: &mut Function, ctx: &mut OptimizationContext) -> bool {
        let mut consts: FxHashMap<TempId, Immediate> = FxHashMap::default();
        let mut changed = false;

        let ids: Vec<_> = func.block_ids().collect();
        for id in ids {
            let block = func.block_mut(id);
            for inst in &mut block.insts {
                if let Inst::Const { dest, value, .. } = inst {
                    consts.insert(*dest, value.clone());
                    continue;
                }

                let side_effect = inst.has_side_effect();
                let mut substituted = false;
                inst.for_each_value_mut(|value| {
                    substitute(value, &consts, &mut substituted);
                });
                if substituted {
                    let debug = inst.debug().combined();
                    ctx.record(
                        TransformKind::Replace,
                        debug.clone(),
                        debug,
                        "constant propagation",
                    );
                    changed = true;
                }
                if side_effect {
                    consts.clear();
                }
            }

            let terminator = &mut block.terminator;
            let mut substituted = false;
            terminator.for_each_value_mut(|value| {
                substitute(value, &consts, &mut substituted);
            });
            if substituted {
                let debug = terminator.debug().combined();
                ctx.record(
                    TransformKind::Replace,
                    debug.clone(),
                    debug,
                    "constant propagation",
                );
                changed = true;
            }
        }

        changed
    }
}

fn substitute(value: &mut Value, consts: &FxHashMap<TempId, Immediate>, substituted: &mut bool) {
    let Value::Temp(t) = value else {
        return;
    };
    // Only word constants substitute; byte strings have no operand form
    // outside `hash`, which the folding pass handles.
    if let Some(imm @ Immediate::Num(_)) = consts.get(t) {
        *value = Value::Const(imm.clone());
        *substituted = true;
    }
}
