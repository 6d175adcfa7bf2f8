//! Static memory planning.
//!
//! Values that outlive the block computing them cannot stay on the EVM
//! operand stack, so each gets a static 32-byte slot. Slots are handed out
//! from a monotone cursor starting at the frame base; the plan is built once
//! per function before emission and never changes during it.
//!
//! Planned values: function parameters (the prologue stores them), phi and
//! call destinations (their value arrives on a control-flow edge), every
//! cross-block value from the liveness analysis, and values consumed by
//! terminators or phi arguments (those are read after the block's stack has
//! been cleared).

use std::collections::BTreeMap;

use cantata_ir::{Function, TempId, Value};

use crate::liveness::Liveness;

/// Start of hashing scratch space.
pub const SCRATCH_BASE: u32 = 0x00;
/// Free-memory-pointer slot for `allocate`.
pub const FREE_PTR_SLOT: u32 = 0x40;
/// Call return-PC slot.
pub const RETURN_PC_SLOT: u32 = 0x60;
/// First byte available for planned value slots.
pub const FRAME_BASE: u32 = 0x80;

#[derive(Debug, Clone)]
pub struct MemoryPlan {
    slots: BTreeMap<TempId, u32>,
    next: u32,
}

impl MemoryPlan {
    pub fn slot_of(&self, temp: TempId) -> Option<u32> {
        self.slots.get(&temp).copied()
    }

    /// First byte past the planned frame; the return-value staging slot and
    /// the initial free-memory pointer both live here.
    pub fn frame_end(&self) -> u32 {
        self.next
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

pub fn plan_memory(func: &Function, liveness: &Liveness) -> MemoryPlan {
    let mut plan = MemoryPlan {
        slots: BTreeMap::new(),
        next: FRAME_BASE,
    };

    fn assign(plan: &mut MemoryPlan, temp: TempId) {
        if !plan.slots.contains_key(&temp) {
            plan.slots.insert(temp, plan.next);
            plan.next += 32;
        }
    }

    for param in &func.params {
        assign(&mut plan, param.temp);
    }

    for block in func.blocks.values() {
        for phi in &block.phis {
            assign(&mut plan, phi.dest);
            for (_, value) in &phi.args {
                if let Value::Temp(t) = value {
                    assign(&mut plan, *t);
                }
            }
        }
        if let Some(dest) = block.terminator.dest() {
            assign(&mut plan, dest);
        }
        block.terminator.for_each_value(|v| {
            if let Value::Temp(t) = v {
                assign(&mut plan, *t);
            }
        });
    }

    for &temp in &liveness.cross_block {
        assign(&mut plan, temp);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::compute_liveness;
    use cantata_ir::{BinOp, FunctionBuilder, Type};

    #[test]
    fn slots_start_at_frame_base_and_grow_by_word() {
        let mut fb = FunctionBuilder::new(
            "f",
            &[("a".into(), Type::word()), ("b".into(), Type::word())],
            Some(Type::word()),
        );
        let sum = fb.binary(BinOp::Add, fb.param(0), fb.param(1));
        fb.ret(Some(sum));
        let func = fb.finish();

        let plan = plan_memory(&func, &compute_liveness(&func));
        let a = func.params[0].temp;
        let b = func.params[1].temp;
        assert_eq!(plan.slot_of(a), Some(FRAME_BASE));
        assert_eq!(plan.slot_of(b), Some(FRAME_BASE + 32));
        // `sum` feeds the return terminator, so it is planned too.
        assert_eq!(plan.slot_count(), 3);
        assert_eq!(plan.frame_end(), FRAME_BASE + 3 * 32);
    }

    #[test]
    fn block_local_values_get_no_slot() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let a = fb.constant(1u64.into());
        let b = fb.constant(2u64.into());
        let c = fb.binary(BinOp::Add, a.clone(), b);
        // `c` is dead (never used); `a`/`b` are consumed in-block.
        let _ = c;
        fb.ret(None);
        let func = fb.finish();

        let plan = plan_memory(&func, &compute_liveness(&func));
        assert_eq!(plan.slot_count(), 0);
        assert_eq!(plan.frame_end(), FRAME_BASE);
        assert_eq!(plan.slot_of(a.as_temp().unwrap()), None);
    }
}
