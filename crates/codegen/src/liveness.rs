//! Compute the liveness of values in a function.
//!
//! Classic backward dataflow iterated to a fixed point. Phi arguments are
//! treated as uses in their associated predecessor block, *not* in the block
//! containing the phi; the phi result is live-in for the phi's block but not
//! live-out of the predecessors (no block defines it on the edge).
//!
//! The result is a fresh analysis of one IR state. Passes that rewrite the
//! IR recompute it rather than patching sets in place.

use std::collections::{BTreeMap, BTreeSet};

use cantata_ir::{BlockId, Function, TempId, Terminator, Value};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct Liveness {
    pub live_in: BTreeMap<BlockId, BTreeSet<TempId>>,
    pub live_out: BTreeMap<BlockId, BTreeSet<TempId>>,
    /// Values live across at least one block boundary.
    pub cross_block: BTreeSet<TempId>,
    /// For block-local values: index of the defining block and the position
    /// of the last instruction (or terminator, marked `usize::MAX`) using it.
    pub last_use: FxHashMap<TempId, (BlockId, usize)>,
}

impl Liveness {
    pub fn is_cross_block(&self, temp: TempId) -> bool {
        self.cross_block.contains(&temp)
    }
}

pub fn compute_liveness(func: &Function) -> Liveness {
    let mut defs: BTreeMap<BlockId, BTreeSet<TempId>> = BTreeMap::new();
    // Upward-exposed uses: used in the block before any local definition.
    let mut uses: BTreeMap<BlockId, BTreeSet<TempId>> = BTreeMap::new();
    // Phi uses per edge: pred -> temps flowing out of it.
    let mut edge_uses: BTreeMap<BlockId, BTreeSet<TempId>> = BTreeMap::new();
    let mut phi_dests: BTreeMap<BlockId, BTreeSet<TempId>> = BTreeMap::new();

    // Call results materialize at the top of their continuation block.
    let mut cont_defs: BTreeMap<BlockId, TempId> = BTreeMap::new();
    for block in func.blocks.values() {
        if let (Some(dest), Terminator::Call { continuation, .. }) =
            (block.terminator.dest(), &block.terminator)
        {
            cont_defs.insert(*continuation, dest);
        }
    }

    for (&id, block) in &func.blocks {
        let d = defs.entry(id).or_default();
        let u = uses.entry(id).or_default();

        let mut local: BTreeSet<TempId> = BTreeSet::new();
        if let Some(&dest) = cont_defs.get(&id) {
            local.insert(dest);
            d.insert(dest);
        }

        for phi in &block.phis {
            phi_dests.entry(id).or_default().insert(phi.dest);
            d.insert(phi.dest);
            local.insert(phi.dest);
            for (pred, value) in &phi.args {
                if let Value::Temp(t) = value {
                    edge_uses.entry(*pred).or_default().insert(*t);
                }
            }
        }
        for inst in &block.insts {
            inst.for_each_value(|v| {
                if let Value::Temp(t) = v {
                    if !local.contains(t) {
                        u.insert(*t);
                    }
                }
            });
            if let Some(dest) = inst.dest() {
                d.insert(dest);
                local.insert(dest);
            }
        }
        block.terminator.for_each_value(|v| {
            if let Value::Temp(t) = v {
                if !local.contains(t) {
                    u.insert(*t);
                }
            }
        });
    }

    let mut live_in: BTreeMap<BlockId, BTreeSet<TempId>> = BTreeMap::new();
    let mut live_out: BTreeMap<BlockId, BTreeSet<TempId>> = BTreeMap::new();
    for id in func.block_ids() {
        live_in.insert(id, BTreeSet::new());
        live_out.insert(id, BTreeSet::new());
    }

    let mut changed = true;
    while changed {
        changed = false;
        // Backward problem: id order is irrelevant for correctness, the
        // fixed point just converges faster in reverse.
        for (&id, block) in func.blocks.iter().rev() {
            let mut out: BTreeSet<TempId> = edge_uses.get(&id).cloned().unwrap_or_default();
            for succ in block.terminator.dests() {
                let empty = BTreeSet::new();
                let succ_in = live_in.get(&succ).unwrap_or(&empty);
                let succ_phis = phi_dests.get(&succ);
                for &t in succ_in {
                    if succ_phis.is_some_and(|p| p.contains(&t)) {
                        continue;
                    }
                    out.insert(t);
                }
            }

            let empty = BTreeSet::new();
            let d = defs.get(&id).unwrap_or(&empty);
            let u = uses.get(&id).unwrap_or(&empty);
            let mut inn: BTreeSet<TempId> = u.clone();
            for &t in &out {
                if !d.contains(&t) {
                    inn.insert(t);
                }
            }
            // Phi dests are live-in of their own block.
            if let Some(p) = phi_dests.get(&id) {
                inn.extend(p.iter().copied());
            }

            if live_out[&id] != out {
                live_out.insert(id, out);
                changed = true;
            }
            if live_in[&id] != inn {
                live_in.insert(id, inn);
                changed = true;
            }
        }
    }

    let temp_defs = func.temp_defs();
    let mut cross_block = BTreeSet::new();
    for (&t, &def_block) in &temp_defs {
        let escapes = live_out.get(&def_block).is_some_and(|s| s.contains(&t))
            || edge_uses.get(&def_block).is_some_and(|s| s.contains(&t))
            || live_in.iter().any(|(&b, s)| b != def_block && s.contains(&t));
        if escapes {
            cross_block.insert(t);
        }
    }

    let mut last_use = FxHashMap::default();
    for (&id, block) in &func.blocks {
        for (idx, inst) in block.insts.iter().enumerate() {
            inst.for_each_value(|v| {
                if let Value::Temp(t) = v {
                    last_use.insert(*t, (id, idx));
                }
            });
        }
        block.terminator.for_each_value(|v| {
            if let Value::Temp(t) = v {
                last_use.insert(*t, (id, usize::MAX));
            }
        });
    }

    Liveness {
        live_in,
        live_out,
        cross_block,
        last_use,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantata_ir::{BinOp, FunctionBuilder, Type, Value};

    #[test]
    fn straightline_has_no_cross_block_values() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let a = fb.constant(1u64.into());
        let b = fb.constant(2u64.into());
        let c = fb.binary(BinOp::Add, a, b);
        fb.ret(Some(c));
        let func = fb.finish();

        let live = compute_liveness(&func);
        // `c` feeds the terminator; everything still lives inside one block.
        assert!(live.cross_block.is_empty());
        assert!(live.live_out[&func.entry].is_empty());
    }

    #[test]
    fn value_used_in_later_block_is_cross_block() {
        let mut fb = FunctionBuilder::new("f", &[], Some(Type::word()));
        let a = fb.constant(7u64.into());
        let next = fb.append_block();
        fb.jump(next);
        fb.switch_to_block(next);
        let one = fb.constant(1u64.into());
        let sum = fb.binary(BinOp::Add, a.clone(), one);
        fb.ret(Some(sum));
        let func = fb.finish();

        let live = compute_liveness(&func);
        let a = a.as_temp().unwrap();
        assert!(live.cross_block.contains(&a));
        assert!(live.live_out[&func.entry].contains(&a));
        assert!(live.live_in[&next].contains(&a));
    }

    #[test]
    fn phi_arg_is_live_out_of_pred_not_phi_block() {
        let mut fb = FunctionBuilder::new("f", &[], Some(Type::word()));
        let a = fb.constant(3u64.into());
        let entry = fb.current_block();
        let join = fb.append_block();
        fb.jump(join);
        fb.switch_to_block(join);
        let phi = fb.phi(Type::word(), vec![(entry, a.clone())]);
        fb.ret(Some(phi.clone()));
        let func = fb.finish();

        let live = compute_liveness(&func);
        let a = a.as_temp().unwrap();
        let phi = phi.as_temp().unwrap();
        assert!(live.live_out[&entry].contains(&a));
        assert!(!live.live_in[&join].contains(&a), "phi arg used on the edge only");
        assert!(live.live_in[&join].contains(&phi));
        assert!(!live.live_out[&entry].contains(&phi));
    }

    #[test]
    fn branch_cond_from_same_block_stays_local() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let cond = fb.constant(1u64.into());
        let t = fb.append_block();
        let e = fb.append_block();
        fb.branch(cond.clone(), t, e);
        fb.switch_to_block(t);
        fb.ret(None);
        fb.switch_to_block(e);
        fb.ret(None);
        let func = fb.finish();

        let live = compute_liveness(&func);
        assert!(!live.cross_block.contains(&cond.as_temp().unwrap()));
        assert_eq!(
            live.last_use[&cond.as_temp().unwrap()],
            (func.entry, usize::MAX)
        );
    }

    #[test]
    fn loop_carried_value_stays_live_around_the_cycle() {
        // entry -> head; head -> body | exit; body -> head
        let mut fb = FunctionBuilder::new("f", &[], Some(Type::word()));
        let init = fb.constant(0u64.into());
        let entry = fb.current_block();
        let head = fb.append_block();
        let body = fb.append_block();
        let exit = fb.append_block();
        fb.jump(head);

        fb.switch_to_block(body);
        fb.jump(head);

        fb.switch_to_block(head);
        let acc = fb.phi(
            Type::word(),
            vec![(entry, init), (body, Value::num(9u64))],
        );
        let cond = fb.constant(1u64.into());
        fb.branch(cond, body, exit);

        fb.switch_to_block(exit);
        fb.ret(Some(acc.clone()));
        let func = fb.finish();

        let live = compute_liveness(&func);
        let acc = acc.as_temp().unwrap();
        assert!(live.cross_block.contains(&acc));
        assert!(live.live_in[&exit].contains(&acc));
        assert!(live.live_out[&head].contains(&acc));
    }
}
