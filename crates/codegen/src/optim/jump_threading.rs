//! Jump threading.
//!
//! Chains of blocks that only jump are collapsed: every terminator edge into
//! such a chain is redirected to the chain's final real target, phi source
//! keys at the target are rewritten to the redirected predecessors, and
//! blocks left unreachable are removed. Chain traversal carries a visited
//! set, so a cycle of empty jumps is left untouched rather than looped on.

use std::collections::BTreeSet;

use cantata_ir::{BlockId, Function, Provenance, Terminator};

use super::{OptimizationContext, TransformKind};

#[derive(Debug, Default)]
pub struct JumpThreading;

struct Redirect {
    pred: BlockId,
    /// The last empty chain block, i.e. the phi key the target knows.
    via: BlockId,
    target: BlockId,
}

impl JumpThreading {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&mut self, func: &mut Function, ctx: &mut OptimizationContext) -> bool {
        let mut changed = false;
        let mut redirects: Vec<Redirect> = Vec::new();

        let ids: Vec<_> = func.block_ids().collect();
        for id in ids {
            for dest in func.block(id).terminator.dests() {
                let Some((target, via)) = resolve_chain(func, dest) else {
                    continue;
                };
                func.block_mut(id).terminator.retarget(dest, target);
                ctx.record(
                    TransformKind::Move,
                    func.block(id).terminator.debug().combined(),
                    func.block(id).terminator.debug().combined(),
                    "jump threading",
                );
                redirects.push(Redirect {
                    pred: id,
                    via,
                    target,
                });
                changed = true;
            }
        }

        rewrite_phi_sources(func, &redirects);
        changed |= remove_unreachable(func, ctx);

        if changed {
            func.recompute_preds();
            prune_dangling_phi_sources(func);
        }
        changed
    }
}

/// Follow `start` through empty jump-only blocks. Returns the final target
/// and the last chain block, or `None` when `start` is not an empty jump
/// block (nothing to thread) or the chain is a cycle.
fn resolve_chain(func: &Function, start: BlockId) -> Option<(BlockId, BlockId)> {
    let mut visited = BTreeSet::new();
    let mut via = None;
    let mut cur = start;

    loop {
        let block = func.block(cur);
        let Terminator::Jump { target, .. } = block.terminator else {
            break;
        };
        if !block.is_empty() {
            break;
        }
        if !visited.insert(cur) {
            return None;
        }
        via = Some(cur);
        cur = target;
    }

    via.map(|via| (cur, via))
}

/// Replace phi entries keyed by a bypassed chain block with entries for the
/// new direct predecessors, preserving the routed value.
fn rewrite_phi_sources(func: &mut Function, redirects: &[Redirect]) {
    for redirect in redirects {
        let block = func.block_mut(redirect.target);
        for phi in &mut block.phis {
            let Some(value) = phi.value_for(redirect.via).cloned() else {
                continue;
            };
            phi.args.push((redirect.pred, value));
        }
    }
    // Drop the bypassed keys once every redirect has contributed its entry.
    let vias: BTreeSet<_> = redirects.iter().map(|r| r.via).collect();
    for redirect in redirects {
        let block = func.block_mut(redirect.target);
        for phi in &mut block.phis {
            phi.args.retain(|(src, _)| !vias.contains(src));
        }
    }
}

/// Remove blocks no longer reachable from the entry, recording a delete for
/// their provenance.
fn remove_unreachable(func: &mut Function, ctx: &mut OptimizationContext) -> bool {
    let mut reachable = BTreeSet::new();
    let mut stack = vec![func.entry];
    while let Some(block) = stack.pop() {
        if !reachable.insert(block) {
            continue;
        }
        for succ in func.block(block).terminator.dests() {
            stack.push(succ);
        }
    }

    let doomed: Vec<_> = func
        .block_ids()
        .filter(|id| !reachable.contains(id))
        .collect();
    for id in &doomed {
        let block = &func.blocks[id];
        let mut provenance = Provenance::none();
        for inst in &block.insts {
            provenance = provenance.merge(&inst.debug().combined());
        }
        provenance = provenance.merge(&block.terminator.debug().combined());
        ctx.record(
            TransformKind::Delete,
            provenance,
            Provenance::none(),
            "unreachable block removal",
        );
        func.blocks.remove(id);
    }
    !doomed.is_empty()
}

/// After removal, phis may still name dead predecessors; drop those args.
fn prune_dangling_phi_sources(func: &mut Function) {
    let ids: Vec<_> = func.block_ids().collect();
    for id in ids {
        let preds = func.block(id).preds.clone();
        for phi in &mut func.block_mut(id).phis {
            phi.args.retain(|(src, _)| preds.contains(src));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantata_ir::{FunctionBuilder, Type, Value};

    #[test]
    fn collapses_a_chain_of_empty_jumps() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let a = fb.append_block();
        let b = fb.append_block();
        let real = fb.append_block();
        fb.jump(a);
        fb.switch_to_block(a);
        fb.jump(b);
        fb.switch_to_block(b);
        fb.jump(real);
        fb.switch_to_block(real);
        fb.ret(None);
        let mut func = fb.finish();

        let changed =
            JumpThreading::new().run(&mut func, &mut OptimizationContext::default());
        assert!(changed);
        assert!(matches!(
            func.block(func.entry).terminator,
            Terminator::Jump { target, .. } if target == real
        ));
        // The two empty chain blocks are gone.
        assert_eq!(func.block_ids().count(), 2);
    }

    #[test]
    fn phi_keys_follow_the_redirected_predecessor() {
        // entry branches to two empty forwarders that both jump to the join.
        let mut fb = FunctionBuilder::new("f", &[], Some(Type::word()));
        let entry = fb.current_block();
        let fwd_a = fb.append_block();
        let fwd_b = fb.append_block();
        let join = fb.append_block();
        fb.branch(Value::num(1u64), fwd_a, fwd_b);
        fb.switch_to_block(fwd_a);
        fb.jump(join);
        fb.switch_to_block(fwd_b);
        fb.jump(join);
        fb.switch_to_block(join);
        let phi = fb.phi(
            Type::word(),
            vec![(fwd_a, Value::num(10u64)), (fwd_b, Value::num(20u64))],
        );
        fb.ret(Some(phi));
        let mut func = fb.finish();

        JumpThreading::new().run(&mut func, &mut OptimizationContext::default());

        let phi = &func.block(join).phis[0];
        // Both entries now key on the original (non-intermediate) pred.
        assert_eq!(phi.args.len(), 2);
        assert!(phi.args.iter().all(|(src, _)| *src == entry));
        let values: Vec<_> = phi.args.iter().map(|(_, v)| v.as_num().unwrap()).collect();
        assert!(values.contains(&10u64.into()) && values.contains(&20u64.into()));
    }

    #[test]
    fn empty_jump_cycle_terminates_untouched() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let a = fb.append_block();
        let b = fb.append_block();
        fb.jump(a);
        fb.switch_to_block(a);
        fb.jump(b);
        fb.switch_to_block(b);
        fb.jump(a);
        let mut func = fb.finish();

        // Threading must not loop forever; the cycle stays as-is.
        let changed =
            JumpThreading::new().run(&mut func, &mut OptimizationContext::default());
        assert!(!changed);
    }
}
