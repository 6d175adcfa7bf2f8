//! Edge normalization ahead of emission.
//!
//! Phi moves are emitted on the jump edge entering a block. A branch cannot
//! carry per-edge moves (both of its placeholder pushes sit in the same
//! instruction stream), so any branch edge into a block with phis is routed
//! through a fresh block holding just the jump. Phi source keys are updated
//! to name the new block.

use cantata_ir::{Function, Terminator};

pub fn split_phi_edges(func: &mut Function) -> bool {
    let mut changed = false;

    let blocks: Vec<_> = func.block_ids().collect();
    for id in blocks {
        let Terminator::Branch {
            then_dest,
            else_dest,
            ..
        } = func.block(id).terminator
        else {
            continue;
        };

        for dest in [then_dest, else_dest] {
            if func.block(dest).phis.is_empty() {
                continue;
            }
            let mid = func.make_block();
            func.block_mut(mid).terminator = Terminator::Jump {
                target: dest,
                debug: Default::default(),
            };
            func.block_mut(id).terminator.retarget(dest, mid);
            for phi in &mut func.block_mut(dest).phis {
                for (src, _) in &mut phi.args {
                    if *src == id {
                        *src = mid;
                    }
                }
            }
            changed = true;
        }
    }

    if changed {
        func.recompute_preds();
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantata_ir::{FunctionBuilder, Type, Value};

    #[test]
    fn branch_edge_into_phi_block_gets_a_middle_block() {
        let mut fb = FunctionBuilder::new("f", &[], Some(Type::word()));
        let entry = fb.current_block();
        let other = fb.append_block();
        let join = fb.append_block();
        fb.branch(Value::num(1u64), join, other);
        fb.switch_to_block(other);
        fb.jump(join);
        fb.switch_to_block(join);
        let phi = fb.phi(
            Type::word(),
            vec![(entry, Value::num(1u64)), (other, Value::num(2u64))],
        );
        fb.ret(Some(phi));
        let mut func = fb.finish();

        assert!(split_phi_edges(&mut func));

        // Entry now branches to a fresh block that jumps to the join.
        let Terminator::Branch { then_dest, .. } = func.block(func.entry).terminator else {
            panic!("entry must still branch");
        };
        assert_ne!(then_dest, join);
        assert!(matches!(
            func.block(then_dest).terminator,
            Terminator::Jump { target, .. } if target == join
        ));
        // The phi source was rewritten to the middle block.
        let phi = &func.block(join).phis[0];
        assert!(phi.args.iter().any(|(src, _)| *src == then_dest));
        assert!(!phi.args.iter().any(|(src, _)| *src == func.entry));
    }

    #[test]
    fn jump_edges_are_left_alone() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let next = fb.append_block();
        fb.jump(next);
        fb.switch_to_block(next);
        fb.ret(None);
        let mut func = fb.finish();
        assert!(!split_phi_edges(&mut func));
    }
}
