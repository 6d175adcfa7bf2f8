//! Linear block ordering for code emission.

use std::collections::BTreeSet;

use cantata_ir::{BlockId, Function};

/// Reverse post order from the entry block.
///
/// The entry comes first and every reachable block appears exactly once;
/// unreachable blocks are not emitted at all. Successors are visited in
/// terminator order, which keeps then-branches ahead of else-branches in
/// the common case.
pub fn block_order(func: &Function) -> Vec<BlockId> {
    let mut post = Vec::new();
    let mut visited = BTreeSet::new();
    // (block, next successor index): explicit stack, blocks can nest deep.
    let mut stack = vec![(func.entry, 0usize)];
    visited.insert(func.entry);

    while let Some(&(block, next)) = stack.last() {
        let succs = func.block(block).terminator.dests();
        if next < succs.len() {
            stack.last_mut().expect("stack is nonempty").1 += 1;
            let succ = succs[next];
            if visited.insert(succ) {
                stack.push((succ, 0));
            }
        } else {
            stack.pop();
            post.push(block);
        }
    }

    post.reverse();
    post
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantata_ir::{FunctionBuilder, Value};

    #[test]
    fn entry_is_first_and_unreachable_blocks_are_dropped() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let a = fb.append_block();
        let orphan = fb.append_block();
        fb.jump(a);
        fb.switch_to_block(a);
        fb.ret(None);
        let func = fb.finish();

        let order = block_order(&func);
        assert_eq!(order, vec![func.entry, a]);
        assert!(!order.contains(&orphan));
    }

    #[test]
    fn diamond_orders_then_before_else() {
        let mut fb = FunctionBuilder::new("f", &[], None);
        let t = fb.append_block();
        let e = fb.append_block();
        let join = fb.append_block();
        fb.branch(Value::num(1u64), t, e);
        fb.switch_to_block(t);
        fb.jump(join);
        fb.switch_to_block(e);
        fb.jump(join);
        fb.switch_to_block(join);
        fb.ret(None);
        let func = fb.finish();

        let order = block_order(&func);
        assert_eq!(order[0], func.entry);
        let pos = |b| order.iter().position(|&x| x == b).unwrap();
        assert!(pos(t) < pos(e));
        assert!(pos(join) > pos(t));
        assert_eq!(order.len(), 4);
    }
}
