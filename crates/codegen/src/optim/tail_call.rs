//! Tail-call elimination.
//!
//! A self-recursive `call` whose continuation does nothing but return the
//! call's own result (or nothing, for void functions) is a loop in disguise.
//! The pass synthesizes a loop header carrying one phi per parameter (fed
//! by the entry values and by every tail-call site's arguments), rewrites
//! each qualifying call into a jump to the header, and drops continuation
//! blocks that lost their only predecessor.

use cantata_ir::{
    BlockId, DebugInfo, Function, Phi, Provenance, TempId, Terminator, Value,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{OptimizationContext, TransformKind};

#[derive(Debug, Default)]
pub struct TailCallElim;

impl TailCallElim {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&mut self, func: &mut Function, ctx: &mut OptimizationContext) -> bool {
        let sites = find_tail_calls(func);
        if sites.is_empty() {
            return false;
        }

        // Loop header: one phi per parameter. The function body reads the
        // phi results from here on; the original param temps only feed the
        // entry edge.
        let old_entry = func.entry;
        let new_entry = func.make_block();
        let header = func.make_block();

        let mut renames: FxHashMap<TempId, TempId> = FxHashMap::default();
        let mut phis = Vec::with_capacity(func.params.len());
        let param_info: Vec<(TempId, cantata_ir::Type)> =
            func.params.iter().map(|p| (p.temp, p.ty)).collect();
        for (temp, ty) in param_info {
            let carried = func.make_temp();
            renames.insert(temp, carried);
            phis.push(Phi {
                dest: carried,
                ty,
                args: vec![(new_entry, Value::Temp(temp))],
                debug: DebugInfo::none(),
            });
        }

        for site in &sites {
            let Terminator::Call { args, debug, .. } = &func.block(site.block).terminator else {
                unreachable!("tail-call site changed underneath the pass");
            };
            let args: SmallVec<[Value; 4]> = args.clone();
            let call_debug = debug.combined();
            for (phi, mut arg) in phis.iter_mut().zip(args) {
                // A param passed straight through means "the current
                // iteration's value", i.e. the carried phi.
                rename_value(&mut arg, &renames);
                phi.args.push((site.block, arg));
            }
            ctx.record(
                TransformKind::Replace,
                call_debug.clone(),
                call_debug.clone(),
                "tail call to loop",
            );
            func.block_mut(site.block).terminator = Terminator::Jump {
                target: header,
                debug: DebugInfo::op(call_debug),
            };
        }

        // Rewire uses of the original params onto the loop-carried values
        // everywhere except the header's own entry-edge phi sources.
        let ids: Vec<_> = func.block_ids().collect();
        for id in ids {
            let block = func.block_mut(id);
            for phi in &mut block.phis {
                for (_, value) in &mut phi.args {
                    rename_value(value, &renames);
                }
            }
            for inst in &mut block.insts {
                inst.for_each_value_mut(|v| rename_value(v, &renames));
            }
            block.terminator.for_each_value_mut(|v| rename_value(v, &renames));
        }

        func.block_mut(header).phis = phis;
        func.block_mut(header).terminator = Terminator::Jump {
            target: old_entry,
            debug: DebugInfo::none(),
        };
        func.block_mut(new_entry).terminator = Terminator::Jump {
            target: header,
            debug: DebugInfo::none(),
        };
        func.entry = new_entry;

        // Continuations that only the rewritten calls reached are dead.
        func.recompute_preds();
        for site in &sites {
            let Some(cont) = func.blocks.get(&site.continuation) else {
                continue;
            };
            if cont.preds.is_empty() {
                let term_debug = cont.terminator.debug().combined();
                ctx.record(
                    TransformKind::Delete,
                    term_debug,
                    Provenance::none(),
                    "tail-call continuation removal",
                );
                func.blocks.remove(&site.continuation);
            }
        }

        true
    }
}

struct TailSite {
    block: BlockId,
    continuation: BlockId,
}

/// A call qualifies when it targets the enclosing function and its
/// continuation immediately returns exactly the call's result (or returns
/// nothing from a void call).
fn find_tail_calls(func: &Function) -> Vec<TailSite> {
    let mut sites = Vec::new();
    for (&id, block) in &func.blocks {
        let Terminator::Call {
            callee,
            dest,
            continuation,
            args,
            ..
        } = &block.terminator
        else {
            continue;
        };
        if callee != &func.name || args.len() != func.params.len() {
            continue;
        }
        let cont = func.block(*continuation);
        if !cont.is_empty() {
            continue;
        }
        let Terminator::Return { value, .. } = &cont.terminator else {
            continue;
        };
        let trivial = match (dest, value) {
            (None, None) => true,
            (Some(dest), Some(Value::Temp(t))) => t == dest,
            _ => false,
        };
        if trivial {
            sites.push(TailSite {
                block: id,
                continuation: *continuation,
            });
        }
    }
    sites
}

fn rename_value(value: &mut Value, renames: &FxHashMap<TempId, TempId>) {
    if let Value::Temp(t) = value {
        if let Some(new) = renames.get(t) {
            *t = *new;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantata_ir::{
        verify::verify_function, BinOp, FunctionBuilder, Type, UnOp,
    };

    /// countdown(n): if n == 0 return 0 else countdown(n - 1)
    fn recursive_countdown() -> Function {
        let mut fb = FunctionBuilder::new(
            "countdown",
            &[("n".into(), Type::word())],
            Some(Type::word()),
        );
        let n = fb.param(0);
        let done = fb.append_block();
        let recurse = fb.append_block();
        let cont = fb.append_block();

        let is_zero = fb.unary(UnOp::IsZero, n.clone());
        fb.branch(is_zero, done, recurse);

        fb.switch_to_block(done);
        fb.ret(Some(Value::num(0u64)));

        fb.switch_to_block(recurse);
        let next = fb.binary(BinOp::Sub, n, Value::num(1u64));
        let result = fb.call("countdown", [next], true, cont).unwrap();

        fb.switch_to_block(cont);
        fb.ret(Some(result));
        fb.finish()
    }

    #[test]
    fn converts_self_recursion_into_a_loop() {
        let mut func = recursive_countdown();
        let changed = TailCallElim::new().run(&mut func, &mut OptimizationContext::default());
        assert!(changed);

        // No call terminators remain.
        assert!(func
            .blocks
            .values()
            .all(|b| !matches!(b.terminator, Terminator::Call { .. })));
        // Exactly one block carries the parameter phi.
        let headers: Vec<_> = func
            .blocks
            .values()
            .filter(|b| !b.phis.is_empty())
            .collect();
        assert_eq!(headers.len(), 1);
        let phi = &headers[0].phis[0];
        // Entry value plus one tail-call site.
        assert_eq!(phi.args.len(), 2);
        // The trivial continuation is gone and the module still verifies.
        assert_eq!(verify_function(&func), Ok(()));
    }

    #[test]
    fn non_trivial_continuation_disqualifies() {
        // f(n): r = f(n); return r + 1, which is not a tail call.
        let mut fb = FunctionBuilder::new(
            "f",
            &[("n".into(), Type::word())],
            Some(Type::word()),
        );
        let n = fb.param(0);
        let cont = fb.append_block();
        let r = fb.call("f", [n], true, cont).unwrap();
        fb.switch_to_block(cont);
        let bumped = fb.binary(BinOp::Add, r, Value::num(1u64));
        fb.ret(Some(bumped));
        let mut func = fb.finish();

        let changed = TailCallElim::new().run(&mut func, &mut OptimizationContext::default());
        assert!(!changed);
    }

    #[test]
    fn call_to_another_function_is_untouched() {
        let mut fb = FunctionBuilder::new(
            "f",
            &[("n".into(), Type::word())],
            Some(Type::word()),
        );
        let n = fb.param(0);
        let cont = fb.append_block();
        let r = fb.call("g", [n], true, cont).unwrap();
        fb.switch_to_block(cont);
        fb.ret(Some(r));
        let mut func = fb.finish();

        let changed = TailCallElim::new().run(&mut func, &mut OptimizationContext::default());
        assert!(!changed);
    }
}
