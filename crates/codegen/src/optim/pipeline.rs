//! Pass sequencing.
//!
//! [`Pass`] names one rewrite; [`Pipeline`] holds an ordered sequence and
//! runs it over every function of a module. Passes assume nothing beyond a
//! well-formed SSA module, so any ordering is legal; the default order runs
//! the value-level passes before the control-flow ones so threading sees
//! branches that folding may have made trivial.

use cantata_ir::Module;

use super::{
    ConstantFolding, ConstantPropagation, JumpThreading, OptimizationContext, TailCallElim,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    ConstantFolding,
    ConstantPropagation,
    JumpThreading,
    TailCallElim,
}

pub struct Pipeline {
    steps: Vec<Pass>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// The reference ordering: fold, propagate, thread, then de-recurse.
    pub fn default_pipeline() -> Self {
        let mut p = Self::new();
        p.add_step(Pass::ConstantFolding)
            .add_step(Pass::ConstantPropagation)
            .add_step(Pass::JumpThreading)
            .add_step(Pass::TailCallElim);
        p
    }

    pub fn add_step(&mut self, pass: Pass) -> &mut Self {
        self.steps.push(pass);
        self
    }

    /// Run every step over every function, accumulating transforms in `ctx`.
    pub fn run(&self, module: &mut Module, ctx: &mut OptimizationContext) -> bool {
        let mut changed = false;
        for &pass in &self.steps {
            for func in module.iter_functions_mut() {
                changed |= match pass {
                    Pass::ConstantFolding => ConstantFolding::new().run(func, ctx),
                    Pass::ConstantPropagation => ConstantPropagation::new().run(func, ctx),
                    Pass::JumpThreading => JumpThreading::new().run(func, ctx),
                    Pass::TailCallElim => TailCallElim::new().run(func, ctx),
                };
            }
        }
        changed
    }
}

impl Default for Pipeline {
    /// Returns [`Pipeline::default_pipeline`], not an empty pipeline.
    fn default() -> Self {
        Self::default_pipeline()
    }
}

/// Run `pipeline` over a clone of `module`, leaving the input untouched.
pub fn optimize(module: &Module, pipeline: &Pipeline) -> (Module, OptimizationContext) {
    let mut out = module.clone();
    let mut ctx = OptimizationContext::default();
    pipeline.run(&mut out, &mut ctx);
    (out, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantata_ir::{BinOp, FunctionBuilder, Module, Type, Value};

    fn arithmetic_module() -> Module {
        let mut fb = FunctionBuilder::new("main", &[], Some(Type::word()));
        let a = fb.constant(6u64.into());
        let b = fb.constant(7u64.into());
        let p = fb.binary(BinOp::Mul, a, b);
        let hop = fb.append_block();
        let real = fb.append_block();
        fb.jump(hop);
        fb.switch_to_block(hop);
        fb.jump(real);
        fb.switch_to_block(real);
        fb.ret(Some(p));
        Module::new(fb.finish())
    }

    #[test]
    fn default_pipeline_folds_and_threads() {
        let module = arithmetic_module();
        let (out, ctx) = optimize(&module, &Pipeline::default_pipeline());

        // The hop block is gone and the multiply became a constant.
        assert_eq!(out.main.blocks.len(), 2);
        assert!(ctx
            .transforms
            .iter()
            .any(|t| t.reason == "constant folding"));
        assert!(ctx
            .transforms
            .iter()
            .any(|t| t.reason == "jump threading"));
        // The input module was not modified.
        assert_eq!(module.main.blocks.len(), 3);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let module = arithmetic_module();
        let (out, ctx) = optimize(&module, &Pipeline::new());
        assert_eq!(out.main.blocks.len(), module.main.blocks.len());
        assert!(ctx.transforms.is_empty());
    }

    #[test]
    fn passes_compose_in_any_order() {
        let module = arithmetic_module();
        let mut reversed = Pipeline::new();
        reversed
            .add_step(Pass::TailCallElim)
            .add_step(Pass::JumpThreading)
            .add_step(Pass::ConstantPropagation)
            .add_step(Pass::ConstantFolding);
        let (out, _) = optimize(&module, &reversed);
        assert_eq!(out.main.blocks.len(), 2);
        assert_eq!(
            cantata_ir::verify::verify_function(&out.main),
            Ok(())
        );
    }

    #[test]
    fn propagation_feeds_branch_conditions() {
        let mut fb = FunctionBuilder::new("main", &[], None);
        let cond = fb.constant(0u64.into());
        let t = fb.append_block();
        let e = fb.append_block();
        fb.branch(cond, t, e);
        fb.switch_to_block(t);
        fb.ret(None);
        fb.switch_to_block(e);
        fb.ret(None);
        let module = Module::new(fb.finish());

        let (out, _) = optimize(&module, &Pipeline::default_pipeline());
        // The condition operand is now an inline constant.
        let term = &out.main.block(out.main.entry).terminator;
        let cantata_ir::Terminator::Branch { cond, .. } = term else {
            panic!("branch survives (no branch folding pass)");
        };
        assert_eq!(cond.as_num(), Some(0u64.into()));
    }
}
