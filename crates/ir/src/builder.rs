//! Convenience builder for constructing functions in SSA form.
//!
//! The IR producer (and the test suites) drive this instead of pushing
//! instructions into blocks by hand. Blocks start out terminated by a void
//! return; installing a real terminator replaces it.

use smallvec::SmallVec;

use crate::{
    debug::DebugInfo,
    function::{BlockId, Function},
    inst::{BinOp, EnvOp, Inst, OffsetExpr, Phi, Slice, SlotExpr, Terminator, UnOp},
    types::{DataLocation, Type},
    value::{Immediate, TempId, Value},
};

pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
    debug: DebugInfo,
}

impl FunctionBuilder {
    pub fn new(name: &str, params: &[(String, Type)], ret_ty: Option<Type>) -> Self {
        let func = Function::new(name, params, ret_ty);
        let current = func.entry;
        Self {
            func,
            current,
            debug: DebugInfo::none(),
        }
    }

    /// Set the debug context attached to subsequently inserted entities.
    pub fn set_debug(&mut self, debug: DebugInfo) {
        self.debug = debug;
    }

    pub fn append_block(&mut self) -> BlockId {
        self.func.make_block()
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn param(&self, idx: usize) -> Value {
        Value::Temp(self.func.params[idx].temp)
    }

    fn push(&mut self, inst: Inst) {
        self.func.block_mut(self.current).insts.push(inst);
    }

    fn fresh(&mut self) -> TempId {
        self.func.make_temp()
    }

    pub fn constant(&mut self, value: Immediate) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Const { dest, value, debug });
        Value::Temp(dest)
    }

    pub fn allocate(&mut self, size: Value) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Allocate { dest, size, debug });
        Value::Temp(dest)
    }

    pub fn read(
        &mut self,
        location: DataLocation,
        slot: Option<Value>,
        offset: Option<Value>,
        slice: Slice,
    ) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Read {
            dest,
            location,
            slot,
            offset,
            slice,
            debug,
        });
        Value::Temp(dest)
    }

    pub fn write(
        &mut self,
        location: DataLocation,
        slot: Option<Value>,
        offset: Option<Value>,
        slice: Slice,
        value: Value,
    ) {
        let debug = self.debug.clone();
        self.push(Inst::Write {
            location,
            slot,
            offset,
            slice,
            value,
            debug,
        });
    }

    pub fn compute_slot(&mut self, expr: SlotExpr) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::ComputeSlot { dest, expr, debug });
        Value::Temp(dest)
    }

    pub fn compute_offset(&mut self, expr: OffsetExpr) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::ComputeOffset { dest, expr, debug });
        Value::Temp(dest)
    }

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Binary {
            dest,
            op,
            lhs,
            rhs,
            debug,
        });
        Value::Temp(dest)
    }

    pub fn unary(&mut self, op: UnOp, arg: Value) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Unary {
            dest,
            op,
            arg,
            debug,
        });
        Value::Temp(dest)
    }

    pub fn env(&mut self, op: EnvOp) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Env { dest, op, debug });
        Value::Temp(dest)
    }

    pub fn hash(&mut self, arg: Value) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Hash { dest, arg, debug });
        Value::Temp(dest)
    }

    pub fn cast(&mut self, arg: Value, ty: Type) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Cast {
            dest,
            arg,
            ty,
            debug,
        });
        Value::Temp(dest)
    }

    pub fn length(&mut self, arg: Value, location: DataLocation) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.push(Inst::Length {
            dest,
            arg,
            location,
            debug,
        });
        Value::Temp(dest)
    }

    /// Insert a phi at the head of the current block.
    pub fn phi(&mut self, ty: Type, args: Vec<(BlockId, Value)>) -> Value {
        let dest = self.fresh();
        let debug = self.debug.clone();
        self.func.block_mut(self.current).phis.push(Phi {
            dest,
            ty,
            args,
            debug,
        });
        Value::Temp(dest)
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.func.block_mut(self.current).terminator = terminator;
    }

    pub fn jump(&mut self, target: BlockId) {
        let debug = self.debug.clone();
        self.terminate(Terminator::Jump { target, debug });
    }

    pub fn branch(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) {
        let debug = self.debug.clone();
        self.terminate(Terminator::Branch {
            cond,
            then_dest,
            else_dest,
            debug,
        });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        let debug = self.debug.clone();
        self.terminate(Terminator::Return { value, debug });
    }

    /// Call `callee`, binding its result (if the callee returns one) to a
    /// fresh temp visible from `continuation`.
    pub fn call(
        &mut self,
        callee: &str,
        args: impl IntoIterator<Item = Value>,
        returns: bool,
        continuation: BlockId,
    ) -> Option<Value> {
        let dest = returns.then(|| self.fresh());
        let debug = self.debug.clone();
        self.terminate(Terminator::Call {
            callee: callee.to_string(),
            args: args.into_iter().collect::<SmallVec<[Value; 4]>>(),
            dest,
            continuation,
            debug,
        });
        dest.map(Value::Temp)
    }

    pub fn finish(mut self) -> Function {
        self.func.recompute_preds();
        self.func
    }
}
