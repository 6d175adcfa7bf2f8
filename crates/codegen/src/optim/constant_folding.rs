//! Constant folding.
//!
//! Tracks every const-defining temp in the function (SSA: the binding never
//! changes, so nothing invalidates it) and folds instructions whose operands
//! are all statically known. Division and modulo by zero are left as runtime
//! instructions. `hash` folds when its input is a known byte-string
//! constant. Array lengths are never folded; see [`fold_length`].

use cantata_ir::{BinOp, Function, Immediate, Inst, TempId, UnOp, U256, Value};
use rustc_hash::FxHashMap;

use crate::keccak::keccak256_word;

use super::{OptimizationContext, TransformKind};

#[derive(Debug, Default)]
pub struct ConstantFolding;

impl ConstantFolding {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&mut self, func: &mut Function, ctx: &mut OptimizationContext) -> bool {
        let mut consts: FxHashMap<TempId, Immediate> = FxHashMap::default();
        let mut changed = false;

        // Blocks in id order; SSA guarantees a definition precedes its uses
        // on every path, so a miss here only delays a fold to the next run.
        let ids: Vec<_> = func.block_ids().collect();
        for id in ids {
            let block = func.block_mut(id);
            for inst in &mut block.insts {
                if let Inst::Const { dest, value, .. } = inst {
                    consts.insert(*dest, value.clone());
                    continue;
                }

                let Some(folded) = fold_inst(inst, &consts) else {
                    continue;
                };
                let dest = inst
                    .dest()
                    .expect("foldable instructions produce a value");
                let debug = inst.debug().clone();
                ctx.record(
                    TransformKind::Replace,
                    debug.combined(),
                    debug.combined(),
                    "constant folding",
                );
                consts.insert(dest, folded.clone());
                *inst = Inst::Const {
                    dest,
                    value: folded,
                    debug,
                };
                changed = true;
            }
        }

        changed
    }
}

fn fold_inst(inst: &Inst, consts: &FxHashMap<TempId, Immediate>) -> Option<Immediate> {
    let imm_of = |value: &Value| -> Option<Immediate> {
        match value {
            Value::Const(imm) => Some(imm.clone()),
            Value::Temp(t) => consts.get(t).cloned(),
        }
    };
    let num_of = |value: &Value| imm_of(value).and_then(|imm| imm.as_num());

    match inst {
        Inst::Binary { op, lhs, rhs, .. } => {
            let lhs = num_of(lhs)?;
            let rhs = num_of(rhs)?;
            fold_binop(*op, lhs, rhs).map(Immediate::Num)
        }

        Inst::Unary { op, arg, .. } => {
            let arg = num_of(arg)?;
            Some(Immediate::Num(match op {
                UnOp::IsZero => bool_word(arg.is_zero()),
                UnOp::Not => !arg,
                UnOp::Neg => neg(arg),
            }))
        }

        Inst::Hash { arg, .. } => match imm_of(arg)? {
            Immediate::Bytes(bytes) => Some(Immediate::Num(keccak256_word(&bytes))),
            // Hashing a word still goes through scratch memory at runtime.
            Immediate::Num(_) => None,
        },

        Inst::Length { .. } => fold_length(),

        _ => None,
    }
}

/// Array-length folding is disabled: deciding that a length is static needs
/// origin-type propagation the IR does not carry yet, and folding a dynamic
/// length would be unsound. Revisit once reference types track their element
/// counts.
fn fold_length() -> Option<Immediate> {
    None
}

fn fold_binop(op: BinOp, lhs: U256, rhs: U256) -> Option<U256> {
    Some(match op {
        BinOp::Add => lhs.overflowing_add(rhs).0,
        BinOp::Sub => lhs.overflowing_sub(rhs).0,
        BinOp::Mul => lhs.overflowing_mul(rhs).0,
        // Division and modulo by zero stay runtime instructions.
        BinOp::Div => {
            if rhs.is_zero() {
                return None;
            }
            lhs / rhs
        }
        BinOp::SDiv => {
            if rhs.is_zero() {
                return None;
            }
            sdiv(lhs, rhs)
        }
        BinOp::Mod => {
            if rhs.is_zero() {
                return None;
            }
            lhs % rhs
        }
        BinOp::SMod => {
            if rhs.is_zero() {
                return None;
            }
            smod(lhs, rhs)
        }
        BinOp::Lt => bool_word(lhs < rhs),
        BinOp::Gt => bool_word(lhs > rhs),
        BinOp::SLt => bool_word(slt(lhs, rhs)),
        BinOp::SGt => bool_word(slt(rhs, lhs)),
        BinOp::Eq => bool_word(lhs == rhs),
        BinOp::And => lhs & rhs,
        BinOp::Or => lhs | rhs,
        BinOp::Xor => lhs ^ rhs,
        BinOp::Shl => {
            if rhs >= U256::from(256u64) {
                U256::zero()
            } else {
                lhs << rhs.low_u64() as usize
            }
        }
        BinOp::Shr => {
            if rhs >= U256::from(256u64) {
                U256::zero()
            } else {
                lhs >> rhs.low_u64() as usize
            }
        }
        BinOp::Sar => sar(lhs, rhs),
    })
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

fn is_neg(x: U256) -> bool {
    x.bit(255)
}

fn neg(x: U256) -> U256 {
    (!x).overflowing_add(U256::one()).0
}

fn abs(x: U256) -> U256 {
    if is_neg(x) {
        neg(x)
    } else {
        x
    }
}

fn slt(lhs: U256, rhs: U256) -> bool {
    match (is_neg(lhs), is_neg(rhs)) {
        (true, false) => true,
        (false, true) => false,
        // Two's complement ordering matches unsigned ordering within a sign.
        _ => lhs < rhs,
    }
}

fn sdiv(lhs: U256, rhs: U256) -> U256 {
    let q = abs(lhs) / abs(rhs);
    if is_neg(lhs) != is_neg(rhs) {
        neg(q)
    } else {
        q
    }
}

fn smod(lhs: U256, rhs: U256) -> U256 {
    let r = abs(lhs) % abs(rhs);
    if is_neg(lhs) {
        neg(r)
    } else {
        r
    }
}

fn sar(lhs: U256, rhs: U256) -> U256 {
    let negative = is_neg(lhs);
    if rhs >= U256::from(256u64) {
        return if negative { !U256::zero() } else { U256::zero() };
    }
    let shift = rhs.low_u64() as usize;
    if shift == 0 {
        return lhs;
    }
    let logical = lhs >> shift;
    if negative {
        logical | (!U256::zero() << (256 - shift))
    } else {
        logical
    }
}
