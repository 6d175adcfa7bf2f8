//! Instruction, phi, and terminator definitions.

use std::fmt;

use smallvec::SmallVec;

use crate::{
    debug::DebugInfo,
    function::BlockId,
    types::{DataLocation, Type},
    value::{Immediate, TempId, Value},
};

/// A static in-word byte slice for word-indexed locations.
///
/// `offset + length <= 32`. The default covers the whole word, which is the
/// shape the full-word SLOAD/SSTORE fast path keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slice {
    pub offset: u8,
    pub length: u8,
}

impl Slice {
    pub fn new(offset: u8, length: u8) -> Self {
        debug_assert!(offset as u16 + length as u16 <= 32);
        Self { offset, length }
    }

    pub fn full_word(&self) -> bool {
        self.offset == 0 && self.length == 32
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self {
            offset: 0,
            length: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    SDiv,
    Mod,
    SMod,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
}

impl BinOp {
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            Self::Add | Self::Mul | Self::Eq | Self::And | Self::Or | Self::Xor
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    /// Logical negation: nonzero -> 0, zero -> 1.
    IsZero,
    /// Bitwise complement.
    Not,
    /// Two's-complement negation.
    Neg,
}

/// Environment reads exposed to the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvOp {
    Caller,
    CallValue,
    CallDataSize,
    Origin,
    Address,
    Timestamp,
    Number,
    GasPrice,
}

/// How a storage slot is derived from a base slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotExpr {
    /// `keccak256(pad32(key) ++ pad32(base))`.
    Mapping { base: Value, key: Value },
    /// `keccak256(pad32(base))`: first element slot of a dynamic array.
    Array { base: Value },
    /// `base + delta` for a struct field at a constant slot delta.
    Field { base: Value, delta: u32 },
}

/// How a byte offset is derived from a base offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OffsetExpr {
    /// `base + index * stride`.
    Array {
        base: Value,
        index: Value,
        stride: u32,
    },
    /// `base + offset` for a struct field at a constant byte offset.
    Field { base: Value, offset: u32 },
    /// `base + byte` for a dynamic byte displacement.
    Byte { base: Value, byte: Value },
}

/// An IR instruction.
///
/// Every variant that produces a value names its `dest` temp; `write` is the
/// only side-effecting variant. All variants carry a [`DebugInfo`].
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Const {
        dest: TempId,
        value: Immediate,
        debug: DebugInfo,
    },

    /// Reserve `size` bytes of linear memory; `dest` is the base offset.
    Allocate {
        dest: TempId,
        size: Value,
        debug: DebugInfo,
    },

    /// Read bytes out of a data location.
    ///
    /// Word-indexed locations use `slot` + `slice`; byte-indexed locations
    /// use `offset` as a dynamic byte address and ignore `slice`.
    Read {
        dest: TempId,
        location: DataLocation,
        slot: Option<Value>,
        offset: Option<Value>,
        slice: Slice,
        debug: DebugInfo,
    },

    /// Write `value` into a data location, addressed as in `Read`.
    Write {
        location: DataLocation,
        slot: Option<Value>,
        offset: Option<Value>,
        slice: Slice,
        value: Value,
        debug: DebugInfo,
    },

    ComputeSlot {
        dest: TempId,
        expr: SlotExpr,
        debug: DebugInfo,
    },

    ComputeOffset {
        dest: TempId,
        expr: OffsetExpr,
        debug: DebugInfo,
    },

    Binary {
        dest: TempId,
        op: BinOp,
        lhs: Value,
        rhs: Value,
        debug: DebugInfo,
    },

    Unary {
        dest: TempId,
        op: UnOp,
        arg: Value,
        debug: DebugInfo,
    },

    Env {
        dest: TempId,
        op: EnvOp,
        debug: DebugInfo,
    },

    /// keccak256 of the operand: a word is hashed as its 32-byte padded
    /// form; a byte-string constant is hashed as-is.
    Hash {
        dest: TempId,
        arg: Value,
        debug: DebugInfo,
    },

    Cast {
        dest: TempId,
        arg: Value,
        ty: Type,
        debug: DebugInfo,
    },

    /// Length of the aggregate a reference points at, read from its
    /// location's length word.
    Length {
        dest: TempId,
        arg: Value,
        location: DataLocation,
        debug: DebugInfo,
    },
}

impl Inst {
    /// The temp this instruction defines, if any.
    pub fn dest(&self) -> Option<TempId> {
        match self {
            Self::Const { dest, .. }
            | Self::Allocate { dest, .. }
            | Self::Read { dest, .. }
            | Self::ComputeSlot { dest, .. }
            | Self::ComputeOffset { dest, .. }
            | Self::Binary { dest, .. }
            | Self::Unary { dest, .. }
            | Self::Env { dest, .. }
            | Self::Hash { dest, .. }
            | Self::Cast { dest, .. }
            | Self::Length { dest, .. } => Some(*dest),
            Self::Write { .. } => None,
        }
    }

    pub fn debug(&self) -> &DebugInfo {
        match self {
            Self::Const { debug, .. }
            | Self::Allocate { debug, .. }
            | Self::Read { debug, .. }
            | Self::Write { debug, .. }
            | Self::ComputeSlot { debug, .. }
            | Self::ComputeOffset { debug, .. }
            | Self::Binary { debug, .. }
            | Self::Unary { debug, .. }
            | Self::Env { debug, .. }
            | Self::Hash { debug, .. }
            | Self::Cast { debug, .. }
            | Self::Length { debug, .. } => debug,
        }
    }

    pub fn debug_mut(&mut self) -> &mut DebugInfo {
        match self {
            Self::Const { debug, .. }
            | Self::Allocate { debug, .. }
            | Self::Read { debug, .. }
            | Self::Write { debug, .. }
            | Self::ComputeSlot { debug, .. }
            | Self::ComputeOffset { debug, .. }
            | Self::Binary { debug, .. }
            | Self::Unary { debug, .. }
            | Self::Env { debug, .. }
            | Self::Hash { debug, .. }
            | Self::Cast { debug, .. }
            | Self::Length { debug, .. } => debug,
        }
    }

    /// `true` for instructions other passes must not move or fold away.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Visit every operand value.
    pub fn for_each_value(&self, mut f: impl FnMut(&Value)) {
        match self {
            Self::Const { .. } | Self::Env { .. } => {}
            Self::Allocate { size, .. } => f(size),
            Self::Read { slot, offset, .. } => {
                if let Some(slot) = slot {
                    f(slot);
                }
                if let Some(offset) = offset {
                    f(offset);
                }
            }
            Self::Write {
                slot,
                offset,
                value,
                ..
            } => {
                if let Some(slot) = slot {
                    f(slot);
                }
                if let Some(offset) = offset {
                    f(offset);
                }
                f(value);
            }
            Self::ComputeSlot { expr, .. } => match expr {
                SlotExpr::Mapping { base, key } => {
                    f(base);
                    f(key);
                }
                SlotExpr::Array { base } | SlotExpr::Field { base, .. } => f(base),
            },
            Self::ComputeOffset { expr, .. } => match expr {
                OffsetExpr::Array { base, index, .. } => {
                    f(base);
                    f(index);
                }
                OffsetExpr::Field { base, .. } => f(base),
                OffsetExpr::Byte { base, byte } => {
                    f(base);
                    f(byte);
                }
            },
            Self::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Self::Unary { arg, .. }
            | Self::Hash { arg, .. }
            | Self::Cast { arg, .. }
            | Self::Length { arg, .. } => f(arg),
        }
    }

    /// Visit every operand value mutably (constant propagation rewrites
    /// operands through this).
    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Self::Const { .. } | Self::Env { .. } => {}
            Self::Allocate { size, .. } => f(size),
            Self::Read { slot, offset, .. } => {
                if let Some(slot) = slot {
                    f(slot);
                }
                if let Some(offset) = offset {
                    f(offset);
                }
            }
            Self::Write {
                slot,
                offset,
                value,
                ..
            } => {
                if let Some(slot) = slot {
                    f(slot);
                }
                if let Some(offset) = offset {
                    f(offset);
                }
                f(value);
            }
            Self::ComputeSlot { expr, .. } => match expr {
                SlotExpr::Mapping { base, key } => {
                    f(base);
                    f(key);
                }
                SlotExpr::Array { base } | SlotExpr::Field { base, .. } => f(base),
            },
            Self::ComputeOffset { expr, .. } => match expr {
                OffsetExpr::Array { base, index, .. } => {
                    f(base);
                    f(index);
                }
                OffsetExpr::Field { base, .. } => f(base),
                OffsetExpr::Byte { base, byte } => {
                    f(base);
                    f(byte);
                }
            },
            Self::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            Self::Unary { arg, .. }
            | Self::Hash { arg, .. }
            | Self::Cast { arg, .. }
            | Self::Length { arg, .. } => f(arg),
        }
    }
}

/// An SSA phi node, selecting a value by predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    pub dest: TempId,
    pub ty: Type,
    /// Predecessor block -> incoming value, in declaration order.
    pub args: Vec<(BlockId, Value)>,
    pub debug: DebugInfo,
}

impl Phi {
    pub fn value_for(&self, pred: BlockId) -> Option<&Value> {
        self.args
            .iter()
            .find(|(block, _)| *block == pred)
            .map(|(_, value)| value)
    }
}

/// Block terminator. Every block has exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump {
        target: BlockId,
        debug: DebugInfo,
    },

    Branch {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
        debug: DebugInfo,
    },

    Return {
        value: Option<Value>,
        debug: DebugInfo,
    },

    /// Call a user function by name. Control resumes at `continuation`,
    /// where `dest` (if any) is bound to the callee's return value.
    Call {
        callee: String,
        args: SmallVec<[Value; 4]>,
        dest: Option<TempId>,
        continuation: BlockId,
        debug: DebugInfo,
    },
}

impl Terminator {
    /// Successor blocks in branch-order.
    pub fn dests(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Self::Jump { target, .. } => smallvec::smallvec![*target],
            Self::Branch {
                then_dest,
                else_dest,
                ..
            } => smallvec::smallvec![*then_dest, *else_dest],
            Self::Return { .. } => SmallVec::new(),
            Self::Call { continuation, .. } => smallvec::smallvec![*continuation],
        }
    }

    /// Rewrite every successor equal to `from` into `to`.
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        match self {
            Self::Jump { target, .. } => {
                if *target == from {
                    *target = to;
                }
            }
            Self::Branch {
                then_dest,
                else_dest,
                ..
            } => {
                if *then_dest == from {
                    *then_dest = to;
                }
                if *else_dest == from {
                    *else_dest = to;
                }
            }
            Self::Return { .. } => {}
            Self::Call { continuation, .. } => {
                if *continuation == from {
                    *continuation = to;
                }
            }
        }
    }

    /// The temp this terminator defines (`call` results only).
    pub fn dest(&self) -> Option<TempId> {
        match self {
            Self::Call { dest, .. } => *dest,
            _ => None,
        }
    }

    pub fn debug(&self) -> &DebugInfo {
        match self {
            Self::Jump { debug, .. }
            | Self::Branch { debug, .. }
            | Self::Return { debug, .. }
            | Self::Call { debug, .. } => debug,
        }
    }

    pub fn for_each_value(&self, mut f: impl FnMut(&Value)) {
        match self {
            Self::Jump { .. } => {}
            Self::Branch { cond, .. } => f(cond),
            Self::Return { value, .. } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            Self::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
        }
    }

    pub fn for_each_value_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Self::Jump { .. } => {}
            Self::Branch { cond, .. } => f(cond),
            Self::Return { value, .. } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            Self::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::SDiv => "sdiv",
            Self::Mod => "mod",
            Self::SMod => "smod",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::SLt => "slt",
            Self::SGt => "sgt",
            Self::Eq => "eq",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Sar => "sar",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IsZero => "iszero",
            Self::Not => "not",
            Self::Neg => "neg",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for EnvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Caller => "caller",
            Self::CallValue => "callvalue",
            Self::CallDataSize => "calldatasize",
            Self::Origin => "origin",
            Self::Address => "address",
            Self::Timestamp => "timestamp",
            Self::Number => "number",
            Self::GasPrice => "gasprice",
        };
        write!(f, "{s}")
    }
}
