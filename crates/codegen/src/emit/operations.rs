//! Lowering of individual IR instructions to opcode sequences.

use cantata_ir::{
    BinOp, DataLocation, EnvOp, Immediate, Inst, OffsetExpr, Slice, SlotExpr, Type, UnOp, U256,
    Value,
};

use crate::{
    error::CodegenError,
    keccak::keccak256_word,
    memory::SCRATCH_BASE,
    opcode::Opcode,
    state::State,
};

use super::FuncEmitter;

pub(super) fn emit_inst(
    em: &FuncEmitter<'_>,
    state: State,
    inst: &Inst,
) -> Result<State, CodegenError> {
    match inst {
        Inst::Const { dest, value, .. } => match value {
            Immediate::Num(n) => {
                let state = state.push_num(*n)?;
                em.bind_dest(state, *dest)
            }
            // Byte-string constants have no stack representation; `hash`
            // lowers them through `const_bytes`.
            Immediate::Bytes(_) => Ok(state),
        },

        Inst::Allocate { dest, size, .. } => {
            // dest = mload(fp); fp = dest + size
            let state = state
                .push_usize(crate::memory::FREE_PTR_SLOT as usize)?
                .op(Opcode::MLoad)?
                .op(Opcode::Dup(1))?;
            let state = em.push_value(state, size)?;
            let state = state
                .op(Opcode::Add)?
                .push_usize(crate::memory::FREE_PTR_SLOT as usize)?
                .op(Opcode::MStore)?;
            em.bind_dest(state, *dest)
        }

        Inst::Read {
            dest,
            location,
            slot,
            offset,
            slice,
            ..
        } => {
            let state = emit_read(em, state, *location, slot, offset, *slice)?;
            em.bind_dest(state, *dest)
        }

        Inst::Write {
            location,
            slot,
            offset,
            slice,
            value,
            ..
        } => emit_write(em, state, *location, slot, offset, *slice, value),

        Inst::ComputeSlot { dest, expr, .. } => {
            let state = emit_compute_slot(em, state, expr)?;
            em.bind_dest(state, *dest)
        }

        Inst::ComputeOffset { dest, expr, .. } => {
            let state = emit_compute_offset(em, state, expr)?;
            em.bind_dest(state, *dest)
        }

        Inst::Binary {
            dest, op, lhs, rhs, ..
        } => {
            // Shifts take the shift amount on top; everything else takes
            // the left operand on top.
            let state = match op {
                BinOp::Shl | BinOp::Shr | BinOp::Sar => {
                    let state = em.push_value(state, lhs)?;
                    em.push_value(state, rhs)?
                }
                _ => {
                    let state = em.push_value(state, rhs)?;
                    em.push_value(state, lhs)?
                }
            };
            let state = state.op(binop_opcode(*op))?;
            em.bind_dest(state, *dest)
        }

        Inst::Unary { dest, op, arg, .. } => {
            let state = match op {
                UnOp::IsZero => em.push_value(state, arg)?.op(Opcode::IsZero)?,
                UnOp::Not => em.push_value(state, arg)?.op(Opcode::Not)?,
                UnOp::Neg => {
                    // 0 - arg
                    let state = em.push_value(state, arg)?;
                    state.push_num(U256::zero())?.op(Opcode::Sub)?
                }
            };
            em.bind_dest(state, *dest)
        }

        Inst::Env { dest, op, .. } => {
            let state = state.op(env_opcode(*op))?;
            em.bind_dest(state, *dest)
        }

        Inst::Hash { dest, arg, .. } => {
            // A statically known byte string hashes at compile time; a word
            // round-trips through scratch memory.
            let folded = match arg {
                Value::Const(Immediate::Bytes(b)) => Some(keccak256_word(b)),
                Value::Temp(t) => em.const_bytes.get(t).map(|b| keccak256_word(b)),
                Value::Const(Immediate::Num(_)) => None,
            };
            let state = match folded {
                Some(digest) => state.push_num(digest)?,
                None => {
                    let state = em.push_value(state, arg)?;
                    state
                        .push_usize(SCRATCH_BASE as usize)?
                        .op(Opcode::MStore)?
                        .push_usize(32)?
                        .push_usize(SCRATCH_BASE as usize)?
                        .op(Opcode::Keccak256)?
                }
            };
            em.bind_dest(state, *dest)
        }

        Inst::Cast { dest, arg, ty, .. } => {
            let state = em.push_value(state, arg)?;
            let state = emit_cast(state, *ty)?;
            em.bind_dest(state, *dest)
        }

        Inst::Length {
            dest,
            arg,
            location,
            ..
        } => {
            // The length word sits at the reference itself.
            let state = match location {
                DataLocation::Memory => em.push_value(state, arg)?.op(Opcode::MLoad)?,
                DataLocation::Storage => em.push_value(state, arg)?.op(Opcode::SLoad)?,
                DataLocation::Transient => em.push_value(state, arg)?.op(Opcode::TLoad)?,
                DataLocation::Calldata => em.push_value(state, arg)?.op(Opcode::CallDataLoad)?,
                DataLocation::Returndata | DataLocation::Code => {
                    copy_word_to_scratch(em, state, *location, arg)?
                }
            };
            em.bind_dest(state, *dest)
        }
    }
}

fn emit_read(
    em: &FuncEmitter<'_>,
    state: State,
    location: DataLocation,
    slot: &Option<Value>,
    offset: &Option<Value>,
    slice: Slice,
) -> Result<State, CodegenError> {
    match location {
        DataLocation::Storage | DataLocation::Transient => {
            let slot = require_addr(slot, location, "slot")?;
            let load = if location == DataLocation::Storage {
                Opcode::SLoad
            } else {
                Opcode::TLoad
            };
            let state = em.push_value(state, slot)?.op(load)?;
            if slice.full_word() {
                Ok(state)
            } else {
                // Shift the slice down to bit 0, then mask it out.
                let shift = word_shift_bits(slice);
                let state = state.push_num(U256::from(shift))?.op(Opcode::Shr)?;
                state.push_num(value_mask(slice.length))?.op(Opcode::And)
            }
        }
        DataLocation::Memory => {
            let offset = require_addr(offset, location, "offset")?;
            em.push_value(state, offset)?.op(Opcode::MLoad)
        }
        DataLocation::Calldata => {
            let offset = require_addr(offset, location, "offset")?;
            em.push_value(state, offset)?.op(Opcode::CallDataLoad)
        }
        DataLocation::Returndata | DataLocation::Code => {
            let offset = require_addr(offset, location, "offset")?;
            copy_word_to_scratch(em, state, location, offset)
        }
    }
}

/// Copy one word from a copy-only location into scratch and load it.
fn copy_word_to_scratch(
    em: &FuncEmitter<'_>,
    state: State,
    location: DataLocation,
    offset: &Value,
) -> Result<State, CodegenError> {
    let copy = if location == DataLocation::Returndata {
        Opcode::ReturnDataCopy
    } else {
        Opcode::CodeCopy
    };
    let state = state.push_usize(32)?;
    let state = em.push_value(state, offset)?;
    state
        .push_usize(SCRATCH_BASE as usize)?
        .op(copy)?
        .push_usize(SCRATCH_BASE as usize)?
        .op(Opcode::MLoad)
}

fn emit_write(
    em: &FuncEmitter<'_>,
    state: State,
    location: DataLocation,
    slot: &Option<Value>,
    offset: &Option<Value>,
    slice: Slice,
    value: &Value,
) -> Result<State, CodegenError> {
    match location {
        DataLocation::Storage | DataLocation::Transient => {
            let slot = require_addr(slot, location, "slot")?;
            let (load, store) = if location == DataLocation::Storage {
                (Opcode::SLoad, Opcode::SStore)
            } else {
                (Opcode::TLoad, Opcode::TStore)
            };
            if slice.full_word() {
                let state = em.push_value(state, value)?;
                return em.push_value(state, slot)?.op(store);
            }

            // Read-modify-write: clear the slice bits in the current word,
            // OR in the new value shifted into position.
            let shift = word_shift_bits(slice);
            let vmask = value_mask(slice.length);
            let state = em.push_value(state, slot)?;
            let state = state.op(Opcode::Dup(1))?.op(load)?;
            let state = state.push_num(!(vmask << shift))?.op(Opcode::And)?;
            let state = em.push_value(state, value)?;
            let state = state.push_num(vmask)?.op(Opcode::And)?;
            let state = state.push_num(U256::from(shift))?.op(Opcode::Shl)?;
            state.op(Opcode::Or)?.op(Opcode::Swap(1))?.op(store)
        }
        DataLocation::Memory => {
            let offset = require_addr(offset, location, "offset")?;
            let state = em.push_value(state, value)?;
            em.push_value(state, offset)?.op(Opcode::MStore)
        }
        DataLocation::Calldata | DataLocation::Returndata | DataLocation::Code => {
            Err(CodegenError::ReadOnlyLocation(location))
        }
    }
}

fn emit_compute_slot(
    em: &FuncEmitter<'_>,
    state: State,
    expr: &SlotExpr,
) -> Result<State, CodegenError> {
    match expr {
        SlotExpr::Mapping { base, key } => {
            // keccak256(pad32(key) ++ pad32(slot))
            let state = em.push_value(state, key)?;
            let state = state.push_usize(SCRATCH_BASE as usize)?.op(Opcode::MStore)?;
            let state = em.push_value(state, base)?;
            let state = state
                .push_usize(SCRATCH_BASE as usize + 0x20)?
                .op(Opcode::MStore)?;
            state
                .push_usize(0x40)?
                .push_usize(SCRATCH_BASE as usize)?
                .op(Opcode::Keccak256)
        }
        SlotExpr::Array { base } => {
            // keccak256(pad32(slot)): slot of element zero.
            let state = em.push_value(state, base)?;
            let state = state.push_usize(SCRATCH_BASE as usize)?.op(Opcode::MStore)?;
            state
                .push_usize(0x20)?
                .push_usize(SCRATCH_BASE as usize)?
                .op(Opcode::Keccak256)
        }
        SlotExpr::Field { base, delta } => {
            let state = state.push_usize(*delta as usize)?;
            em.push_value(state, base)?.op(Opcode::Add)
        }
    }
}

fn emit_compute_offset(
    em: &FuncEmitter<'_>,
    state: State,
    expr: &OffsetExpr,
) -> Result<State, CodegenError> {
    match expr {
        OffsetExpr::Array {
            base,
            index,
            stride,
        } => {
            let state = state.push_usize(*stride as usize)?;
            let state = em.push_value(state, index)?.op(Opcode::Mul)?;
            em.push_value(state, base)?.op(Opcode::Add)
        }
        OffsetExpr::Field { base, offset } => {
            let state = state.push_usize(*offset as usize)?;
            em.push_value(state, base)?.op(Opcode::Add)
        }
        OffsetExpr::Byte { base, byte } => {
            let state = em.push_value(state, byte)?;
            em.push_value(state, base)?.op(Opcode::Add)
        }
    }
}

fn emit_cast(state: State, ty: Type) -> Result<State, CodegenError> {
    match ty {
        Type::Uint { bits } if bits < 256 => {
            state.push_num(low_bits_mask(bits))?.op(Opcode::And)
        }
        Type::Int { bits } if bits < 256 => {
            // SIGNEXTEND takes the index of the sign byte on top.
            let sign_byte = u64::from(bits / 8 - 1);
            state.push_num(U256::from(sign_byte))?.op(Opcode::SignExtend)
        }
        Type::Bool => state.op(Opcode::IsZero)?.op(Opcode::IsZero),
        Type::Address => state.push_num(low_bits_mask(160))?.op(Opcode::And),
        Type::FixedBytes { size } if size < 32 => {
            // bytesN values are left-aligned in the word.
            let mask = low_bits_mask(u16::from(size) * 8) << (256 - usize::from(size) * 8);
            state.push_num(mask)?.op(Opcode::And)
        }
        _ => Ok(state),
    }
}

/// Bits to shift a big-endian in-word slice down to bit zero.
fn word_shift_bits(slice: Slice) -> u64 {
    (32 - u64::from(slice.offset) - u64::from(slice.length)) * 8
}

/// Mask covering the low `length` bytes.
fn value_mask(length: u8) -> U256 {
    debug_assert!(length < 32);
    (U256::one() << (u64::from(length) * 8)) - U256::one()
}

fn low_bits_mask(bits: u16) -> U256 {
    debug_assert!(bits < 256);
    (U256::one() << bits) - U256::one()
}

fn binop_opcode(op: BinOp) -> Opcode {
    match op {
        BinOp::Add => Opcode::Add,
        BinOp::Sub => Opcode::Sub,
        BinOp::Mul => Opcode::Mul,
        BinOp::Div => Opcode::Div,
        BinOp::SDiv => Opcode::SDiv,
        BinOp::Mod => Opcode::Mod,
        BinOp::SMod => Opcode::SMod,
        BinOp::Lt => Opcode::Lt,
        BinOp::Gt => Opcode::Gt,
        BinOp::SLt => Opcode::SLt,
        BinOp::SGt => Opcode::SGt,
        BinOp::Eq => Opcode::Eq,
        BinOp::And => Opcode::And,
        BinOp::Or => Opcode::Or,
        BinOp::Xor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => Opcode::Shr,
        BinOp::Sar => Opcode::Sar,
    }
}

fn env_opcode(op: EnvOp) -> Opcode {
    match op {
        EnvOp::Caller => Opcode::Caller,
        EnvOp::CallValue => Opcode::CallValue,
        EnvOp::CallDataSize => Opcode::CallDataSize,
        EnvOp::Origin => Opcode::Origin,
        EnvOp::Address => Opcode::Address,
        EnvOp::Timestamp => Opcode::Timestamp,
        EnvOp::Number => Opcode::Number,
        EnvOp::GasPrice => Opcode::GasPrice,
    }
}

fn require_addr<'v>(
    addr: &'v Option<Value>,
    location: DataLocation,
    field: &'static str,
) -> Result<&'v Value, CodegenError> {
    addr.as_ref()
        .ok_or(CodegenError::MissingAddress(location, field))
}
