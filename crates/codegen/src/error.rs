use cantata_ir::{BlockId, DataLocation, TempId};
use thiserror::Error;

/// Fatal code-generation errors.
///
/// All of these are compiler-internal invariant violations: the module is
/// malformed or the lowering produced an impossible stack shape. Compilation
/// of the module aborts; no partial bytecode is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("Jump target {0} not found")]
    UnresolvedJumpTarget(BlockId),

    #[error("Function {0} not found in registry")]
    UnresolvedFunctionTarget(String),

    #[error("call terminator lowered outside a function body context")]
    UnsupportedCallTerminator,

    #[error("stack underflow emitting {op}: needs {needs}, depth {depth}")]
    StackUnderflow {
        op: &'static str,
        needs: usize,
        depth: usize,
    },

    #[error("{0} is neither on the stack nor planned into memory")]
    MissingValue(TempId),

    #[error("{0} is buried {depth} deep, beyond DUP16 reach")]
    StackTooDeep { temp: TempId, depth: usize },

    #[error("byte-string constant reached the stack unhashed")]
    ByteConstantOperand,

    #[error("write to read-only location {0}")]
    ReadOnlyLocation(DataLocation),

    #[error("read/write on {0} lacks a {1} operand")]
    MissingAddress(DataLocation, &'static str),

    #[error("phi in {0} has no incoming value for predecessor {1}")]
    MissingPhiSource(BlockId, BlockId),

    #[error("jump target offset {0:#x} exceeds the PUSH2 range")]
    JumpTargetOutOfRange(usize),

    #[error("immediate wider than 32 bytes")]
    ImmediateTooWide,
}
