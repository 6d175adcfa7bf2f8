//! The boundary to a live or simulated EVM.
//!
//! The core never inspects opcodes or gas, only byte contents at addressed
//! locations. Every method is a single round-trip; a failing read is fatal
//! for the enclosing dereference. Implementations that talk to a remote
//! node can block inside these calls, or be wrapped by an async adapter;
//! nothing in the resolver holds state across reads.

use thiserror::Error;

use crate::data::Data;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("machine read failed: {0}")]
pub struct MachineError(pub String);

/// A byte range within a 32-byte word (stack/storage/transient reads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSlice {
    pub offset: u64,
    pub length: u64,
}

impl ByteSlice {
    pub fn full_word() -> Self {
        Self {
            offset: 0,
            length: 32,
        }
    }
}

pub trait MachineState {
    /// Bytes of the stack word `depth` entries below the top.
    fn peek_stack(&self, depth: u64, slice: ByteSlice) -> Result<Data, MachineError>;

    fn read_storage(&self, slot: &Data, slice: ByteSlice) -> Result<Data, MachineError>;

    fn read_transient(&self, slot: &Data, slice: ByteSlice) -> Result<Data, MachineError>;

    fn read_memory(&self, offset: u64, length: u64) -> Result<Data, MachineError>;

    fn read_calldata(&self, offset: u64, length: u64) -> Result<Data, MachineError>;

    fn read_returndata(&self, offset: u64, length: u64) -> Result<Data, MachineError>;

    fn read_code(&self, offset: u64, length: u64) -> Result<Data, MachineError>;
}
