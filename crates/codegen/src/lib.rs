//! EVM bytecode generator for cantata IR.
//!
//! The pipeline per module: optimizer passes (optional, composable) over a
//! cloned module, then per function: liveness analysis, memory planning,
//! block layout, and stack-checked lowering into an assembly buffer.
//! Jump targets inside a function are patched as soon as that function's
//! block offsets are final; cross-function call targets are patched in a
//! second phase once every function has its absolute offset.
//!
//! Memory layout at runtime:
//! - `0x00..0x40`: scratch for hashing
//! - `0x40`: free-memory pointer for `allocate`
//! - `0x60`: call return-PC slot
//! - `0x80..`: statically planned value slots, one frame base per function

pub mod assemble;
pub mod critical_edge;
pub mod emit;
pub mod error;
pub(crate) mod keccak;
pub mod layout;
pub mod liveness;
pub mod memory;
pub mod opcode;
pub mod optim;
pub mod state;

pub use assemble::{compile_module, Bytecode, CompiledModule};
pub use error::CodegenError;
pub use layout::block_order;
pub use liveness::{compute_liveness, Liveness};
pub use memory::{plan_memory, MemoryPlan};
pub use opcode::{AsmInst, Opcode};
pub use optim::{optimize, OptimizationContext, Pass, Pipeline, SourceTransform, TransformKind};
