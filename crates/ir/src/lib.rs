pub mod builder;
pub mod debug;
pub mod function;
pub mod inst;
pub mod ir_writer;
pub mod module;
pub mod types;
pub mod value;
pub mod verify;

pub use builder::FunctionBuilder;
pub use debug::{DebugInfo, Provenance, SourceSpan};
pub use function::{Block, BlockId, Function, Param};
pub use inst::{
    BinOp, EnvOp, Inst, OffsetExpr, Phi, Slice, SlotExpr, Terminator, UnOp,
};
pub use module::Module;
pub use types::{DataLocation, Type};
pub use value::{Immediate, TempId, Value};
pub use verify::VerifyError;

pub use primitive_types::U256;
