//! Optimization passes over IR modules.
//!
//! Each pass maps a well-formed SSA module to another well-formed SSA module
//! and records how it moved source provenance around, so the debug pipeline
//! can reconstruct source mappings after any composition of passes. Passes
//! never fail: an input they cannot improve is left alone.

pub mod constant_folding;
pub mod constant_propagation;
pub mod jump_threading;
pub mod pipeline;
pub mod tail_call;

pub use constant_folding::ConstantFolding;
pub use constant_propagation::ConstantPropagation;
pub use jump_threading::JumpThreading;
pub use pipeline::{optimize, Pass, Pipeline};
pub use tail_call::TailCallElim;

use cantata_ir::Provenance;

/// How a rewrite affected the source mapping of the involved entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Move,
    Merge,
    Delete,
    Split,
    Replace,
}

/// One recorded provenance transformation.
#[derive(Debug, Clone)]
pub struct SourceTransform {
    pub kind: TransformKind,
    pub from: Provenance,
    pub to: Provenance,
    pub reason: &'static str,
}

/// Shared accumulator all passes append their [`SourceTransform`]s into.
#[derive(Debug, Default)]
pub struct OptimizationContext {
    pub transforms: Vec<SourceTransform>,
}

impl OptimizationContext {
    pub fn record(
        &mut self,
        kind: TransformKind,
        from: Provenance,
        to: Provenance,
        reason: &'static str,
    ) {
        self.transforms.push(SourceTransform {
            kind,
            from,
            to,
            reason,
        });
    }
}
