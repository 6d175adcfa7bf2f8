//! Function and basic block definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cranelift_entity::EntityRef;

use crate::{
    inst::{Inst, Phi, Terminator},
    types::Type,
    value::TempId,
};

/// An opaque reference to a [`Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);
cranelift_entity::entity_impl!(BlockId);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// A basic block: leading phis, an ordered instruction list, and exactly one
/// terminator. `preds` is derived from the terminators of other blocks and
/// kept current via [`Function::recompute_preds`].
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub phis: Vec<Phi>,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
    pub preds: BTreeSet<BlockId>,
}

impl Block {
    pub fn new(terminator: Terminator) -> Self {
        Self {
            phis: Vec::new(),
            insts: Vec::new(),
            terminator,
            preds: BTreeSet::new(),
        }
    }

    /// A block that only transfers control.
    pub fn is_empty(&self) -> bool {
        self.phis.is_empty() && self.insts.is_empty()
    }
}

/// A function parameter: the temp it binds, its type, and its source name.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub temp: TempId,
    pub ty: Type,
}

/// A function body in SSA form.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Option<Type>,
    pub entry: BlockId,
    pub blocks: BTreeMap<BlockId, Block>,

    next_block: u32,
    next_temp: u32,
}

impl Function {
    /// Create a function with an (initially empty) entry block terminated by
    /// a void return.
    pub fn new(name: impl Into<String>, param_tys: &[(String, Type)], ret_ty: Option<Type>) -> Self {
        let mut func = Self {
            name: name.into(),
            params: Vec::new(),
            ret_ty,
            entry: BlockId(0),
            blocks: BTreeMap::new(),
            next_block: 0,
            next_temp: 0,
        };

        for (name, ty) in param_tys {
            let temp = func.make_temp();
            func.params.push(Param {
                name: name.clone(),
                temp,
                ty: *ty,
            });
        }

        let entry = func.make_block();
        func.entry = entry;
        func
    }

    /// Allocate a fresh block, terminated by a void return until the caller
    /// installs the real terminator.
    pub fn make_block(&mut self) -> BlockId {
        let id = BlockId::new(self.next_block as usize);
        self.next_block += 1;
        self.blocks.insert(
            id,
            Block::new(Terminator::Return {
                value: None,
                debug: Default::default(),
            }),
        );
        id
    }

    pub fn make_temp(&mut self) -> TempId {
        let id = TempId::new(self.next_temp as usize);
        self.next_temp += 1;
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[&id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks.get_mut(&id).expect("block removed from function")
    }

    /// Blocks in id order. Layout order for emission is computed separately.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys().copied()
    }

    /// Recompute every block's predecessor set from the terminators.
    pub fn recompute_preds(&mut self) {
        let edges: Vec<(BlockId, BlockId)> = self
            .blocks
            .iter()
            .flat_map(|(&id, block)| {
                block
                    .terminator
                    .dests()
                    .into_iter()
                    .map(move |dest| (id, dest))
            })
            .collect();

        for block in self.blocks.values_mut() {
            block.preds.clear();
        }
        for (from, to) in edges {
            if let Some(block) = self.blocks.get_mut(&to) {
                block.preds.insert(from);
            }
        }
    }

    /// Every temp defined in this function and the block defining it.
    /// Function parameters map to the entry block.
    pub fn temp_defs(&self) -> BTreeMap<TempId, BlockId> {
        let mut defs = BTreeMap::new();
        for param in &self.params {
            defs.insert(param.temp, self.entry);
        }
        for (&id, block) in &self.blocks {
            for phi in &block.phis {
                defs.insert(phi.dest, id);
            }
            for inst in &block.insts {
                if let Some(dest) = inst.dest() {
                    defs.insert(dest, id);
                }
            }
            if let Some(dest) = block.terminator.dest() {
                // A call's result is defined at its continuation block.
                if let Terminator::Call { continuation, .. } = &block.terminator {
                    defs.insert(dest, *continuation);
                }
            }
        }
        defs
    }
}
