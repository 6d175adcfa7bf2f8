//! Runtime pointer resolution.
//!
//! A `Pointer` is a declarative, JSON-encoded description of where a
//! high-level variable's bytes live across EVM data locations. This crate
//! evaluates pointers against live machine state: [`dereference`] turns a
//! pointer into a [`Cursor`], viewing the cursor against a state yields the
//! concrete regions, and the read engine fetches their bytes.

pub mod cursor;
pub mod data;
pub mod dereference;
pub mod error;
pub mod expression;
pub mod machine;
pub mod pointer;
pub mod read;

pub use cursor::{Cursor, CursorRegion, CursorView, Regions};
pub use data::Data;
pub use dereference::{dereference, DereferenceOptions};
pub use error::PointerError;
pub use expression::{ArithOp, Expression, RegionProperty};
pub use machine::{ByteSlice, MachineError, MachineState};
pub use pointer::{Location, Pointer, Region, Template};
pub use read::read_region;
