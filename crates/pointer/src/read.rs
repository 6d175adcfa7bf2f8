//! The read engine: fetch a concrete region's bytes from machine state.
//!
//! Word-indexed locations (stack, storage, transient) default their slice
//! to the full word. Byte-addressed locations are not word-indexed, so a
//! 32-byte default would be arbitrary; they require explicit offset and
//! length.

use crate::{
    cursor::CursorRegion,
    data::Data,
    error::PointerError,
    machine::{ByteSlice, MachineState},
    pointer::Location,
};

pub fn read_region<S: MachineState>(
    state: &S,
    region: &CursorRegion,
) -> Result<Data, PointerError> {
    match region.location {
        Location::Stack => {
            let depth = to_u64(require(region, region.slot.as_ref(), "slot")?)?;
            let slice = word_slice(region)?;
            Ok(state.peek_stack(depth, slice)?)
        }
        Location::Storage => {
            let slot = require(region, region.slot.as_ref(), "slot")?;
            Ok(state.read_storage(slot, word_slice(region)?)?)
        }
        Location::Transient => {
            let slot = require(region, region.slot.as_ref(), "slot")?;
            Ok(state.read_transient(slot, word_slice(region)?)?)
        }
        Location::Memory => {
            let (offset, length) = byte_range(region)?;
            Ok(state.read_memory(offset, length)?)
        }
        Location::Calldata => {
            let (offset, length) = byte_range(region)?;
            Ok(state.read_calldata(offset, length)?)
        }
        Location::Returndata => {
            let (offset, length) = byte_range(region)?;
            Ok(state.read_returndata(offset, length)?)
        }
        Location::Code => {
            let (offset, length) = byte_range(region)?;
            Ok(state.read_code(offset, length)?)
        }
    }
}

fn word_slice(region: &CursorRegion) -> Result<ByteSlice, PointerError> {
    let offset = match &region.offset {
        Some(data) => to_u64(data)?,
        None => 0,
    };
    let length = match &region.length {
        Some(data) => to_u64(data)?,
        None => 32,
    };
    Ok(ByteSlice { offset, length })
}

fn byte_range(region: &CursorRegion) -> Result<(u64, u64), PointerError> {
    let offset = to_u64(require(region, region.offset.as_ref(), "offset")?)?;
    let length = to_u64(require(region, region.length.as_ref(), "length")?)?;
    Ok((offset, length))
}

fn require<'d>(
    region: &CursorRegion,
    field: Option<&'d Data>,
    property: &'static str,
) -> Result<&'d Data, PointerError> {
    field.ok_or_else(|| PointerError::MissingRegionProperty {
        region: region
            .name
            .clone()
            .unwrap_or_else(|| region.location.to_string()),
        property,
    })
}

fn to_u64(data: &Data) -> Result<u64, PointerError> {
    data.as_u64()
        .ok_or_else(|| PointerError::ValueOutOfRange(data.to_string()))
}
