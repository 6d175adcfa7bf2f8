//! A small in-memory machine state for dereference tests.

use std::collections::HashMap;

use cantata_pointer::{ByteSlice, Data, MachineError, MachineState};

#[derive(Debug, Default)]
pub struct MockState {
    /// Stack words, top of stack last.
    pub stack: Vec<[u8; 32]>,
    /// Storage words keyed by minimal-width slot bytes.
    pub storage: HashMap<Vec<u8>, [u8; 32]>,
    pub transient: HashMap<Vec<u8>, [u8; 32]>,
    pub memory: Vec<u8>,
    pub calldata: Vec<u8>,
    pub returndata: Vec<u8>,
    pub code: Vec<u8>,
}

impl MockState {
    pub fn set_storage(&mut self, slot: u64, word: [u8; 32]) {
        self.storage.insert(key(slot), word);
    }

    pub fn set_storage_u64(&mut self, slot: u64, value: u64) {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        self.set_storage(slot, word);
    }
}

fn key(slot: u64) -> Vec<u8> {
    Data::from_u64(slot).bytes().to_vec()
}

fn slice_word(word: &[u8; 32], slice: ByteSlice) -> Result<Data, MachineError> {
    let start = slice.offset as usize;
    let end = start + slice.length as usize;
    if end > 32 {
        return Err(MachineError(format!("slice {start}..{end} out of word")));
    }
    Ok(Data::from_bytes(word[start..end].to_vec()))
}

fn slice_bytes(bytes: &[u8], offset: u64, length: u64) -> Result<Data, MachineError> {
    let start = offset as usize;
    let end = start + length as usize;
    if end > bytes.len() {
        return Err(MachineError(format!(
            "read {start}..{end} past end ({})",
            bytes.len()
        )));
    }
    Ok(Data::from_bytes(bytes[start..end].to_vec()))
}

impl MachineState for MockState {
    fn peek_stack(&self, depth: u64, slice: ByteSlice) -> Result<Data, MachineError> {
        let idx = self
            .stack
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or_else(|| MachineError(format!("stack depth {depth} underflows")))?;
        slice_word(&self.stack[idx], slice)
    }

    fn read_storage(&self, slot: &Data, slice: ByteSlice) -> Result<Data, MachineError> {
        let word = self
            .storage
            .get(slot.trimmed().bytes())
            .copied()
            .unwrap_or([0u8; 32]);
        slice_word(&word, slice)
    }

    fn read_transient(&self, slot: &Data, slice: ByteSlice) -> Result<Data, MachineError> {
        let word = self
            .transient
            .get(slot.trimmed().bytes())
            .copied()
            .unwrap_or([0u8; 32]);
        slice_word(&word, slice)
    }

    fn read_memory(&self, offset: u64, length: u64) -> Result<Data, MachineError> {
        slice_bytes(&self.memory, offset, length)
    }

    fn read_calldata(&self, offset: u64, length: u64) -> Result<Data, MachineError> {
        slice_bytes(&self.calldata, offset, length)
    }

    fn read_returndata(&self, offset: u64, length: u64) -> Result<Data, MachineError> {
        slice_bytes(&self.returndata, offset, length)
    }

    fn read_code(&self, offset: u64, length: u64) -> Result<Data, MachineError> {
        slice_bytes(&self.code, offset, length)
    }
}
