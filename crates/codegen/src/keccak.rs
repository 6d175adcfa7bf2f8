//! keccak256 over byte strings, shared by hash-constant folding and the
//! `hash` lowering.

use cantata_ir::U256;
use tiny_keccak::{Hasher, Keccak};

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut digest = [0u8; 32];
    hasher.finalize(&mut digest);
    digest
}

pub(crate) fn keccak256_word(data: &[u8]) -> U256 {
    U256::from_big_endian(&keccak256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_digest() {
        // keccak256("") is a well-known constant.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
