//! The byte value type pointer expressions compute over.

use std::fmt;

use num_bigint::BigUint;

/// An immutable byte string with big-endian unsigned numeric meaning.
///
/// Width is significant: `0x0001` and `0x01` are numerically equal but two
/// bytes versus one, and concatenation preserves the difference. The
/// canonical zero is the empty string; numeric constructors produce the
/// minimal width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Data(Vec<u8>);

impl Data {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wrap raw bytes, keeping their width (leading zeros included).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Minimal-width encoding of an unsigned integer; zero becomes empty.
    pub fn from_uint(value: &BigUint) -> Self {
        if value == &BigUint::default() {
            return Self::empty();
        }
        Self(value.to_bytes_be())
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_uint(&BigUint::from(value))
    }

    /// Parse a `0x`-prefixed hex string, preserving its written width.
    /// An odd nibble count is padded with a leading zero nibble.
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        let digits = text.strip_prefix("0x").unwrap_or(text);
        if digits.len() % 2 == 1 {
            let mut padded = String::with_capacity(digits.len() + 1);
            padded.push('0');
            padded.push_str(digits);
            Ok(Self(hex::decode(padded)?))
        } else {
            Ok(Self(hex::decode(digits)?))
        }
    }

    pub fn as_uint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    pub fn as_u64(&self) -> Option<u64> {
        let n = self.as_uint();
        u64::try_from(n).ok()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Resize to exactly `size` bytes: pad with zeros on the left, or keep
    /// the low-order (rightmost) bytes, matching EVM word truncation.
    pub fn resize(&self, size: usize) -> Self {
        if self.0.len() == size {
            return self.clone();
        }
        if self.0.len() > size {
            return Self(self.0[self.0.len() - size..].to_vec());
        }
        let mut out = vec![0u8; size - self.0.len()];
        out.extend_from_slice(&self.0);
        Self(out)
    }

    /// Byte-for-byte concatenation, first operand first.
    pub fn concat(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Self(out)
    }

    /// Drop leading zero bytes (zero collapses to empty).
    pub fn trimmed(&self) -> Self {
        let skip = self.0.iter().take_while(|b| **b == 0).count();
        Self(self.0[skip..].to_vec())
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_empty() {
        assert_eq!(Data::from_u64(0), Data::empty());
        assert_eq!(Data::from_u64(0).len(), 0);
        assert!(Data::from_u64(0).is_zero());
    }

    #[test]
    fn numeric_constructors_are_minimal_width() {
        assert_eq!(Data::from_u64(0xff).len(), 1);
        assert_eq!(Data::from_u64(0xffff).len(), 2);
        assert_eq!(Data::from_u64(0x1_0000).len(), 3);
    }

    #[test]
    fn hex_preserves_written_width() {
        let d = Data::from_hex("0x0001").unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.as_u64(), Some(1));
        // Odd nibble counts gain a leading zero nibble.
        assert_eq!(Data::from_hex("0x123").unwrap().bytes(), &[0x01, 0x23]);
    }

    #[test]
    fn resize_truncates_from_the_left() {
        let d = Data::from_hex("0xaabbccdd").unwrap();
        assert_eq!(d.resize(2).bytes(), &[0xcc, 0xdd]);
        assert_eq!(d.resize(6).bytes(), &[0, 0, 0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn concat_preserves_leading_zeros() {
        let a = Data::from_hex("0x0001").unwrap();
        let b = Data::from_hex("0x0002").unwrap();
        let joined = a.concat(&b);
        assert_eq!(joined.len(), 4);
        assert_eq!(joined, Data::from_hex("0x00010002").unwrap());
    }
}
