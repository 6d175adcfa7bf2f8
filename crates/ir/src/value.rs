//! IR value definitions.

use std::fmt;

use primitive_types::U256;

/// An opaque reference to an SSA temporary.
///
/// Each temp is defined exactly once per function, by an instruction, a phi,
/// a call terminator, or a function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TempId(pub u32);
cranelift_entity::entity_impl!(TempId);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Immediate {
    /// An unsigned 256-bit word. Signed interpretation is per-opcode.
    Num(U256),
    /// A byte string. Only `const` feeding `hash` produces these; they never
    /// reach the stack unhashed.
    Bytes(Vec<u8>),
}

impl Immediate {
    pub fn zero() -> Self {
        Self::Num(U256::zero())
    }

    pub fn as_num(&self) -> Option<U256> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Num(_) => None,
            Self::Bytes(b) => Some(b),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Num(n) if n.is_zero())
    }
}

impl From<u64> for Immediate {
    fn from(v: u64) -> Self {
        Self::Num(U256::from(v))
    }
}

impl From<U256> for Immediate {
    fn from(v: U256) -> Self {
        Self::Num(v)
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// An operand: either a self-contained constant or a reference to a temp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Const(Immediate),
    Temp(TempId),
}

impl Value {
    pub fn num(v: impl Into<U256>) -> Self {
        Self::Const(Immediate::Num(v.into()))
    }

    pub fn as_temp(&self) -> Option<TempId> {
        match self {
            Self::Temp(t) => Some(*t),
            Self::Const(_) => None,
        }
    }

    pub fn as_const(&self) -> Option<&Immediate> {
        match self {
            Self::Const(imm) => Some(imm),
            Self::Temp(_) => None,
        }
    }

    pub fn as_num(&self) -> Option<U256> {
        self.as_const().and_then(Immediate::as_num)
    }
}

impl From<TempId> for Value {
    fn from(t: TempId) -> Self {
        Self::Temp(t)
    }
}

impl From<Immediate> for Value {
    fn from(imm: Immediate) -> Self {
        Self::Const(imm)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(imm) => write!(f, "{imm}"),
            Self::Temp(t) => write!(f, "{t}"),
        }
    }
}
