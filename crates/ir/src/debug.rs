//! Source provenance carried through every IR transformation.

use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

/// A half-open byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceSpan {
    pub start: u32,
    pub end: u32,
}

impl SourceSpan {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// An immutable set of source spans an IR entity originates from.
///
/// `merge` is set union: associative, commutative, idempotent. Optimizer
/// rewrites combine provenance, they never drop it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance(BTreeSet<SourceSpan>);

impl Provenance {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn span(start: u32, end: u32) -> Self {
        let mut set = BTreeSet::new();
        set.insert(SourceSpan::new(start, end));
        Self(set)
    }

    pub fn merge(&self, other: &Self) -> Self {
        let mut set = self.0.clone();
        set.extend(other.0.iter().copied());
        Self(set)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn spans(&self) -> impl Iterator<Item = &SourceSpan> {
        self.0.iter()
    }
}

impl FromIterator<SourceSpan> for Provenance {
    fn from_iter<I: IntoIterator<Item = SourceSpan>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Debug context attached to an instruction, phi, or terminator: the
/// provenance of the operation itself plus optional per-operand provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    pub operation: Provenance,
    pub operands: SmallVec<[Provenance; 2]>,
}

impl DebugInfo {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn op(operation: Provenance) -> Self {
        Self {
            operation,
            operands: SmallVec::new(),
        }
    }

    /// All provenance reachable from this context, combined.
    pub fn combined(&self) -> Provenance {
        self.operands
            .iter()
            .fold(self.operation.clone(), |acc, p| acc.merge(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_idempotent_and_commutative() {
        let a = Provenance::span(0, 4);
        let b = Provenance::span(8, 12);

        let ab = a.merge(&b);
        let ba = b.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.merge(&ab), ab);
        assert_eq!(ab.spans().count(), 2);
    }

    #[test]
    fn merge_dedups_equal_spans() {
        let a = Provenance::span(3, 9);
        let b = Provenance::span(3, 9);
        assert_eq!(a.merge(&b).spans().count(), 1);
    }
}
