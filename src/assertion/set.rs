//! Assertion indices and the fixed-width set of assertions known to hold.

use std::{
    fmt,
    ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not, Sub},
};

/// Maximum number of assertions per table; also the width of [`AssertionSet`].
pub const MAX_ASSERTION_COUNT: usize = 64;

/// 1-based position of an assertion in its table.
///
/// [`AssertionIndex::NONE`] means "no assertion" and is what every creation
/// or lookup returns when it declines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AssertionIndex(u8);

impl AssertionIndex {
    /// No assertion.
    pub const NONE: AssertionIndex = AssertionIndex(0);

    /// Index for the `n`th assertion (1-based).
    ///
    /// Values outside `1..=MAX_ASSERTION_COUNT` yield [`AssertionIndex::NONE`].
    #[must_use]
    pub fn new(n: usize) -> Self {
        if (1..=MAX_ASSERTION_COUNT).contains(&n) {
            Self(n as u8)
        } else {
            Self::NONE
        }
    }

    /// Returns `true` for [`AssertionIndex::NONE`].
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` unless this is [`AssertionIndex::NONE`].
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// The 1-based number.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Converts to `Option`, mapping [`AssertionIndex::NONE`] to `None`.
    #[must_use]
    pub const fn to_option(self) -> Option<AssertionIndex> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }

    const fn bit(self) -> u64 {
        if self.0 == 0 {
            0
        } else {
            1u64 << (self.0 - 1)
        }
    }
}

impl fmt::Display for AssertionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02}", self.0)
    }
}

/// Set of assertion indices as a 64-bit mask; bit `i` stands for index `i + 1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssertionSet(u64);

impl AssertionSet {
    /// The empty set.
    pub const EMPTY: AssertionSet = AssertionSet(0);

    /// The set of every possible index.
    ///
    /// Used as the optimistic starting point of the dataflow intersection.
    pub const FULL: AssertionSet = AssertionSet(u64::MAX);

    /// Builds a set from a raw mask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw mask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// The set holding just `index` (empty for [`AssertionIndex::NONE`]).
    #[must_use]
    pub const fn single(index: AssertionIndex) -> Self {
        Self(index.bit())
    }

    /// Returns `true` if nothing is in the set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every index is in the set.
    #[must_use]
    pub const fn is_full(self) -> bool {
        self.0 == u64::MAX
    }

    /// Number of indices in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns `true` if `index` is in the set.
    #[must_use]
    pub const fn contains(self, index: AssertionIndex) -> bool {
        index.bit() != 0 && self.0 & index.bit() != 0
    }

    /// Adds `index`.
    pub fn insert(&mut self, index: AssertionIndex) {
        self.0 |= index.bit();
    }

    /// Removes `index`.
    pub fn remove(&mut self, index: AssertionIndex) {
        self.0 &= !index.bit();
    }

    /// The set with `index` removed.
    #[must_use]
    pub const fn without(self, index: AssertionIndex) -> Self {
        Self(self.0 & !index.bit())
    }

    /// Union.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection.
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Elements of `self` not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterates the indices in ascending order.
    #[must_use]
    pub const fn iter(self) -> AssertionSetIter {
        AssertionSetIter(self.0)
    }
}

impl From<AssertionIndex> for AssertionSet {
    fn from(index: AssertionIndex) -> Self {
        Self::single(index)
    }
}

impl BitOr for AssertionSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for AssertionSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for AssertionSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersect(rhs)
    }
}

impl BitAndAssign for AssertionSet {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Sub for AssertionSet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.difference(rhs)
    }
}

impl Not for AssertionSet {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl IntoIterator for AssertionSet {
    type Item = AssertionIndex;
    type IntoIter = AssertionSetIter;

    fn into_iter(self) -> AssertionSetIter {
        self.iter()
    }
}

impl FromIterator<AssertionIndex> for AssertionSet {
    fn from_iter<T: IntoIterator<Item = AssertionIndex>>(iter: T) -> Self {
        let mut set = Self::EMPTY;
        for index in iter {
            set.insert(index);
        }
        set
    }
}

impl fmt::Debug for AssertionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssertionSet({:#018x})", self.0)
    }
}

impl fmt::Display for AssertionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, index) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str("}")
    }
}

/// Iterator over the indices of an [`AssertionSet`].
#[derive(Debug, Clone)]
pub struct AssertionSetIter(u64);

impl Iterator for AssertionSetIter {
    type Item = AssertionIndex;

    fn next(&mut self) -> Option<AssertionIndex> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(AssertionIndex((bit + 1) as u8))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for AssertionSetIter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: usize) -> AssertionIndex {
        AssertionIndex::new(n)
    }

    #[test]
    fn test_index_bounds() {
        assert!(idx(0).is_none());
        assert!(idx(1).is_some());
        assert_eq!(idx(64).get(), 64);
        assert!(idx(65).is_none());
        assert_eq!(idx(3).to_string(), "#03");
        assert_eq!(AssertionIndex::NONE.to_option(), None);
    }

    #[test]
    fn test_insert_remove_contains() {
        let mut set = AssertionSet::EMPTY;
        set.insert(idx(1));
        set.insert(idx(64));
        set.insert(AssertionIndex::NONE);
        assert_eq!(set.len(), 2);
        assert!(set.contains(idx(1)));
        assert!(set.contains(idx(64)));
        assert!(!set.contains(AssertionIndex::NONE));
        set.remove(idx(1));
        assert!(!set.contains(idx(1)));
        assert_eq!(set.bits(), 1 << 63);
    }

    #[test]
    fn test_set_algebra() {
        let a: AssertionSet = [idx(1), idx(2), idx(3)].into_iter().collect();
        let b: AssertionSet = [idx(2), idx(4)].into_iter().collect();
        assert_eq!((a | b).len(), 4);
        assert_eq!(a & b, AssertionSet::single(idx(2)));
        assert_eq!((a - b).iter().collect::<Vec<_>>(), vec![idx(1), idx(3)]);
        assert!((a & !a).is_empty());
        assert!(AssertionSet::FULL.is_full());
        assert!(AssertionSet::FULL.contains(idx(64)));
    }

    #[test]
    fn test_iteration_order_and_display() {
        let set: AssertionSet = [idx(9), idx(2), idx(33)].into_iter().collect();
        assert_eq!(
            set.iter().map(AssertionIndex::get).collect::<Vec<_>>(),
            vec![2, 9, 33]
        );
        assert_eq!(set.to_string(), "{#02, #09, #33}");
        assert_eq!(set.iter().len(), 3);
    }
}
