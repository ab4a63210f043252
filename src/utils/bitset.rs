//! A bit vector keyed by small dense indices.
//!
//! Operand ids, node ids and instruction ids are all dense `usize` indices into
//! the per-compilation arena, so sets of them are stored as packed words. This
//! is the representation used by liveness and by the marking phases of the
//! dead code eliminator.
//!
//! # Example
//!
//! ```rust
//! use midend::utils::BitSet;
//!
//! let mut set = BitSet::new(100);
//! set.insert(0);
//! set.insert(50);
//! set.insert(99);
//!
//! assert!(set.contains(50));
//! assert_eq!(set.count(), 3);
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 50, 99]);
//! ```

/// A fixed-capacity bit vector supporting in-place set algebra.
///
/// The capacity is decided at construction time. Out-of-range queries with
/// [`contains`](BitSet::contains) return `false` instead of panicking so that
/// sets computed before new operands were allocated can still be queried.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    /// The number of addressable bits.
    len: usize,
}

impl BitSet {
    /// Creates a new empty bit set with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Creates a new bit set with every bit below `capacity` set.
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        let mut set = Self::new(capacity);
        set.fill();
        set
    }

    /// Returns the capacity of this bit set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Extends the capacity to at least `capacity` bits, keeping the contents.
    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.len {
            self.words.resize(capacity.div_ceil(64), 0);
            self.len = capacity;
        }
    }

    /// Sets the bit at `index`.
    ///
    /// Returns `true` if the bit was previously clear.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let was_clear = *word & mask == 0;
        *word |= mask;
        was_clear
    }

    /// Clears the bit at `index`.
    ///
    /// Returns `true` if the bit was previously set. Indices beyond the
    /// capacity are ignored.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let was_set = *word & mask != 0;
        *word &= !mask;
        was_set
    }

    /// Returns `true` if the bit at `index` is set.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && (self.words[index / 64] & (1u64 << (index % 64))) != 0
    }

    /// Returns the number of bits set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears all bits.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Sets all bits below the capacity.
    pub fn fill(&mut self) {
        self.words.iter_mut().for_each(|w| *w = u64::MAX);
        if !self.len.is_multiple_of(64) {
            if let Some(last) = self.words.last_mut() {
                *last = (1u64 << (self.len % 64)) - 1;
            }
        }
    }

    /// In-place union. Returns `true` if `self` changed.
    ///
    /// A shorter `other` is treated as zero-extended.
    pub fn union_with(&mut self, other: &Self) -> bool {
        self.grow(other.len);
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            let old = *a;
            *a |= *b;
            changed |= old != *a;
        }
        changed
    }

    /// In-place intersection. Returns `true` if `self` changed.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (i, a) in self.words.iter_mut().enumerate() {
            let old = *a;
            *a &= other.words.get(i).copied().unwrap_or(0);
            changed |= old != *a;
        }
        changed
    }

    /// Removes every bit set in `other`. Returns `true` if `self` changed.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            let old = *a;
            *a &= !*b;
            changed |= old != *a;
        }
        changed
    }

    /// Returns `true` if every bit of `self` is also set in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, &w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Returns an iterator over the indices of set bits in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the set bits in a [`BitSet`].
pub struct BitSetIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_insert_reports_change() {
        let mut bs = BitSet::new(100);
        assert!(bs.insert(42));
        assert!(!bs.insert(42));
        assert!(bs.remove(42));
        assert!(!bs.remove(42));
        assert!(!bs.contains(42));
    }

    #[test]
    fn test_bitset_out_of_range_queries() {
        let bs = BitSet::new(10);
        assert!(!bs.contains(10));
        assert!(!bs.contains(1000));
    }

    #[test]
    fn test_bitset_full_and_fill() {
        let bs = BitSet::full(70);
        assert_eq!(bs.count(), 70);
        assert!(bs.contains(69));

        let mut other = BitSet::new(70);
        other.fill();
        assert_eq!(bs, other);
    }

    #[test]
    fn test_bitset_grow_keeps_bits() {
        let mut bs = BitSet::new(10);
        bs.insert(3);
        bs.grow(200);
        assert_eq!(bs.len(), 200);
        assert!(bs.contains(3));
        bs.insert(150);
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![3, 150]);
    }

    #[test]
    fn test_bitset_union_with_shorter_and_longer() {
        let mut a = BitSet::new(10);
        let mut b = BitSet::new(130);
        a.insert(1);
        b.insert(128);

        assert!(a.union_with(&b));
        assert!(a.contains(1));
        assert!(a.contains(128));
        assert!(!a.union_with(&b));
    }

    #[test]
    fn test_bitset_intersect_and_difference() {
        let mut a = BitSet::new(100);
        let mut b = BitSet::new(100);
        for i in [0, 1, 2] {
            a.insert(i);
        }
        for i in [1, 2, 3] {
            b.insert(i);
        }

        let mut inter = a.clone();
        assert!(inter.intersect_with(&b));
        assert_eq!(inter.iter().collect::<Vec<_>>(), vec![1, 2]);

        assert!(a.difference_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_bitset_subset() {
        let mut a = BitSet::new(64);
        let mut b = BitSet::new(128);
        a.insert(5);
        b.insert(5);
        b.insert(100);
        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
    }

    #[test]
    fn test_bitset_debug() {
        let mut bs = BitSet::new(10);
        bs.insert(2);
        bs.insert(7);
        assert_eq!(format!("{bs:?}"), "{2, 7}");
    }
}
