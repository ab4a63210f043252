//! Lattice traits for data flow analysis.
//!
//! A lattice defines how abstract values combine where control flow paths
//! merge. The solver only needs the meet operation.

use std::fmt::Debug;

use crate::utils::BitSet;

/// A meet semi-lattice with a meet (greatest lower bound) operation.
///
/// The meet operation combines information from multiple control flow paths.
/// It must be idempotent, commutative and associative.
///
/// # Examples
///
/// ```rust
/// use midend::analysis::dataflow::MeetSemiLattice;
///
/// #[derive(Debug, Clone, PartialEq)]
/// enum Parity { Top, Even, Odd, Bottom }
///
/// impl MeetSemiLattice for Parity {
///     fn meet(&self, other: &Self) -> Self {
///         match (self, other) {
///             (Self::Top, x) | (x, Self::Top) => x.clone(),
///             (a, b) if a == b => a.clone(),
///             _ => Self::Bottom,
///         }
///     }
///
///     fn is_bottom(&self) -> bool {
///         matches!(self, Self::Bottom)
///     }
/// }
///
/// assert_eq!(Parity::Even.meet(&Parity::Odd), Parity::Bottom);
/// ```
pub trait MeetSemiLattice: Clone + Debug + PartialEq {
    /// Computes the meet of two lattice elements.
    #[must_use]
    fn meet(&self, other: &Self) -> Self;

    /// Returns `true` if this is the bottom element, which further meets
    /// cannot change.
    fn is_bottom(&self) -> bool;
}

impl MeetSemiLattice for BitSet {
    /// Meet is union: a "may" property such as liveness holds if it holds
    /// on any path.
    fn meet(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    fn is_bottom(&self) -> bool {
        self.count() == self.len()
    }
}
