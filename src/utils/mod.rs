//! Shared utilities: bit sets, arena ids, graph algorithms and DOT helpers.

mod bitset;
pub(crate) mod dot;
pub(crate) mod id;

pub mod graph;

pub use bitset::{BitSet, BitSetIter};
pub use dot::escape_dot;
