//! Graph algorithms used by the control flow analyses.
//!
//! | Algorithm | Complexity | Used by |
//! |-----------|------------|---------|
//! | [`dfs`] / [`reachable`] | O(V + E) | unreachable-code purge, region walks |
//! | [`reverse_postorder`] | O(V + E) | dataflow iteration order |
//! | [`compute_dominators`] | O(E log V) | loop discovery, copy propagation, branch folding |

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, DominatorTree};
pub use traversal::{dfs, postorder, reachable, reverse_postorder, DfsIterator};
