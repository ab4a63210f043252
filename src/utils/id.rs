//! Strongly typed arena indices.
//!
//! Every entity of a compilation (nodes, edges, instructions, operands) lives
//! in a per-compilation arena and is addressed by a dense index. Each kind of
//! index gets its own newtype so that an instruction id can never be used
//! where an operand id is expected.

/// Declares a `Copy` newtype over `usize` with the accessors shared by all
/// arena ids.
///
/// The `Display` form is `prefix` followed by the index (`n3`, `i17`, ...),
/// which is what CFG dumps and event messages print.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Creates an id from a raw arena index.
            #[must_use]
            #[inline]
            pub const fn new(index: usize) -> Self {
                $name(index)
            }

            /// Returns the raw arena index.
            #[must_use]
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                $name(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

pub(crate) use define_id;

define_id!(
    /// Identifier of a node in a control flow graph.
    NodeId,
    "n"
);

define_id!(
    /// Identifier of an edge in a control flow graph.
    EdgeId,
    "e"
);

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_id_roundtrip_and_display() {
        let node = NodeId::new(7);
        assert_eq!(node.index(), 7);
        assert_eq!(usize::from(node), 7);
        assert_eq!(NodeId::from(7), node);
        assert_eq!(format!("{node}"), "n7");
        assert_eq!(format!("{node:?}"), "NodeId(7)");
        assert_eq!(format!("{}", EdgeId::new(2)), "e2");
    }

    #[test]
    fn test_id_ordering() {
        let set: BTreeSet<NodeId> = [NodeId::new(3), NodeId::new(1), NodeId::new(2)]
            .into_iter()
            .collect();
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)]
        );
    }
}
