//! The intermediate representation the middle-end optimizes.
//!
//! A method body is a [`ControlFlowGraph`]: an arena of [`Node`]s connected by
//! [`Edge`]s, each node holding a doubly linked list of [`Instruction`]s that
//! read and write [`Operand`]s. Everything is addressed by stable integer ids
//! ([`NodeId`](crate::utils::graph::NodeId), [`EdgeId`](crate::utils::graph::EdgeId),
//! [`InstId`], [`OperandId`]) and lives until the graph is dropped.
//!
//! # Invariants
//!
//! - the first instruction of every node is a [`Opcode::Label`]; phis follow it
//! - phi source `i` flows along incoming edge `i` of its node
//! - an instruction flagged [`InstFlags::CAN_THROW`] is the last of its node,
//!   and the node has a [`EdgeKind::Dispatch`] edge
//! - every SSA operand ([`OperandKind::Temp`], [`OperandKind::SsaVar`]) has
//!   exactly one defining instruction, recorded as a back-reference
//!
//! [`verify`] checks all of these.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - the arena and its mutation API
//! - [`CfgBuilder`] - closure-based construction for tests and tools
//! - [`verify`] / [`verify_phi_arity`] - invariant checks
//! - [`PointerFact`] - GC metadata attached to safe points

mod builder;
mod cfg;
mod dump;
mod edge;
mod gcmap;
mod instruction;
mod node;
mod opcode;
mod operand;
mod types;
mod verify;

pub use builder::{CfgBlockBuilder, CfgBuilder, CfgFunctionContext};
pub use cfg::{ControlFlowGraph, InstIter};
pub use edge::{Edge, EdgeKind};
pub use gcmap::{FactBase, Offset, PointerFact};
pub use instruction::{InstFlags, InstId, Instruction, Role, Slot};
pub use node::{Node, NodeKind};
pub use opcode::{CmpKind, MarkerKind, Opcode};
pub use operand::{Operand, OperandId, OperandKind};
pub use types::SemType;
pub use verify::{verify, verify_phi_arity};
