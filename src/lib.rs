// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

//! # midend
//!
//! The control flow graph mutation and data flow engine of an optimizing JIT
//! middle-end. Method bodies are SSA graphs of nodes holding instructions;
//! the passes in this crate rewrite those graphs in place while keeping
//! every definition-use link, phi and exception edge consistent.
//!
//! ## Features
//!
//! - **Region duplication** - copy any single-entry region, move edges onto
//!   the copy and repair SSA for every value that escapes it
//! - **Tail duplication and branch folding** - give a predecessor a private
//!   copy of a node, then fold branches whose outcome the path decides
//! - **Loop peeling and unrolling** built on the duplicator
//! - **Dead code elimination** with copy propagation, bit-width narrowing of
//!   conversions and block cleanup
//! - **Safe-point pointer tracking** - base and offset of every interior
//!   pointer live at a GC safe point
//! - **Parallel sessions** compiling independent methods with `rayon`
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust
//! use midend::prelude::*;
//!
//! let mut cfg = CfgBuilder::new().build_with(|f| {
//!     f.block(0, |b| {
//!         let a = b.arg(0, SemType::I32);
//!         let _dead = b.mul(a, a);
//!         b.ret(Some(a));
//!     });
//! });
//!
//! let mut du = DefUseIndex::build(&cfg);
//! let stats = DeadCodeEliminator::new(&mut cfg, &mut du, DceOptions::default()).run()?;
//! assert_eq!(stats.instructions_removed, 1);
//! # Ok::<(), midend::Error>(())
//! ```
//!
//! ### Running the Pipeline
//!
//! ```rust
//! use midend::compiler::{CompilationContext, EventKind, EventLog, MethodId, PassPipeline};
//! use midend::ir::{CfgBuilder, SemType};
//! use midend::OptimizerFlags;
//!
//! let mut cfg = CfgBuilder::new().build_with(|f| {
//!     f.block(0, |b| {
//!         let a = b.arg(0, SemType::I32);
//!         b.ret(Some(a));
//!     });
//! });
//!
//! let flags: OptimizerFlags = "unroll_factor=2,checked=true".parse()?;
//! let events = EventLog::new();
//! let ctx = CompilationContext::new(MethodId(0), &flags, &events);
//! let outcome = PassPipeline::standard().run(&mut cfg, &ctx);
//! assert!(outcome.skipped.is_empty());
//! assert!(events.has(EventKind::PassCompleted));
//! # Ok::<(), midend::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - the graph: nodes, edges, instructions, operands, and a builder
//! - [`analysis`] - dominance, loops, liveness and the def-use index
//! - [`compiler`] - the transformations, the passes and the pipeline
//! - [`utils`] - bit sets, arena ids and generic graph algorithms
//! - [`OptimizerFlags`] - configuration, parseable from option strings
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Error Handling
//!
//! Operations return [`Result`]. A violated precondition is an
//! [`Error::ContractViolation`] carrying the source location where it was
//! detected; passes never panic on malformed input, and the
//! [`compiler::PassPipeline`] rolls a failing pass back.

pub mod analysis;
pub mod compiler;
pub mod ir;
pub mod prelude;
pub mod utils;

mod config;
mod error;

/// `midend` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `midend` Error type
///
/// The error type of every fallible operation in this crate.
pub use error::Error;

/// Optimizer configuration and its option keys.
pub use config::{OptimizerFlags, OptionKey};
