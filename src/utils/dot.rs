//! DOT format utilities for graph visualization.
//!
//! [`DotWriter`] accumulates nodes and edges and renders a `digraph` that can
//! be fed to Graphviz. Control flow graph dumps are produced through it.

use std::fmt::Write;

/// Escapes a string for use inside a quoted DOT label.
///
/// # Examples
///
/// ```rust
/// use midend::utils::escape_dot;
///
/// assert_eq!(escape_dot("a<b>"), "a\\<b\\>");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\l")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('|', "\\|")
}

/// Incremental builder for a DOT `digraph`.
pub(crate) struct DotWriter {
    out: String,
}

impl DotWriter {
    pub(crate) fn new(name: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape_dot(name));
        let _ = writeln!(out, "  node [shape=record, fontname=\"monospace\"];");
        DotWriter { out }
    }

    /// Emits a node whose label lines are left-justified.
    pub(crate) fn node(&mut self, id: &str, lines: &[String]) {
        let mut label = String::new();
        for line in lines {
            label.push_str(&escape_dot(line));
            label.push_str("\\l");
        }
        let _ = writeln!(self.out, "  {id} [label=\"{{{label}}}\"];");
    }

    pub(crate) fn edge(&mut self, from: &str, to: &str, label: &str, dashed: bool) {
        let style = if dashed { ", style=dashed" } else { "" };
        let _ = writeln!(
            self.out,
            "  {from} -> {to} [label=\"{}\"{style}];",
            escape_dot(label)
        );
    }

    pub(crate) fn finish(mut self) -> String {
        self.out.push_str("}\n");
        self.out
    }
}
