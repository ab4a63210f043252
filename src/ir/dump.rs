//! Textual and DOT renderings of a control flow graph.

use std::fmt::Write;

use crate::{
    ir::{ControlFlowGraph, EdgeKind, InstId, Role},
    utils::{dot::DotWriter, graph::NodeId},
};

impl ControlFlowGraph {
    /// Renders one instruction, e.g. `v3 = add v1, v2`.
    #[must_use]
    pub fn display_inst(&self, id: InstId) -> String {
        let inst = self.inst(id);
        let mut out = String::new();
        let defs: Vec<String> = inst
            .slots()
            .iter()
            .filter(|s| s.role == Role::Def)
            .map(|s| s.operand.to_string())
            .collect();
        if !defs.is_empty() {
            let _ = write!(out, "{} = ", defs.join(", "));
        }
        let _ = write!(out, "{}", inst.opcode());
        let uses: Vec<String> = inst.srcs().map(|s| s.to_string()).collect();
        if !uses.is_empty() {
            let _ = write!(out, " {}", uses.join(", "));
        }
        if let Some(facts) = inst.gc_facts() {
            let facts: Vec<String> = facts.iter().map(ToString::to_string).collect();
            let _ = write!(out, " [{}]", facts.join("; "));
        }
        out
    }

    fn node_title(&self, node: NodeId) -> String {
        format!(
            "{} {:?} x{}",
            node,
            self.node(node).kind(),
            self.node(node).exec_count()
        )
    }

    /// Renders the live part of the graph in Graphviz DOT format.
    ///
    /// Dispatch edges are dashed; edge labels carry the kind and
    /// probability.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = DotWriter::new("cfg");
        for node in self.nodes() {
            let mut lines = vec![self.node_title(node)];
            lines.extend(
                self.insts_of(node)
                    .skip(1)
                    .map(|i| format!("{i}: {}", self.display_inst(i))),
            );
            dot.node(&node.to_string(), &lines);
        }
        for edge in self.edges() {
            let e = self.edge(edge);
            let label = format!("{} {:.2}", e.kind(), e.prob());
            dot.edge(
                &e.source().to_string(),
                &e.target().to_string(),
                label.trim(),
                e.kind() == EdgeKind::Dispatch,
            );
        }
        dot.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{CfgBuilder, SemType};

    #[test]
    fn test_display_inst() {
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let x = b.arg(0, SemType::I32);
                let y = b.arg(1, SemType::I32);
                let s = b.add(x, y);
                b.ret(Some(s));
            });
        });
        let add = cfg.insts_of(cfg.entry()).nth(3).unwrap();
        assert_eq!(cfg.display_inst(add), "v2 = add v0, v1");
    }

    #[test]
    fn test_to_dot_marks_dispatch_edges() {
        let cfg = CfgBuilder::new().build_with(|f| {
            f.block(0, |b| {
                let o = b.new_object(2);
                b.throw(o, 1);
            });
            f.dispatch(1, |b| b.ret(None));
        });
        let dot = cfg.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("style=dashed"));
        assert!(dot.contains("throw v0"));
    }
}
