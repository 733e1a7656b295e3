use std::io::Write;

use super::{ArrayNodeId, Graph};
use crate::{Array, Context, Result};

const INDENT_WIDTH: usize = 2;

/// Write the provenance of `array` depth-first, pre-order.
///
/// Each value node is written as `ArrayNode<id>`. A produced node is followed
/// by `Op<tag>` one level deeper, then by its operands, in order, two levels
/// deeper. Every level is two spaces. The graph is not modified.
pub fn debug_dump_computational_graph<W: Write>(
    w: &mut W,
    array: &Array,
    indent: usize,
) -> Result<()> {
    array.graph().dump_node(w, array.node(), indent)
}

impl Graph {
    /// Write the provenance of the node `root`, see [`debug_dump_computational_graph`].
    pub fn dump_node<W: Write>(&self, w: &mut W, root: ArrayNodeId, indent: usize) -> Result<()> {
        let inner = self.read();
        // Operands are pushed in reverse so they pop in order.
        let mut stack = vec![(root, indent)];
        while let Some((id, level)) = stack.pop() {
            writeln!(w, "{:width$}{id}", "", width = level * INDENT_WIDTH)?;
            let node = inner
                .node(id)
                .with_context(|| format!("{id} is not held by this graph"))?;
            let Some(op_id) = node.producer else {
                continue;
            };
            let op = inner
                .op(op_id)
                .with_context(|| format!("producer of {id} is not held by this graph"))?;
            writeln!(
                w,
                "{:width$}Op<{}>",
                "",
                op.name(),
                width = (level + 1) * INDENT_WIDTH
            )?;
            stack.extend(op.operands.iter().rev().map(|operand| (*operand, level + 2)));
        }
        Ok(())
    }

    /// [`Graph::dump_node`] into a `String`.
    pub fn dump_to_string(&self, root: ArrayNodeId) -> Result<String> {
        let mut buf = Vec::new();
        self.dump_node(&mut buf, root, 0)?;
        String::from_utf8(buf).context("graph dump is not utf-8")
    }
}
