//! Expression resolution
//!
//! Expression blocks are rendered bottom-up through their `DATA_IN` ports.
//! Each block is rendered once per compilation and reused wherever its
//! output fans out.

use std::collections::HashMap;

use crate::block::{BlockId, BlockKind, Port};
use crate::block_graph::BlockGraph;
use crate::error::{CompileFailure, CyclicDataDependency, StructuralError};

pub struct Expressions<'g> {
    graph: &'g BlockGraph,
    rendered: HashMap<BlockId, String>,
    resolving: Vec<BlockId>,
}

enum Visit {
    Enter(BlockId),
    Exit(BlockId),
}

impl<'g> Expressions<'g> {
    pub fn new(graph: &'g BlockGraph) -> Self {
        Self {
            graph,
            rendered: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    /// Renders the value bound to a `DATA_IN` port of `block`.
    pub fn input(&mut self, block: BlockId, port: Port) -> Result<String, CompileFailure> {
        let producer = self.producer(block, port)?;
        self.render(producer)?;
        self.take(producer)
    }

    /// Renders `arg0..arity` of `block`.
    pub fn args(&mut self, block: BlockId, arity: u8) -> Result<Vec<String>, CompileFailure> {
        (0..arity).map(|i| self.input(block, Port::Arg(i))).collect()
    }

    fn producer(&self, block: BlockId, port: Port) -> Result<BlockId, StructuralError> {
        self.graph
            .data_source(block, port)
            .ok_or(StructuralError::DanglingPort { block, port })
    }

    /// Renders `root` and everything feeding it, deepest producers first.
    ///
    /// Works off an explicit stack; expression depth is bounded by memory,
    /// not by the thread stack.
    fn render(&mut self, root: BlockId) -> Result<(), CompileFailure> {
        let graph = self.graph;
        let mut stack = vec![Visit::Enter(root)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    if self.rendered.contains_key(&id) {
                        continue;
                    }
                    if let Some(start) = self.resolving.iter().position(|b| *b == id) {
                        return Err(CyclicDataDependency {
                            cycle: self.resolving[start..].to_vec(),
                        }
                        .into());
                    }
                    let block = graph.block(id).ok_or(StructuralError::UnknownBlock(id))?;
                    let inputs = input_ports(&block.kind)?
                        .into_iter()
                        .map(|port| self.producer(id, port))
                        .collect::<Result<Vec<_>, _>>()?;
                    self.resolving.push(id);
                    stack.push(Visit::Exit(id));
                    stack.extend(inputs.into_iter().rev().map(Visit::Enter));
                }
                Visit::Exit(id) => {
                    let text = self.assemble(id)?;
                    self.resolving.pop();
                    self.rendered.insert(id, text);
                }
            }
        }
        Ok(())
    }

    /// Builds the text of `id` once all of its producers are rendered.
    fn assemble(&mut self, id: BlockId) -> Result<String, CompileFailure> {
        let graph = self.graph;
        let block = graph.block(id).ok_or(StructuralError::UnknownBlock(id))?;
        let text = match &block.kind {
            BlockKind::Literal { value } => value.render(),
            BlockKind::Variable { name } => name.clone(),
            BlockKind::Binary { op } => {
                let lhs = self.rendered_input(id, Port::Arg(0))?;
                let rhs = self.rendered_input(id, Port::Arg(1))?;
                format!("({lhs} {} {rhs})", op.symbol())
            }
            BlockKind::Unary { op } => {
                let operand = self.rendered_input(id, Port::Arg(0))?;
                format!("{}{}", op.symbol(), parenthesize(&operand))
            }
            BlockKind::Call { function, arity } => {
                let args = (0..*arity)
                    .map(|i| self.rendered_input(id, Port::Arg(i)))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{function}({})", args.join(", "))
            }
            other => return Err(not_a_value(other).into()),
        };
        Ok(text)
    }

    fn rendered_input(&mut self, block: BlockId, port: Port) -> Result<String, CompileFailure> {
        let producer = self.producer(block, port)?;
        self.take(producer)
    }

    /// Hands out the text of a rendered producer. Text feeding a single
    /// consumer is moved out; fanned-out text stays cached for the others.
    fn take(&mut self, producer: BlockId) -> Result<String, CompileFailure> {
        let text = if self.graph.data_consumers(producer) > 1 {
            self.rendered.get(&producer).cloned()
        } else {
            self.rendered.remove(&producer)
        };
        text.ok_or_else(|| StructuralError::UnknownBlock(producer).into())
    }
}

/// `DATA_IN` ports an expression block reads, in argument order.
fn input_ports(kind: &BlockKind) -> Result<Vec<Port>, StructuralError> {
    match kind {
        BlockKind::Literal { .. } | BlockKind::Variable { .. } => Ok(Vec::new()),
        BlockKind::Binary { .. } => Ok(vec![Port::Arg(0), Port::Arg(1)]),
        BlockKind::Unary { .. } => Ok(vec![Port::Arg(0)]),
        BlockKind::Call { arity, .. } => Ok((0..*arity).map(Port::Arg).collect()),
        other => Err(not_a_value(other)),
    }
}

fn not_a_value(kind: &BlockKind) -> StructuralError {
    StructuralError::InvalidBlock {
        kind: kind.name(),
        reason: "block does not produce a value".to_string(),
    }
}

/// Wraps `expr` in parentheses unless it already is a single group or an
/// atom (identifier or number).
pub fn parenthesize(expr: &str) -> String {
    let atom = !expr.is_empty()
        && expr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if atom || is_grouped(expr) {
        expr.to_string()
    } else {
        format!("({expr})")
    }
}

/// Returns `true` if the opening parenthesis at the start of `expr` closes
/// at its very end. Quoted strings are skipped.
pub fn is_grouped(expr: &str) -> bool {
    if !expr.starts_with('(') {
        return false;
    }
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in expr.char_indices() {
        if quoted {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '\'') => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' => quoted = true,
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1 == expr.len();
                }
            }
            _ => {}
        }
    }
    false
}
