//! Control-flow walk
//!
//! The emitter follows `FLOW_OUT` edges from the source, keeping a stack of
//! the constructs it is inside. A path ends when control runs out (an
//! unbound port or a `Return`) or when it reaches a block one of those
//! constructs owns:
//!
//! - the join of the innermost branch that has one, or the header of the
//!   innermost loop if no branch join comes first: the path simply ends;
//! - the header of the innermost loop: `continue`;
//! - the `next` of the innermost loop: `break`;
//! - anything else owned by an enclosing construct: the graph has no
//!   structured form and is rejected.
//!
//! A block met again while it is still on the active path means control
//! cycles without passing through a loop body, which is also an error.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::block::{BlockId, BlockKind, Port};
use crate::block_graph::BlockGraph;
use crate::error::{CompileFailure, StructuralError};

use super::expr::{Expressions, is_grouped};

const INDENT: &str = "    ";

/// Deepest `if`/`while` nesting the emitter accepts.
pub const MAX_NESTING: usize = 128;

/// How many times one block may be emitted. Paths that meet only inside
/// constructs without a join are emitted once per path.
const MAX_COPIES: usize = 16;

/// A construct enclosing the block being emitted.
#[derive(Debug, Clone, Copy)]
enum Frame {
    /// A path of a `Branch`
    Branch { join: Option<BlockId> },
    /// The body of a `Loop`
    Loop {
        header: BlockId,
        exit: Option<BlockId>,
    },
}

impl Frame {
    fn owns(self, id: BlockId) -> bool {
        match self {
            Self::Branch { join } => join == Some(id),
            Self::Loop { header, exit } => header == id || exit == Some(id),
        }
    }
}

/// What reaching a block means for the path being emitted.
enum Jump {
    Stay,
    End,
    Continue,
    Break,
}

/// Where a `Branch` continues, and whether every path through it returns.
#[derive(Debug, Clone, Copy)]
struct Construct {
    join: Option<BlockId>,
    returns: bool,
}

/// Blocks control passes through from a start block, stepping over nested
/// constructs by their continuation.
struct Chain {
    blocks: Vec<BlockId>,
    returns: bool,
}

enum Step<T> {
    Ready(T),
    Needs(BlockId),
}

pub struct Emitter<'g> {
    graph: &'g BlockGraph,
    exprs: Expressions<'g>,
    constructs: HashMap<BlockId, Construct>,
    active: HashSet<BlockId>,
    copies: HashMap<BlockId, usize>,
    lines: Vec<String>,
}

impl<'g> Emitter<'g> {
    pub fn new(graph: &'g BlockGraph) -> Self {
        Self {
            graph,
            exprs: Expressions::new(graph),
            constructs: HashMap::new(),
            active: HashSet::new(),
            copies: HashMap::new(),
            lines: Vec::new(),
        }
    }

    /// Emits everything reachable from the source.
    pub fn run(&mut self) -> Result<(), CompileFailure> {
        let source = self.graph.source();
        let first = self.graph.find_target(source, Port::Next)?;
        self.walk(first, &[], 0)
    }

    /// Joins the emitted lines.
    pub fn finish(self) -> String {
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    fn line(&mut self, depth: usize, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", INDENT.repeat(depth), text.as_ref()));
    }

    fn walk(
        &mut self,
        start: Option<BlockId>,
        frames: &[Frame],
        depth: usize,
    ) -> Result<(), CompileFailure> {
        let graph = self.graph;
        let mut entered = Vec::new();
        let mut current = start;

        while let Some(id) = current {
            match jump(id, frames)? {
                Jump::Stay => {}
                Jump::End => break,
                Jump::Continue => {
                    self.line(depth, "continue");
                    break;
                }
                Jump::Break => {
                    self.line(depth, "break");
                    break;
                }
            }
            if !self.active.insert(id) {
                return Err(StructuralError::FlowCycle { block: id }.into());
            }
            entered.push(id);
            let copies = self.copies.entry(id).or_insert(0);
            *copies += 1;
            if *copies > MAX_COPIES {
                return Err(StructuralError::UnstructuredFlow { block: id }.into());
            }

            let block = graph.block(id).ok_or(StructuralError::UnknownBlock(id))?;
            trace!(block = %id, kind = block.kind.name(), depth, "emitting block");
            current = match &block.kind {
                BlockKind::Source => graph.find_target(id, Port::Next)?,
                BlockKind::Action { name, arity } => {
                    let args = self.exprs.args(id, *arity)?;
                    self.line(depth, format!("{name}({})", args.join(", ")));
                    graph.find_target(id, Port::Next)?
                }
                BlockKind::Assign { variable } => {
                    let value = self.exprs.input(id, Port::Arg(0))?;
                    self.line(depth, format!("{variable} = {value}"));
                    graph.find_target(id, Port::Next)?
                }
                BlockKind::Evaluate => {
                    let value = self.exprs.input(id, Port::Arg(0))?;
                    self.line(depth, value);
                    graph.find_target(id, Port::Next)?
                }
                BlockKind::Return => {
                    let value = self.exprs.input(id, Port::Arg(0))?;
                    self.line(depth, format!("return {value}"));
                    None
                }
                BlockKind::Branch => self.branch(id, frames, depth)?,
                BlockKind::Loop => self.looping(id, frames, depth)?,
                other => {
                    return Err(StructuralError::InvalidBlock {
                        kind: other.name(),
                        reason: "expression block on the control path".to_string(),
                    }
                    .into());
                }
            };
        }

        for id in entered {
            self.active.remove(&id);
        }
        Ok(())
    }

    /// Emits an `if`/`else` and returns where control continues.
    fn branch(
        &mut self,
        id: BlockId,
        frames: &[Frame],
        depth: usize,
    ) -> Result<Option<BlockId>, CompileFailure> {
        check_nesting(id, frames)?;
        let graph = self.graph;
        let condition = self.exprs.input(id, Port::Condition)?;
        let then_start = graph.find_target(id, Port::Then)?;
        let else_start = graph.find_target(id, Port::Else)?;
        let join = self.construct(id)?.join;

        let mut inner = frames.to_vec();
        inner.push(Frame::Branch { join });
        let end = end_of_path(&inner);

        self.line(depth, format!("if {} {{", condition_text(&condition)));
        self.walk(then_start, &inner, depth + 1)?;
        if let Some(start) = else_start.filter(|s| Some(*s) != end) {
            self.line(depth, "} else {");
            self.walk(Some(start), &inner, depth + 1)?;
        }
        self.line(depth, "}");
        Ok(join)
    }

    /// Emits a `while` and returns where control continues.
    fn looping(
        &mut self,
        id: BlockId,
        frames: &[Frame],
        depth: usize,
    ) -> Result<Option<BlockId>, CompileFailure> {
        check_nesting(id, frames)?;
        let graph = self.graph;
        let condition = self.exprs.input(id, Port::Condition)?;
        let body = graph.find_target(id, Port::Body)?;
        let exit = graph.find_target(id, Port::Next)?;

        let mut inner = frames.to_vec();
        inner.push(Frame::Loop { header: id, exit });

        self.line(depth, format!("while {} {{", condition_text(&condition)));
        self.walk(body, &inner, depth + 1)?;
        self.line(depth, "}");
        Ok(exit)
    }

    // ========================================================================
    // Reconvergence
    // ========================================================================

    /// Continuation of a `Branch`: its bound `next`, otherwise the first
    /// block the `then` chain shares with the `else` chain.
    ///
    /// When the paths never meet but one of them always returns, the other
    /// path's first block continues the construct. Results are memoized;
    /// nested branches are resolved from an explicit work list.
    fn construct(&mut self, root: BlockId) -> Result<Construct, CompileFailure> {
        let mut pending = vec![root];
        while let Some(&id) = pending.last() {
            if self.constructs.contains_key(&id) {
                pending.pop();
                continue;
            }
            match self.try_construct(id, &pending)? {
                Step::Ready(construct) => {
                    self.constructs.insert(id, construct);
                    pending.pop();
                }
                Step::Needs(nested) => pending.push(nested),
            }
        }
        self.constructs
            .get(&root)
            .copied()
            .ok_or_else(|| StructuralError::UnknownBlock(root).into())
    }

    fn try_construct(
        &self,
        id: BlockId,
        pending: &[BlockId],
    ) -> Result<Step<Construct>, CompileFailure> {
        let graph = self.graph;
        if let Some(next) = graph.find_target(id, Port::Next)? {
            return Ok(Step::Ready(Construct {
                join: Some(next),
                returns: false,
            }));
        }
        let then_start = graph.find_target(id, Port::Then)?;
        let else_start = graph.find_target(id, Port::Else)?;
        let (Some(then_start), Some(else_start)) = (then_start, else_start) else {
            return Ok(Step::Ready(Construct {
                join: None,
                returns: false,
            }));
        };

        let then_chain = match self.chain(then_start, pending)? {
            Step::Ready(chain) => chain,
            Step::Needs(nested) => return Ok(Step::Needs(nested)),
        };
        let else_chain = match self.chain(else_start, pending)? {
            Step::Ready(chain) => chain,
            Step::Needs(nested) => return Ok(Step::Needs(nested)),
        };

        let on_else: HashSet<BlockId> = else_chain.blocks.iter().copied().collect();
        let shared = then_chain.blocks.iter().find(|b| on_else.contains(b)).copied();
        let construct = match (shared, then_chain.returns, else_chain.returns) {
            (Some(join), _, _) => Construct {
                join: Some(join),
                returns: false,
            },
            (None, true, false) => Construct {
                join: Some(else_start),
                returns: false,
            },
            (None, false, true) => Construct {
                join: Some(then_start),
                returns: false,
            },
            (None, returns, _) => Construct {
                join: None,
                returns: returns && else_chain.returns,
            },
        };
        Ok(Step::Ready(construct))
    }

    fn chain(&self, start: BlockId, pending: &[BlockId]) -> Result<Step<Chain>, CompileFailure> {
        let graph = self.graph;
        let mut blocks = Vec::new();
        let mut seen = HashSet::new();
        let mut returns = false;
        let mut current = Some(start);

        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            blocks.push(id);
            let block = graph.block(id).ok_or(StructuralError::UnknownBlock(id))?;
            current = match &block.kind {
                BlockKind::Return => {
                    returns = true;
                    None
                }
                BlockKind::Branch => match graph.find_target(id, Port::Next)? {
                    Some(next) => Some(next),
                    None if pending.contains(&id) => None,
                    None => match self.constructs.get(&id) {
                        Some(construct) => {
                            returns = construct.join.is_none() && construct.returns;
                            construct.join
                        }
                        None => return Ok(Step::Needs(id)),
                    },
                },
                kind if kind.has_port(Port::Next) => graph.find_target(id, Port::Next)?,
                _ => None,
            };
        }
        Ok(Step::Ready(Chain { blocks, returns }))
    }
}

/// Block at which a path inside `frames` ends without a jump.
fn end_of_path(frames: &[Frame]) -> Option<BlockId> {
    frames.iter().rev().find_map(|frame| match *frame {
        Frame::Branch { join } => join,
        Frame::Loop { header, .. } => Some(header),
    })
}

fn jump(id: BlockId, frames: &[Frame]) -> Result<Jump, StructuralError> {
    if end_of_path(frames) == Some(id) {
        return Ok(Jump::End);
    }
    let innermost_loop = frames.iter().rev().find_map(|frame| match *frame {
        Frame::Loop { header, exit } => Some((header, exit)),
        Frame::Branch { .. } => None,
    });
    if let Some((header, exit)) = innermost_loop {
        if id == header {
            return Ok(Jump::Continue);
        }
        if exit == Some(id) {
            return Ok(Jump::Break);
        }
    }
    if frames.iter().any(|frame| frame.owns(id)) {
        return Err(StructuralError::UnstructuredFlow { block: id });
    }
    Ok(Jump::Stay)
}

fn check_nesting(id: BlockId, frames: &[Frame]) -> Result<(), StructuralError> {
    if frames.len() >= MAX_NESTING {
        return Err(StructuralError::NestingTooDeep {
            block: id,
            limit: MAX_NESTING,
        });
    }
    Ok(())
}

fn condition_text(condition: &str) -> String {
    if is_grouped(condition) {
        condition.to_string()
    } else {
        format!("({condition})")
    }
}
