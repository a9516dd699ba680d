//! Block graphs
//!
//! A [`BlockGraph`] is a [`Graph`] of [`Block`]s whose edges connect named
//! ports. Every mutation goes through methods that enforce the wiring rules,
//! so a graph in memory always satisfies:
//!
//! - exactly one `Source` block;
//! - edges only run `FLOW_OUT -> FLOW_IN` or `DATA_OUT -> DATA_IN`;
//! - a `FLOW_OUT` port has at most one successor;
//! - a `DATA_IN` port has at most one producer.
//!
//! Data-dependency cycles are allowed while editing and are reported by
//! [`BlockGraph::validate`] (and therefore by the compiler).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockId, BlockKind, Literal, Port, PortKind};
use crate::document::GraphDocument;
use crate::error::{
    CompileFailure, ConnectionViolation, CyclicDataDependency, DocumentError, StructuralError,
};
use crate::graph::{Edge, EdgeId, Graph};

/// Label of a block graph edge: which ports it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockEdge {
    /// Port on the tail block
    pub from_port: Port,
    /// Port on the head block
    pub to_port: Port,
}

/// A visual program: blocks connected through typed ports.
///
/// # Examples
///
/// ```
/// use blockphase_core::{Block, BlockGraph, Literal, Port};
///
/// let mut graph = BlockGraph::new("exec");
/// let draw = graph.add_block(Block::action("drawCard", 1)).unwrap();
/// let count = graph.add_block(Block::literal(Literal::Int(2))).unwrap();
/// graph.connect(graph.source(), Port::Next, draw, Port::FlowIn).unwrap();
/// graph.connect(count, Port::Out, draw, Port::Arg(0)).unwrap();
///
/// assert_eq!(blockphase_core::compile(&graph).unwrap(), "drawCard(2)\n");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument", into = "GraphDocument")]
pub struct BlockGraph {
    name: String,
    graph: Graph<Block, BlockEdge>,
    source: BlockId,
    revision: u64,
}

impl BlockGraph {
    /// Creates a graph holding a single `Source` block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut graph = Graph::new();
        let source = graph.add_node(Block::new(BlockKind::Source));
        Self {
            name: name.into(),
            graph,
            source,
            revision: 0,
        }
    }

    /// Creates a graph whose script is `return true`.
    ///
    /// This is the default guard of a transition.
    #[must_use]
    pub fn always_true(name: impl Into<String>) -> Self {
        let mut graph = Self::new(name);
        let ret = graph.graph.add_node(Block::ret());
        let value = graph.graph.add_node(Block::literal(Literal::Bool(true)));
        let source = graph.source;
        graph.graph.add_edge(source, ret, flow());
        graph.graph.add_edge(
            value,
            ret,
            BlockEdge {
                from_port: Port::Out,
                to_port: Port::Arg(0),
            },
        );
        graph
    }

    /// Rebuilds a graph from explicit blocks and edges.
    ///
    /// Handles are kept as given, so a saved graph reloads with the same
    /// block ids.
    ///
    /// # Errors
    ///
    /// Returns a [`StructuralError`] if a handle is repeated, the number of
    /// `Source` blocks is not exactly one, a block carries invalid data, or
    /// an edge breaks a wiring rule.
    pub fn from_parts(
        name: impl Into<String>,
        blocks: impl IntoIterator<Item = (BlockId, Block)>,
        edges: impl IntoIterator<Item = (BlockId, Port, BlockId, Port)>,
    ) -> Result<Self, StructuralError> {
        let mut graph = Graph::new();
        let mut sources = Vec::new();
        for (id, block) in blocks {
            block.kind.check()?;
            if matches!(block.kind, BlockKind::Source) {
                sources.push(id);
            }
            if graph.insert_node(id, block).is_some() {
                return Err(StructuralError::DuplicateBlockId(id));
            }
        }
        let source = match sources.as_slice() {
            [] => return Err(StructuralError::MissingSource),
            [only] => *only,
            _ => return Err(StructuralError::DuplicateSource { blocks: sources }),
        };

        let mut built = Self {
            name: name.into(),
            graph,
            source,
            revision: 0,
        };
        for (from, from_port, to, to_port) in edges {
            built.connect(from, from_port, to, to_port)?;
        }
        built.revision = 0;
        Ok(built)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the graph.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Handle of the unique `Source` block.
    #[must_use]
    pub const fn source(&self) -> BlockId {
        self.source
    }

    /// Counter bumped by every structural mutation.
    ///
    /// Compiled text can be cached against this value.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns a block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.graph.node(id)
    }

    /// Iterates over blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.graph.nodes()
    }

    /// Number of blocks, the source included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Iterates over edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge<BlockEdge>)> {
        self.graph.edges()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Adds a block and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::DuplicateSource`] for a second `Source`
    /// block, or [`StructuralError::InvalidBlock`] if the block data fails
    /// [`BlockKind::check`].
    pub fn add_block(&mut self, block: Block) -> Result<BlockId, StructuralError> {
        if matches!(block.kind, BlockKind::Source) {
            return Err(StructuralError::DuplicateSource {
                blocks: vec![self.source],
            });
        }
        block.kind.check()?;
        self.revision += 1;
        Ok(self.graph.add_node(block))
    }

    /// Replaces the payload of a block in place, keeping its edges.
    ///
    /// # Errors
    ///
    /// Fails if the block is unknown, if the replacement would add or remove
    /// the `Source`, or if an attached edge uses a port the new kind lacks.
    pub fn replace_block(&mut self, id: BlockId, block: Block) -> Result<Block, StructuralError> {
        let current = self.graph.node(id).ok_or(StructuralError::UnknownBlock(id))?;
        let was_source = matches!(current.kind, BlockKind::Source);
        let is_source = matches!(block.kind, BlockKind::Source);
        if was_source && !is_source {
            return Err(StructuralError::SourceRemoval);
        }
        if is_source && !was_source {
            return Err(StructuralError::DuplicateSource {
                blocks: vec![self.source, id],
            });
        }
        block.kind.check()?;
        for (_, edge) in self.graph.edges() {
            let port = if edge.from == id {
                Some(edge.label.from_port)
            } else if edge.to == id {
                Some(edge.label.to_port)
            } else {
                None
            };
            if let Some(port) = port.filter(|p| !block.kind.has_port(*p)) {
                return Err(StructuralError::InvalidBlock {
                    kind: block.kind.name(),
                    reason: format!("port '{port}' is still connected"),
                });
            }
        }
        let slot = self.graph.node_mut(id).ok_or(StructuralError::UnknownBlock(id))?;
        self.revision += 1;
        Ok(std::mem::replace(slot, block))
    }

    /// Removes a block and every edge touching it.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::SourceRemoval`] for the source block and
    /// [`StructuralError::UnknownBlock`] for a stale handle.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Block, StructuralError> {
        if id == self.source {
            return Err(StructuralError::SourceRemoval);
        }
        let (block, _) = self
            .graph
            .remove_node(id)
            .ok_or(StructuralError::UnknownBlock(id))?;
        self.revision += 1;
        Ok(block)
    }

    /// Connects an output port to an input port.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::InvalidConnection`] naming the first rule
    /// the edge would break; the graph is left unchanged.
    pub fn connect(
        &mut self,
        from: BlockId,
        from_port: Port,
        to: BlockId,
        to_port: Port,
    ) -> Result<EdgeId, StructuralError> {
        let refuse = |reason| StructuralError::InvalidConnection {
            from,
            from_port,
            to,
            to_port,
            reason,
        };

        let (Some(tail), Some(head)) = (self.graph.node(from), self.graph.node(to)) else {
            return Err(refuse(ConnectionViolation::UnknownBlock));
        };
        if from == to {
            return Err(refuse(ConnectionViolation::SelfLoop));
        }
        if !tail.kind.has_port(from_port) || !head.kind.has_port(to_port) {
            return Err(refuse(ConnectionViolation::UnknownPort));
        }
        match (from_port.kind(), to_port.kind()) {
            (PortKind::FlowOut, PortKind::FlowIn) => {
                if self.port_edges(from, from_port).next().is_some() {
                    return Err(refuse(ConnectionViolation::FlowOutTaken));
                }
            }
            (PortKind::DataOut, PortKind::DataIn) => {
                if self.port_edges(to, to_port).next().is_some() {
                    return Err(refuse(ConnectionViolation::DataInTaken));
                }
            }
            _ => return Err(refuse(ConnectionViolation::PortKindMismatch)),
        }

        let id = self
            .graph
            .add_edge(from, to, BlockEdge { from_port, to_port })
            .ok_or_else(|| refuse(ConnectionViolation::UnknownBlock))?;
        self.revision += 1;
        Ok(id)
    }

    /// Removes one edge.
    pub fn disconnect(&mut self, edge: EdgeId) -> Option<Edge<BlockEdge>> {
        let removed = self.graph.remove_edge(edge)?;
        self.revision += 1;
        Some(removed)
    }

    /// Removes every edge attached to `port` of `block`; returns how many
    /// were removed.
    pub fn disconnect_port(&mut self, block: BlockId, port: Port) -> usize {
        let ids: Vec<EdgeId> = self.port_edges(block, port).map(|(id, _)| id).collect();
        for id in &ids {
            self.graph.remove_edge(*id);
        }
        if !ids.is_empty() {
            self.revision += 1;
        }
        ids.len()
    }

    /// Edges attached to `port` of `block`, from that port's side.
    fn port_edges(
        &self,
        block: BlockId,
        port: Port,
    ) -> impl Iterator<Item = (EdgeId, &Edge<BlockEdge>)> {
        let (outgoing, incoming) = if port.kind().is_output() {
            (Some(self.graph.outgoing(block)), None)
        } else {
            (None, Some(self.graph.incoming(block)))
        };
        outgoing
            .into_iter()
            .flatten()
            .filter(move |(_, e)| e.label.from_port == port)
            .chain(
                incoming
                    .into_iter()
                    .flatten()
                    .filter(move |(_, e)| e.label.to_port == port),
            )
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Follows an output port to the block it feeds.
    ///
    /// Unbound `FLOW_OUT` ports are allowed to be empty; an unbound
    /// `DATA_OUT` port is reported as dangling. See [`Self::find_target_with`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::find_target_with`].
    ///
    /// # Panics
    ///
    /// Panics if `port` is an input port.
    pub fn find_target(
        &self,
        from: BlockId,
        port: Port,
    ) -> Result<Option<BlockId>, StructuralError> {
        self.find_target_with(from, port, port.kind() == PortKind::FlowOut)
    }

    /// Follows an output port to the block it feeds.
    ///
    /// A `DATA_OUT` port may fan out; the first consumer (in edge insertion
    /// order) is returned.
    ///
    /// # Errors
    ///
    /// - [`StructuralError::UnknownBlock`] if `from` is not in the graph.
    /// - [`StructuralError::DanglingPort`] if the port is unbound and
    ///   `can_be_empty` is false.
    ///
    /// # Panics
    ///
    /// Panics if `port` is an input port. Asking an input port for its
    /// target is a programming error, not a property of the graph.
    pub fn find_target_with(
        &self,
        from: BlockId,
        port: Port,
        can_be_empty: bool,
    ) -> Result<Option<BlockId>, StructuralError> {
        assert!(
            port.kind().is_output(),
            "find_target called on input port '{port}'"
        );
        if !self.graph.contains_node(from) {
            return Err(StructuralError::UnknownBlock(from));
        }
        match self.port_edges(from, port).next() {
            Some((_, edge)) if self.graph.contains_node(edge.to) => Ok(Some(edge.to)),
            Some(_) => Err(StructuralError::BrokenEdge { block: from, port }),
            None if can_be_empty => Ok(None),
            None => Err(StructuralError::DanglingPort { block: from, port }),
        }
    }

    /// Returns the block producing the value consumed at a `DATA_IN` port.
    #[must_use]
    pub fn data_source(&self, block: BlockId, port: Port) -> Option<BlockId> {
        if port.kind() != PortKind::DataIn {
            return None;
        }
        self.port_edges(block, port).next().map(|(_, e)| e.from)
    }

    /// Number of data inputs fed by the output of `block`.
    #[must_use]
    pub fn data_consumers(&self, block: BlockId) -> usize {
        self.port_edges(block, Port::Out).count()
    }

    /// Producers feeding the data inputs of `block`, in edge order.
    fn data_producers(&self, block: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.graph
            .incoming(block)
            .filter(|(_, e)| e.label.to_port.kind() == PortKind::DataIn)
            .map(|(_, e)| e.from)
    }

    /// Producers of `block` as a work list: popping yields them in edge order.
    fn pending_producers(&self, block: BlockId) -> Vec<BlockId> {
        let mut producers: Vec<BlockId> = self.data_producers(block).collect();
        producers.reverse();
        producers
    }

    /// Finds a cycle among data edges, if any.
    ///
    /// The returned blocks are listed consumer first, each followed by the
    /// producer it depends on. The search keeps its own stack, so a long
    /// expression chain cannot exhaust the thread stack.
    #[must_use]
    pub fn data_cycle(&self) -> Option<Vec<BlockId>> {
        // false while on the current path, true once fully explored
        let mut done: HashMap<BlockId, bool> = HashMap::new();
        for (root, _) in self.graph.nodes() {
            if done.contains_key(&root) {
                continue;
            }
            let mut path = vec![root];
            let mut pending = vec![self.pending_producers(root)];
            done.insert(root, false);

            while let Some(producers) = pending.last_mut() {
                let Some(next) = producers.pop() else {
                    if let Some(finished) = path.pop() {
                        done.insert(finished, true);
                    }
                    pending.pop();
                    continue;
                };
                match done.get(&next) {
                    Some(true) => {}
                    Some(false) => {
                        let start = path.iter().position(|b| *b == next).unwrap_or(0);
                        return Some(path[start..].to_vec());
                    }
                    None => {
                        done.insert(next, false);
                        path.push(next);
                        pending.push(self.pending_producers(next));
                    }
                }
            }
        }
        None
    }

    /// Checks the whole-graph invariants the compiler relies on.
    ///
    /// # Errors
    ///
    /// Returns the structural problem or the data cycle found first.
    pub fn validate(&self) -> Result<(), CompileFailure> {
        let sources: Vec<BlockId> = self
            .graph
            .nodes()
            .filter(|(_, b)| matches!(b.kind, BlockKind::Source))
            .map(|(id, _)| id)
            .collect();
        match sources.as_slice() {
            [] => return Err(StructuralError::MissingSource.into()),
            [only] if *only == self.source => {}
            [_] => return Err(StructuralError::MissingSource.into()),
            _ => return Err(StructuralError::DuplicateSource { blocks: sources }.into()),
        }
        if let Some(cycle) = self.data_cycle() {
            return Err(CyclicDataDependency { cycle }.into());
        }
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Snapshot of the graph as a serializable document.
    #[must_use]
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument::from(self)
    }

    /// Rebuilds a graph from a document.
    ///
    /// # Errors
    ///
    /// See [`Self::from_parts`].
    pub fn from_document(document: GraphDocument) -> Result<Self, StructuralError> {
        Self::try_from(document)
    }

    /// Serializes the graph as YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if YAML serialization fails.
    pub fn to_text(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_document())
    }

    /// Parses a graph from YAML text produced by [`Self::to_text`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] for malformed text and
    /// [`DocumentError::Structural`] for a document describing an invalid
    /// graph.
    pub fn from_text(text: &str) -> Result<Self, DocumentError> {
        let document: GraphDocument = serde_yaml::from_str(text)?;
        Ok(Self::from_document(document)?)
    }

    /// Sorted edge list, for identity comparisons.
    fn edge_set(&self) -> Vec<(BlockId, Port, BlockId, Port)> {
        let mut edges: Vec<_> = self
            .graph
            .edges()
            .map(|(_, e)| (e.from, e.label.from_port, e.to, e.label.to_port))
            .collect();
        edges.sort_unstable();
        edges
    }
}

const fn flow() -> BlockEdge {
    BlockEdge {
        from_port: Port::Next,
        to_port: Port::FlowIn,
    }
}

/// Two graphs are equal when they have the same name, the same blocks under
/// the same handles, and the same set of edges. Revisions are ignored.
impl PartialEq for BlockGraph {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.source == other.source
            && self.block_count() == other.block_count()
            && self
                .blocks()
                .all(|(id, block)| other.block(id) == Some(block))
            && self.edge_set() == other.edge_set()
    }
}

impl TryFrom<GraphDocument> for BlockGraph {
    type Error = StructuralError;

    fn try_from(document: GraphDocument) -> Result<Self, Self::Error> {
        let blocks = document
            .blocks
            .into_iter()
            .map(|b| (b.id, Block { kind: b.kind, label: b.label }));
        let edges = document
            .edges
            .into_iter()
            .map(|e| (e.from.block, e.from.port, e.to.block, e.to.port));
        Self::from_parts(document.name, blocks, edges)
    }
}

impl From<BlockGraph> for GraphDocument {
    fn from(graph: BlockGraph) -> Self {
        Self::from(&graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BinaryOp;

    fn chain() -> (BlockGraph, BlockId, BlockId) {
        let mut g = BlockGraph::new("chain");
        let a = g.add_block(Block::action("first", 0)).unwrap();
        let b = g.add_block(Block::action("second", 0)).unwrap();
        g.connect(g.source(), Port::Next, a, Port::FlowIn).unwrap();
        g.connect(a, Port::Next, b, Port::FlowIn).unwrap();
        (g, a, b)
    }

    #[test]
    fn test_new_graph_has_one_source() {
        let g = BlockGraph::new("empty");
        assert_eq!(g.block_count(), 1);
        assert_eq!(
            g.block(g.source()).map(|b| &b.kind),
            Some(&BlockKind::Source)
        );
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_second_source_rejected() {
        let mut g = BlockGraph::new("g");
        let err = g.add_block(Block::new(BlockKind::Source)).unwrap_err();
        assert!(matches!(err, StructuralError::DuplicateSource { .. }));
    }

    #[test]
    fn test_source_cannot_be_removed() {
        let mut g = BlockGraph::new("g");
        assert_eq!(g.remove_block(g.source()), Err(StructuralError::SourceRemoval));
    }

    #[test]
    fn test_find_target_follows_flow() {
        let (g, a, b) = chain();
        assert_eq!(g.find_target(g.source(), Port::Next), Ok(Some(a)));
        assert_eq!(g.find_target(a, Port::Next), Ok(Some(b)));
        assert_eq!(g.find_target(b, Port::Next), Ok(None));
    }

    #[test]
    fn test_find_target_reports_dangling_when_required() {
        let (g, _, b) = chain();
        assert_eq!(
            g.find_target_with(b, Port::Next, false),
            Err(StructuralError::DanglingPort {
                block: b,
                port: Port::Next
            })
        );
    }

    #[test]
    fn test_unconsumed_data_out_is_dangling() {
        let mut g = BlockGraph::new("g");
        let lit = g.add_block(Block::literal(Literal::Int(1))).unwrap();
        assert!(matches!(
            g.find_target(lit, Port::Out),
            Err(StructuralError::DanglingPort { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "input port")]
    fn test_find_target_on_input_port_panics() {
        let (g, a, _) = chain();
        let _ = g.find_target(a, Port::FlowIn);
    }

    #[test]
    fn test_flow_out_accepts_one_successor() {
        let (mut g, a, _) = chain();
        let c = g.add_block(Block::action("third", 0)).unwrap();
        let err = g.connect(a, Port::Next, c, Port::FlowIn).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::InvalidConnection {
                reason: ConnectionViolation::FlowOutTaken,
                ..
            }
        ));
    }

    #[test]
    fn test_data_in_accepts_one_producer() {
        let mut g = BlockGraph::new("g");
        let assign = g.add_block(Block::assign("x")).unwrap();
        let one = g.add_block(Block::literal(Literal::Int(1))).unwrap();
        let two = g.add_block(Block::literal(Literal::Int(2))).unwrap();
        g.connect(one, Port::Out, assign, Port::Arg(0)).unwrap();
        let err = g.connect(two, Port::Out, assign, Port::Arg(0)).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::InvalidConnection {
                reason: ConnectionViolation::DataInTaken,
                ..
            }
        ));
        assert_eq!(g.data_source(assign, Port::Arg(0)), Some(one));
    }

    #[test]
    fn test_data_out_may_fan_out() {
        let mut g = BlockGraph::new("g");
        let x = g.add_block(Block::variable("x")).unwrap();
        let add = g.add_block(Block::binary(BinaryOp::Add)).unwrap();
        g.connect(x, Port::Out, add, Port::Arg(0)).unwrap();
        g.connect(x, Port::Out, add, Port::Arg(1)).unwrap();
        assert_eq!(g.find_target(x, Port::Out), Ok(Some(add)));
    }

    #[test]
    fn test_port_kind_mismatch_rejected() {
        let mut g = BlockGraph::new("g");
        let lit = g.add_block(Block::literal(Literal::Int(1))).unwrap();
        let act = g.add_block(Block::action("go", 1)).unwrap();
        let err = g.connect(g.source(), Port::Next, act, Port::Arg(0)).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::InvalidConnection {
                reason: ConnectionViolation::PortKindMismatch,
                ..
            }
        ));
        let err = g.connect(lit, Port::Next, act, Port::FlowIn).unwrap_err();
        assert!(matches!(
            err,
            StructuralError::InvalidConnection {
                reason: ConnectionViolation::UnknownPort,
                ..
            }
        ));
    }

    #[test]
    fn test_remove_block_drops_edges() {
        let (mut g, a, b) = chain();
        g.remove_block(a).unwrap();
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.find_target(g.source(), Port::Next), Ok(None));
        assert!(g.block(b).is_some());
    }

    #[test]
    fn test_revision_tracks_mutations() {
        let mut g = BlockGraph::new("g");
        let r0 = g.revision();
        let a = g.add_block(Block::action("a", 0)).unwrap();
        g.connect(g.source(), Port::Next, a, Port::FlowIn).unwrap();
        assert!(g.revision() > r0);
        let r1 = g.revision();
        assert!(g.connect(a, Port::Next, a, Port::FlowIn).is_err());
        assert_eq!(g.revision(), r1);
    }

    #[test]
    fn test_data_cycle_detected() {
        let mut g = BlockGraph::new("g");
        let add = g.add_block(Block::binary(BinaryOp::Add)).unwrap();
        let neg = g.add_block(Block::unary(crate::UnaryOp::Neg)).unwrap();
        g.connect(add, Port::Out, neg, Port::Arg(0)).unwrap();
        g.connect(neg, Port::Out, add, Port::Arg(0)).unwrap();
        let cycle = g.data_cycle().unwrap();
        assert_eq!(cycle.len(), 2);
        assert!(matches!(g.validate(), Err(CompileFailure::CyclicData(_))));
    }

    #[test]
    fn test_replace_block_keeps_compatible_edges() {
        let (mut g, a, _) = chain();
        let old = g.replace_block(a, Block::action("renamed", 0)).unwrap();
        assert_eq!(old, Block::action("first", 0));
        assert_eq!(g.find_target(g.source(), Port::Next), Ok(Some(a)));

        let err = g.replace_block(a, Block::literal(Literal::Null)).unwrap_err();
        assert!(matches!(err, StructuralError::InvalidBlock { .. }));
    }

    #[test]
    fn test_text_round_trip_preserves_identity() {
        let (g, _, _) = chain();
        let text = g.to_text().unwrap();
        let back = BlockGraph::from_text(&text).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_nan_literal_survives_text_round_trip() {
        let mut g = BlockGraph::new("g");
        let ret = g.add_block(Block::ret()).unwrap();
        let nan = g.add_block(Block::literal(Literal::Float(f64::NAN))).unwrap();
        let src = g.source();
        g.connect(src, Port::Next, ret, Port::FlowIn).unwrap();
        g.connect(nan, Port::Out, ret, Port::Arg(0)).unwrap();

        let back = BlockGraph::from_text(&g.to_text().unwrap()).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_reserved_word_blocks_rejected() {
        let mut g = BlockGraph::new("g");
        assert!(matches!(
            g.add_block(Block::assign("if")),
            Err(StructuralError::InvalidBlock { .. })
        ));
        assert!(matches!(
            g.add_block(Block::action("while", 0)),
            Err(StructuralError::InvalidBlock { .. })
        ));
        assert_eq!(g.block_count(), 1);
    }

    #[test]
    fn test_long_chain_reloads() {
        const LEN: usize = 20_000;
        let mut g = BlockGraph::new("long");
        let mut at = g.source();
        for _ in 0..LEN {
            let next = g.add_block(Block::action("step", 0)).unwrap();
            g.connect(at, Port::Next, next, Port::FlowIn).unwrap();
            at = next;
        }

        let back = BlockGraph::from_text(&g.to_text().unwrap()).unwrap();
        assert_eq!(back.edge_count(), LEN);
        assert_eq!(back.find_target(at, Port::Next), Ok(None));
        assert_eq!(back, g);
    }

    #[test]
    fn test_from_parts_rejects_missing_source() {
        let err = BlockGraph::from_parts(
            "g",
            vec![(crate::NodeId(0), Block::ret())],
            Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err, StructuralError::MissingSource);
    }

    #[test]
    fn test_always_true_shape() {
        let g = BlockGraph::always_true("guard");
        assert_eq!(g.block_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert!(g.validate().is_ok());
    }
}
