//! Minimal directed multigraph
//!
//! Nodes and edges live in insertion-ordered arenas keyed by stable integer
//! handles. Edges store endpoint handles rather than references, so a graph
//! never owns a cycle of pointers and structural checks are pure functions
//! over the arenas.
//!
//! Iteration order is always insertion order (removals keep the relative
//! order of the survivors), which is what makes the compiler and the phase
//! machine deterministic.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Stable handle for a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable handle for an edge in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directed edge carrying a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<E> {
    /// Tail of the edge
    pub from: NodeId,
    /// Head of the edge
    pub to: NodeId,
    /// Edge payload
    pub label: E,
}

/// Edge handles attached to one node, each list in insertion order.
#[derive(Debug, Clone, Default)]
struct Adjacency {
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
}

/// Directed graph with node payloads `N` and edge labels `E`.
///
/// Parallel edges are allowed at this level; specialised graphs (such as
/// [`crate::BlockGraph`]) layer their own connection rules on top.
/// Adjacency queries only touch the edges incident to the node asked about.
#[derive(Debug, Clone)]
pub struct Graph<N, E> {
    nodes: IndexMap<NodeId, N>,
    edges: IndexMap<EdgeId, Edge<E>>,
    adjacency: HashMap<NodeId, Adjacency>,
    next_node: u32,
    next_edge: u32,
}

impl<N, E> Default for Graph<N, E> {
    fn default() -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            adjacency: HashMap::new(),
            next_node: 0,
            next_edge: 0,
        }
    }
}

impl<N, E> Graph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Adds a node and returns its handle.
    pub fn add_node(&mut self, node: N) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node = self.next_node.saturating_add(1);
        self.nodes.insert(id, node);
        self.adjacency.insert(id, Adjacency::default());
        id
    }

    /// Inserts a node under an explicit handle, as used when rehydrating a
    /// saved graph. Returns the previous payload if the handle was taken.
    pub fn insert_node(&mut self, id: NodeId, node: N) -> Option<N> {
        self.next_node = self.next_node.max(id.0.saturating_add(1));
        self.adjacency.entry(id).or_default();
        self.nodes.insert(id, node)
    }

    /// Removes a node together with every edge touching it.
    ///
    /// Returns the node payload and the removed edges, or `None` if the
    /// handle is unknown.
    pub fn remove_node(&mut self, id: NodeId) -> Option<(N, Vec<Edge<E>>)> {
        let node = self.nodes.shift_remove(&id)?;
        let mut incident = self
            .adjacency
            .get(&id)
            .map(|adj| {
                let mut all = adj.outgoing.clone();
                all.extend(&adj.incoming);
                all
            })
            .unwrap_or_default();
        incident.sort_unstable();
        incident.dedup();
        let removed = incident
            .into_iter()
            .filter_map(|eid| self.remove_edge(eid))
            .collect();
        self.adjacency.remove(&id);
        Some((node, removed))
    }

    /// Returns the payload of a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(&id)
    }

    /// Returns the payload of a node mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(&id)
    }

    /// Returns `true` if the handle refers to a live node.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterates over nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> {
        self.nodes.iter().map(|(id, n)| (*id, n))
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Adds an edge between two existing nodes.
    ///
    /// Returns `None` (and leaves the graph untouched) if either endpoint is
    /// unknown.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, label: E) -> Option<EdgeId> {
        if !self.contains_node(from) || !self.contains_node(to) {
            return None;
        }
        let id = EdgeId(self.next_edge);
        self.next_edge = self.next_edge.saturating_add(1);
        self.edges.insert(id, Edge { from, to, label });
        self.adjacency.entry(from).or_default().outgoing.push(id);
        self.adjacency.entry(to).or_default().incoming.push(id);
        Some(id)
    }

    /// Removes an edge.
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge<E>> {
        let edge = self.edges.shift_remove(&id)?;
        if let Some(adj) = self.adjacency.get_mut(&edge.from) {
            adj.outgoing.retain(|e| *e != id);
        }
        if let Some(adj) = self.adjacency.get_mut(&edge.to) {
            adj.incoming.retain(|e| *e != id);
        }
        Some(edge)
    }

    /// Returns an edge.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge<E>> {
        self.edges.get(&id)
    }

    /// Returns an edge mutably.
    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge<E>> {
        self.edges.get_mut(&id)
    }

    /// Iterates over edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.edges.iter().map(|(id, e)| (*id, e))
    }

    /// Number of live edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges leaving `node`, in insertion order.
    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.incident(node, |adj| adj.outgoing.as_slice())
    }

    /// Edges entering `node`, in insertion order.
    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.incident(node, |adj| adj.incoming.as_slice())
    }

    /// Heads of the edges leaving `node`.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing(node).map(|(_, e)| e.to)
    }

    fn incident(
        &self,
        node: NodeId,
        side: fn(&Adjacency) -> &[EdgeId],
    ) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.adjacency
            .get(&node)
            .map(side)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).map(|e| (*id, e)))
    }
}
