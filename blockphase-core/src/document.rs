//! Serializable form of a block graph
//!
//! ```yaml
//! name: deal
//! blocks:
//!   - id: 0
//!     kind: source
//!   - id: 1
//!     kind: action
//!     name: dealCards
//!     arity: 1
//!   - id: 2
//!     kind: literal
//!     value: 5
//! edges:
//!   - from: 0.next
//!     to: 1.flow_in
//!   - from: 2.out
//!     to: 1.arg0
//! ```
//!
//! Block ids are the graph's own handles, so a graph reloads with the same
//! identity it was saved with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::block::{BlockId, BlockKind, Port};
use crate::block_graph::BlockGraph;
use crate::graph::NodeId;

/// A whole block graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDocument {
    /// Name used in diagnostics; may be left empty in a machine file, where
    /// the owning transition supplies one
    #[serde(default)]
    pub name: String,

    /// Blocks with their handles
    #[serde(default)]
    pub blocks: Vec<BlockDocument>,

    /// Port-to-port connections
    #[serde(default)]
    pub edges: Vec<EdgeDocument>,
}

/// One block of a [`GraphDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDocument {
    /// Block handle
    pub id: BlockId,

    /// Kind and kind-specific data
    #[serde(flatten)]
    pub kind: BlockKind,

    /// Editor caption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One edge of a [`GraphDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDocument {
    /// Output side
    pub from: Endpoint,
    /// Input side
    pub to: Endpoint,
}

/// A port on a specific block, written `<id>.<port>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    /// Block handle
    pub block: BlockId,
    /// Port name
    pub port: Port,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block.0, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block, port) = s
            .split_once('.')
            .ok_or_else(|| format!("endpoint '{s}' must look like '<block>.<port>'"))?;
        let block = block
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("endpoint '{s}' has a non-numeric block id"))?;
        Ok(Self {
            block: NodeId(block),
            port: port.trim().parse()?,
        })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl From<&BlockGraph> for GraphDocument {
    fn from(graph: &BlockGraph) -> Self {
        Self {
            name: graph.name().to_string(),
            blocks: graph
                .blocks()
                .map(|(id, block)| BlockDocument {
                    id,
                    kind: block.kind.clone(),
                    label: block.label.clone(),
                })
                .collect(),
            edges: graph
                .edges()
                .map(|(_, e)| EdgeDocument {
                    from: Endpoint {
                        block: e.from,
                        port: e.label.from_port,
                    },
                    to: Endpoint {
                        block: e.to,
                        port: e.label.to_port,
                    },
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralError;

    const DEAL: &str = r"
name: deal
blocks:
  - id: 0
    kind: source
  - id: 1
    kind: action
    name: dealCards
    arity: 1
    label: Deal
  - id: 2
    kind: literal
    value: 5
edges:
  - from: 0.next
    to: 1.flow_in
  - from: 2.out
    to: 1.arg0
";

    #[test]
    fn test_endpoint_parsing() {
        let e: Endpoint = "12.arg3".parse().unwrap();
        assert_eq!(e.block, NodeId(12));
        assert_eq!(e.port, Port::Arg(3));
        assert_eq!(e.to_string(), "12.arg3");
        assert!("next".parse::<Endpoint>().is_err());
        assert!("x.next".parse::<Endpoint>().is_err());
        assert!("1.nowhere".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_document_loads_into_graph() {
        let doc: GraphDocument = serde_yaml::from_str(DEAL).unwrap();
        let graph = BlockGraph::from_document(doc).unwrap();
        assert_eq!(graph.name(), "deal");
        assert_eq!(graph.block_count(), 3);
        assert_eq!(graph.find_target(graph.source(), Port::Next), Ok(Some(NodeId(1))));
        assert_eq!(
            graph.block(NodeId(1)).and_then(|b| b.label.as_deref()),
            Some("Deal")
        );
    }

    #[test]
    fn test_document_rejects_bad_wiring() {
        let text = DEAL.replace("to: 1.arg0", "to: 1.flow_in");
        let doc: GraphDocument = serde_yaml::from_str(&text).unwrap();
        assert!(matches!(
            BlockGraph::from_document(doc),
            Err(StructuralError::InvalidConnection { .. })
        ));
    }

    #[test]
    fn test_document_rejects_duplicate_ids() {
        let text = DEAL.replace("id: 2", "id: 1");
        let doc: GraphDocument = serde_yaml::from_str(&text).unwrap();
        assert_eq!(
            BlockGraph::from_document(doc),
            Err(StructuralError::DuplicateBlockId(NodeId(1)))
        );
    }

    #[test]
    fn test_snapshot_lists_blocks_in_order() {
        let doc: GraphDocument = serde_yaml::from_str(DEAL).unwrap();
        let graph = BlockGraph::from_document(doc.clone()).unwrap();
        assert_eq!(GraphDocument::from(&graph), doc);
    }
}
