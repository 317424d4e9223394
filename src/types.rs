//! Public identifier and query types for the adjacency engine.

use std::fmt;

use smallvec::SmallVec;

/// Identifier of a node in the graph.
///
/// Ids are minted sequentially by [`crate::AdjacencyList::add_node`]; valid
/// ids are `0..next_id`. Nodes carry no payload inside the engine.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub u32);

/// Tag distinguishing parallel edges between the same endpoints.
///
/// Type `0` is reserved as the null/free marker inside the storage buffers
/// and is rejected by every mutation.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EdgeType(pub u32);

/// Conventional default edge type for callers that do not distinguish types.
pub const NULL_EDGE_TYPE: EdgeType = EdgeType(1);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for u32 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl From<u32> for EdgeType {
    fn from(value: u32) -> Self {
        EdgeType(value)
    }
}

impl From<EdgeType> for u32 {
    fn from(value: EdgeType) -> Self {
        value.0
    }
}

/// Edge-type selector for neighborhood queries.
///
/// Accepts a single type, a set of types, or the wildcard matching every
/// type. Conversions exist from [`EdgeType`], slices and arrays, so query
/// call sites read naturally:
///
/// ```
/// use filament::{AdjacencyList, EdgeType, TypeFilter};
///
/// let mut graph = AdjacencyList::<u32>::new();
/// let a = graph.add_node().unwrap();
/// let b = graph.add_node().unwrap();
/// graph.add_edge(a, b, EdgeType(2)).unwrap();
///
/// assert!(graph.has_edge(a, b, EdgeType(2)));
/// assert!(graph.has_edge(a, b, [EdgeType(1), EdgeType(2)]));
/// assert!(graph.has_edge(a, b, TypeFilter::All));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeFilter {
    /// Match every edge type.
    All,
    /// Match exactly one type.
    Single(EdgeType),
    /// Match any type in the set.
    Any(SmallVec<[EdgeType; 4]>),
}

impl TypeFilter {
    /// Returns true if `ty` is selected by this filter.
    #[inline]
    pub fn matches(&self, ty: EdgeType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Single(t) => *t == ty,
            TypeFilter::Any(set) => set.contains(&ty),
        }
    }
}

impl From<EdgeType> for TypeFilter {
    fn from(ty: EdgeType) -> Self {
        TypeFilter::Single(ty)
    }
}

impl From<&[EdgeType]> for TypeFilter {
    fn from(types: &[EdgeType]) -> Self {
        TypeFilter::Any(types.iter().copied().collect())
    }
}

impl<const N: usize> From<[EdgeType; N]> for TypeFilter {
    fn from(types: [EdgeType; N]) -> Self {
        TypeFilter::Any(types.iter().copied().collect())
    }
}

impl From<Vec<EdgeType>> for TypeFilter {
    fn from(types: Vec<EdgeType>) -> Self {
        TypeFilter::Any(types.into_iter().collect())
    }
}

/// A live edge yielded by [`crate::AdjacencyList::all_edges`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Edge {
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Edge type tag.
    pub ty: EdgeType,
}

/// An inbound neighbor entry: the source node and the connecting type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InboundEdge {
    /// Node the edge originates from.
    pub from: NodeId,
    /// Edge type tag.
    pub ty: EdgeType,
}

/// An outbound neighbor entry: the target node and the connecting type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutboundEdge {
    /// Node the edge points at.
    pub to: NodeId,
    /// Edge type tag.
    pub ty: EdgeType,
}
