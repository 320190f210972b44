//! The storage-driver-facing vocabulary: what a driver reports back after a
//! mutation, and the trait a concrete backend implements.
//!
//! Generalizes the `EntityChange`/`StoreEvent`/`Store` trio in
//! `graph::components::store` from blockchain subgraph entities to the
//! node/edge/named-graph model of this crate.

use std::collections::HashSet;
use std::fmt;
use std::sync::mpsc::Receiver;

use crate::data::edge::Edge;
use crate::data::graph::GraphName;
use crate::data::node::{Node, NodeId};

/// What happened to a node as the result of a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphEventOperation {
    Set,
    Removed,
}

/// One node-level change, the unit a driver reports after applying a merge:
/// every node whose content hash differs from what was stored emits one of
/// these.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEvent {
    pub graph: GraphName,
    pub node_id: NodeId,
    pub operation: GraphEventOperation,
}

impl GraphEvent {
    pub fn set(graph: GraphName, node_id: NodeId) -> Self {
        GraphEvent {
            graph,
            node_id,
            operation: GraphEventOperation::Set,
        }
    }

    pub fn removed(graph: GraphName, node_id: NodeId) -> Self {
        GraphEvent {
            graph,
            node_id,
            operation: GraphEventOperation::Removed,
        }
    }
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{:?}", self.graph, self.node_id, self.operation)
    }
}

/// Summary counters a merge returns to its caller: used to decide the apply
/// strategy and reported back to the command pipeline as `graph_update_stats`
/// via the `@RESULT@` placeholder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub edges_created: usize,
    pub edges_deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.nodes_created + self.nodes_updated + self.nodes_deleted + self.edges_created + self.edges_deleted
    }
}

impl std::ops::AddAssign for ChangeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_created += rhs.nodes_created;
        self.nodes_updated += rhs.nodes_updated;
        self.nodes_deleted += rhs.nodes_deleted;
        self.edges_created += rhs.edges_created;
        self.edges_deleted += rhs.edges_deleted;
    }
}

/// A subscribable stream of `GraphEvent`s, the way `StoreEventStreamBox`
/// lets `graph-graphql` watch for changes without polling the driver.
pub struct GraphEventStream {
    inner: Receiver<GraphEvent>,
}

impl GraphEventStream {
    pub fn new(inner: Receiver<GraphEvent>) -> Self {
        GraphEventStream { inner }
    }

    /// Blocks until the next event, or returns `None` once the driver side
    /// has dropped its sender.
    pub fn next(&self) -> Option<GraphEvent> {
        self.inner.recv().ok()
    }

    /// Drain all events currently buffered, without blocking.
    pub fn drain(&self) -> Vec<GraphEvent> {
        self.inner.try_iter().collect()
    }
}

/// What a backend needs to expose for the graph access layer, merge engine
/// and query translator to operate against it, without tying any of them to
/// a concrete database. A concrete storage driver is never shipped by this
/// workspace; this trait is the seam a real one would implement.
pub trait Store: Send + Sync {
    /// Fetch a single node by id, or `None` if it does not exist.
    fn get(&self, graph: &GraphName, id: &NodeId) -> Result<Option<Node>, StoreError>;

    /// Fetch every node currently reachable from `root` in `graph`.
    fn all_nodes(&self, graph: &GraphName) -> Result<Vec<Node>, StoreError>;

    /// Fetch every edge currently stored in `graph`.
    fn all_edges(&self, graph: &GraphName) -> Result<Vec<Edge>, StoreError>;

    /// Insert or overwrite a node.
    fn upsert_node(&self, graph: &GraphName, node: Node) -> Result<(), StoreError>;

    /// Insert an edge, replacing any existing edge with the same
    /// `(from, to, edge_type)` key.
    fn upsert_edge(&self, graph: &GraphName, edge: Edge) -> Result<(), StoreError>;

    /// Remove a node and every edge touching it.
    fn remove_node(&self, graph: &GraphName, id: &NodeId) -> Result<(), StoreError>;

    /// Reserve `node_ids` against concurrent merges into the same graph,
    /// returning the reservation token the caller must release with
    /// `release_update`. Mirrors `mark_update`'s in-progress bookkeeping.
    fn mark_update(&self, graph: &GraphName, node_ids: &HashSet<NodeId>) -> Result<String, StoreError>;

    /// Release a reservation made by `mark_update`, committing (`aborted =
    /// false`) or discarding (`aborted = true`) its effect.
    fn release_update(&self, graph: &GraphName, update_id: &str, aborted: bool) -> Result<(), StoreError>;

    /// Subscribe to change notifications for `graph`.
    fn subscribe(&self, graph: &GraphName) -> Result<GraphEventStream, StoreError>;

    /// List the graphs currently known to this driver.
    fn list_graphs(&self) -> Result<Vec<GraphName>, StoreError>;

    /// Create an empty named graph if it does not already exist.
    fn create_graph(&self, graph: &GraphName) -> Result<(), StoreError>;

    /// Drop a named graph and everything in it.
    fn drop_graph(&self, graph: &GraphName) -> Result<(), StoreError>;
}

/// Errors a `Store` implementation can surface, mapped to HTTP-ish status
/// codes the way `StoreError` feeds `server::json-rpc`'s error responses in
/// `graph`, without this crate depending on any HTTP crate itself.
#[derive(Debug, Fail)]
pub enum StoreError {
    #[fail(display = "unknown graph: {}", _0)]
    UnknownGraph(String),

    #[fail(display = "unknown node: {}", _0)]
    UnknownNode(String),

    #[fail(display = "a conflicting change to {} nodes is already in progress", _0)]
    ConflictingChangeInProgress(usize),

    #[fail(display = "invalid batch update: {}", _0)]
    InvalidBatchUpdate(String),

    #[fail(display = "query execution error: {}", _0)]
    QueryExecutionError(String),

    #[fail(display = "{}", _0)]
    Unknown(String),
}

impl StoreError {
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::UnknownGraph(_) | StoreError::UnknownNode(_) => 404,
            StoreError::ConflictingChangeInProgress(_) => 423,
            StoreError::InvalidBatchUpdate(_) => 400,
            StoreError::QueryExecutionError(_) => 400,
            StoreError::Unknown(_) => 500,
        }
    }
}

impl From<String> for StoreError {
    fn from(s: String) -> Self {
        StoreError::Unknown(s)
    }
}

#[test]
fn change_counts_add_assign_accumulates() {
    let mut total = ChangeCounts::default();
    total += ChangeCounts {
        nodes_created: 2,
        nodes_updated: 1,
        ..Default::default()
    };
    total += ChangeCounts {
        edges_created: 3,
        ..Default::default()
    };
    assert_eq!(total.total(), 6);
}

#[test]
fn store_error_http_status_mapping() {
    assert_eq!(StoreError::UnknownGraph("g".into()).http_status(), 404);
    assert_eq!(StoreError::ConflictingChangeInProgress(2).http_status(), 423);
}
