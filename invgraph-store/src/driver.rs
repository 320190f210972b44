//! A diesel-adjacent, in-memory reference implementation of
//! `invgraph::components::store::Store`. Exercises the merge engine and the
//! query translator end to end without requiring a concrete database, since
//! the real storage engine is an external collaborator this workspace
//! never implements.
//!
//! Grounded on the `EntityCache`/in-progress-table shape of
//! `graph/src/components/store.rs`, generalized from entity subgraphs to
//! named graphs of nodes and edges.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use invgraph::components::store::{ChangeCounts, GraphEvent, GraphEventStream, Store, StoreError};
use invgraph::data::edge::{Edge, EdgeType};
use invgraph::data::graph::GraphName;
use invgraph::data::node::{Node, NodeId};

/// One outstanding reservation in the in-progress table, tracked by
/// `mark_update`'s bookkeeping.
#[derive(Clone, Debug)]
pub struct InProgressUpdate {
    pub change_id: String,
    pub root: NodeId,
    pub parent_node_id: Option<NodeId>,
    pub ancestors: Vec<NodeId>,
    pub is_batch: bool,
    pub edge_types: HashSet<EdgeType>,
    pub created_at: SystemTime,
}

struct GraphState {
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    in_progress: Vec<InProgressUpdate>,
    staged: HashMap<String, (Vec<Node>, Vec<Edge>, HashSet<NodeId>)>,
    subscribers: Vec<std::sync::mpsc::Sender<GraphEvent>>,
}

impl GraphState {
    fn new() -> Self {
        GraphState {
            nodes: HashMap::new(),
            edges: Vec::new(),
            in_progress: Vec::new(),
            staged: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    fn notify(&mut self, event: GraphEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// The in-memory driver. A `Mutex<HashMap<GraphName, GraphState>>` gives a
/// single-writer-per-component concurrency model: the in-progress table is
/// mutated only under this lock.
pub struct InMemoryDriver {
    graphs: Mutex<HashMap<GraphName, GraphState>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        InMemoryDriver {
            graphs: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve `node_ids` for `change_id` against the given `root`. Returns
    /// `Err` with the conflicting change id when another in-flight update
    /// overlaps.
    pub fn mark_update_detailed(
        &self,
        graph: &GraphName,
        change_id: &str,
        root: NodeId,
        parent_node_id: Option<NodeId>,
        ancestors: Vec<NodeId>,
        is_batch: bool,
        edge_types: HashSet<EdgeType>,
    ) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs.entry(graph.clone()).or_insert_with(GraphState::new);
        let mut touched = HashSet::new();
        touched.insert(root.clone());
        touched.extend(ancestors.iter().cloned());
        if let Some(parent) = &parent_node_id {
            touched.insert(parent.clone());
        }
        for existing in &state.in_progress {
            let mut existing_touched: HashSet<NodeId> = HashSet::new();
            existing_touched.insert(existing.root.clone());
            existing_touched.extend(existing.ancestors.iter().cloned());
            if let Some(parent) = &existing.parent_node_id {
                existing_touched.insert(parent.clone());
            }
            if !touched.is_disjoint(&existing_touched) {
                if existing.change_id == change_id {
                    return Err(StoreError::InvalidBatchUpdate(format!(
                        "change {} is already marked in progress",
                        change_id
                    )));
                }
                return Err(StoreError::ConflictingChangeInProgress(existing_touched.len()));
            }
        }
        state.in_progress.push(InProgressUpdate {
            change_id: change_id.to_owned(),
            root,
            parent_node_id,
            ancestors,
            is_batch,
            edge_types,
            created_at: SystemTime::now(),
        });
        Ok(())
    }

    pub fn release_update_detailed(&self, graph: &GraphName, change_id: &str) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs
            .get_mut(graph)
            .ok_or_else(|| StoreError::UnknownGraph(graph.to_string()))?;
        state.in_progress.retain(|u| u.change_id != change_id);
        Ok(())
    }

    pub fn list_in_progress(&self, graph: &GraphName) -> Vec<InProgressUpdate> {
        let graphs = self.graphs.lock().unwrap();
        graphs.get(graph).map(|s| s.in_progress.clone()).unwrap_or_default()
    }

    /// Stage inserts/updates/deletes under `change_id` without touching the
    /// primary collections (batch mode).
    pub fn stage(&self, graph: &GraphName, change_id: &str, nodes: Vec<Node>, edges: Vec<Edge>, deletes: HashSet<NodeId>) {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs.entry(graph.clone()).or_insert_with(GraphState::new);
        state.staged.insert(change_id.to_owned(), (nodes, edges, deletes));
    }

    /// Move a staged change's rows into the primary collections.
    pub fn commit_staged(&self, graph: &GraphName, change_id: &str) -> Result<ChangeCounts, StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs
            .get_mut(graph)
            .ok_or_else(|| StoreError::UnknownGraph(graph.to_string()))?;
        let (nodes, edges, deletes) = state
            .staged
            .remove(change_id)
            .ok_or_else(|| StoreError::InvalidBatchUpdate(format!("no staged change {}", change_id)))?;
        let mut counts = ChangeCounts::default();
        for id in &deletes {
            if state.nodes.remove(id).is_some() {
                counts.nodes_deleted += 1;
            }
        }
        for node in nodes {
            let existed = state.nodes.insert(node.id.clone(), node).is_some();
            if existed {
                counts.nodes_updated += 1;
            } else {
                counts.nodes_created += 1;
            }
        }
        for edge in edges {
            state.edges.push(edge);
            counts.edges_created += 1;
        }
        state.in_progress.retain(|u| u.change_id != change_id);
        Ok(counts)
    }

    pub fn abort_staged(&self, graph: &GraphName, change_id: &str) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs
            .get_mut(graph)
            .ok_or_else(|| StoreError::UnknownGraph(graph.to_string()))?;
        state.staged.remove(change_id);
        state.in_progress.retain(|u| u.change_id != change_id);
        Ok(())
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for InMemoryDriver {
    fn get(&self, graph: &GraphName, id: &NodeId) -> Result<Option<Node>, StoreError> {
        let graphs = self.graphs.lock().unwrap();
        Ok(graphs.get(graph).and_then(|s| s.nodes.get(id).cloned()))
    }

    fn all_nodes(&self, graph: &GraphName) -> Result<Vec<Node>, StoreError> {
        let graphs = self.graphs.lock().unwrap();
        Ok(graphs.get(graph).map(|s| s.nodes.values().cloned().collect()).unwrap_or_default())
    }

    fn all_edges(&self, graph: &GraphName) -> Result<Vec<Edge>, StoreError> {
        let graphs = self.graphs.lock().unwrap();
        Ok(graphs.get(graph).map(|s| s.edges.clone()).unwrap_or_default())
    }

    fn upsert_node(&self, graph: &GraphName, node: Node) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs.entry(graph.clone()).or_insert_with(GraphState::new);
        let id = node.id.clone();
        state.nodes.insert(id.clone(), node);
        state.notify(GraphEvent::set(graph.clone(), id));
        Ok(())
    }

    fn upsert_edge(&self, graph: &GraphName, edge: Edge) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs.entry(graph.clone()).or_insert_with(GraphState::new);
        state
            .edges
            .retain(|e| !(e.from == edge.from && e.to == edge.to && e.edge_type == edge.edge_type));
        state.edges.push(edge);
        Ok(())
    }

    fn remove_node(&self, graph: &GraphName, id: &NodeId) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs
            .get_mut(graph)
            .ok_or_else(|| StoreError::UnknownGraph(graph.to_string()))?;
        state.nodes.remove(id);
        state.edges.retain(|e| &e.from != id && &e.to != id);
        state.notify(GraphEvent::removed(graph.clone(), id.clone()));
        Ok(())
    }

    fn mark_update(&self, graph: &GraphName, node_ids: &HashSet<NodeId>) -> Result<String, StoreError> {
        let change_id = format!("{:?}", SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or(Duration::from_secs(0)));
        let root = node_ids.iter().next().cloned().ok_or_else(|| StoreError::Unknown("no nodes to mark".into()))?;
        self.mark_update_detailed(graph, &change_id, root, None, Vec::new(), false, HashSet::new())?;
        Ok(change_id)
    }

    fn release_update(&self, graph: &GraphName, update_id: &str, _aborted: bool) -> Result<(), StoreError> {
        self.release_update_detailed(graph, update_id)
    }

    fn subscribe(&self, graph: &GraphName) -> Result<GraphEventStream, StoreError> {
        let (tx, rx) = channel();
        let mut graphs = self.graphs.lock().unwrap();
        let state = graphs.entry(graph.clone()).or_insert_with(GraphState::new);
        state.subscribers.push(tx);
        Ok(GraphEventStream::new(rx))
    }

    fn list_graphs(&self) -> Result<Vec<GraphName>, StoreError> {
        let graphs = self.graphs.lock().unwrap();
        Ok(graphs.keys().cloned().collect())
    }

    fn create_graph(&self, graph: &GraphName) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        graphs.entry(graph.clone()).or_insert_with(GraphState::new);
        Ok(())
    }

    fn drop_graph(&self, graph: &GraphName) -> Result<(), StoreError> {
        let mut graphs = self.graphs.lock().unwrap();
        graphs.remove(graph);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_and_get_round_trips_a_node() {
        let driver = InMemoryDriver::new();
        let graph = GraphName::new("aws").unwrap();
        let node = Node::new(NodeId::from("root"), json!({"kind": "graph_root"}), "u1".to_owned());
        driver.upsert_node(&graph, node.clone()).unwrap();
        let fetched = driver.get(&graph, &NodeId::from("root")).unwrap();
        assert_eq!(fetched, Some(node));
    }

    #[test]
    fn mark_update_detects_conflicting_change() {
        let driver = InMemoryDriver::new();
        let graph = GraphName::new("aws").unwrap();
        driver
            .mark_update_detailed(&graph, "change-1", NodeId::from("root"), None, Vec::new(), false, HashSet::new())
            .unwrap();
        let err = driver
            .mark_update_detailed(&graph, "change-2", NodeId::from("root"), None, Vec::new(), false, HashSet::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::ConflictingChangeInProgress(_)));
    }

    #[test]
    fn marking_same_change_id_twice_is_invalid() {
        let driver = InMemoryDriver::new();
        let graph = GraphName::new("aws").unwrap();
        driver
            .mark_update_detailed(&graph, "change-1", NodeId::from("root"), None, Vec::new(), false, HashSet::new())
            .unwrap();
        let err = driver
            .mark_update_detailed(&graph, "change-1", NodeId::from("root"), None, Vec::new(), false, HashSet::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatchUpdate(_)));
    }
}
