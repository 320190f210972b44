//! In-memory view over an incoming subgraph: root discovery, cycle
//! detection over `default` edges, and the visited-tracking diff helpers the
//! merge engine drives its insert/update/delete decisions from.
//!
//! A direct port of the behavior `GraphAccess`/`GraphBuilder` provide in
//! `original_source/keepercore/core/db/graphdb.py` (`access.root()`,
//! `access.not_visited_nodes()`, `access.has_edge(...)`, `access.edge_types`),
//! and grounded on the diff-tracking shape of
//! `graph/src/components/store.rs::EntityCache`.

use std::collections::{HashMap, HashSet};

use invgraph::data::edge::{Edge, EdgeType};
use invgraph::data::node::{Node, NodeId};

#[derive(Debug, Fail)]
pub enum AccessError {
    #[fail(display = "subgraph has no root node")]
    NoRoot,
    #[fail(display = "subgraph has more than one root candidate: {:?}", _0)]
    MultipleRoots(Vec<String>),
    #[fail(display = "cycle detected in subgraph involving node {}", _0)]
    Cycle(String),
}

/// An incoming batch of nodes and edges, prior to being reconciled with the
/// stored graph.
pub struct GraphAccess {
    nodes: HashMap<NodeId, Node>,
    edges: Vec<Edge>,
    root: NodeId,
    visited_nodes: HashSet<NodeId>,
    visited_edges: HashSet<(NodeId, NodeId, EdgeType)>,
}

impl GraphAccess {
    /// Build a `GraphAccess` from a flat node/edge list, validating a
    /// single root and acyclicity over `default` edges before anything
    /// else happens.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, AccessError> {
        let root = find_root(&nodes, &edges)?;
        check_acyclic(&nodes, &edges, &root)?;
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Ok(GraphAccess {
            nodes,
            edges,
            root,
            visited_nodes: HashSet::new(),
            visited_edges: HashSet::new(),
        })
    }

    pub fn root(&self) -> &NodeId {
        &self.root
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn edge_types(&self) -> HashSet<EdgeType> {
        self.edges.iter().map(|e| e.edge_type.clone()).collect()
    }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId, edge_type: &EdgeType) -> bool {
        self.edges.iter().any(|e| &e.from == from && &e.to == to && &e.edge_type == edge_type)
    }

    /// Mark a node visited during the diff walk against the stored slice.
    pub fn mark_visited_node(&mut self, id: NodeId) {
        self.visited_nodes.insert(id);
    }

    pub fn mark_visited_edge(&mut self, from: NodeId, to: NodeId, edge_type: EdgeType) {
        self.visited_edges.insert((from, to, edge_type));
    }

    /// Nodes in this subgraph that the diff walk never visited against the
    /// stored slice: these become inserts.
    pub fn not_visited_nodes(&self) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| !self.visited_nodes.contains(&n.id))
            .collect()
    }

    pub fn not_visited_edges(&self) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| !self.visited_edges.contains(&(e.from.clone(), e.to.clone(), e.edge_type.clone())))
            .collect()
    }

    /// Ancestors of `node_id` found by reverse-traversing `default` edges,
    /// used to back-fill the in-progress reservation record.
    pub fn ancestors(&self, node_id: &NodeId) -> Vec<NodeId> {
        let mut reverse: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in &self.edges {
            if edge.edge_type == EdgeType::Default {
                reverse.entry(&edge.to).or_default().push(&edge.from);
            }
        }
        let mut seen = HashSet::new();
        let mut stack = vec![node_id];
        let mut result = Vec::new();
        while let Some(current) = stack.pop() {
            if let Some(parents) = reverse.get(current) {
                for parent in parents {
                    if seen.insert((*parent).clone()) {
                        result.push((*parent).clone());
                        stack.push(parent);
                    }
                }
            }
        }
        result
    }
}

fn find_root(nodes: &[Node], edges: &[Edge]) -> Result<NodeId, AccessError> {
    let has_incoming_default: HashSet<&NodeId> = edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Default)
        .map(|e| &e.to)
        .collect();
    let candidates: Vec<&Node> = nodes.iter().filter(|n| !has_incoming_default.contains(&n.id)).collect();
    match candidates.len() {
        0 => Err(AccessError::NoRoot),
        1 => Ok(candidates[0].id.clone()),
        _ => Err(AccessError::MultipleRoots(candidates.iter().map(|n| n.id.to_string()).collect())),
    }
}

fn check_acyclic(nodes: &[Node], edges: &[Edge], root: &NodeId) -> Result<(), AccessError> {
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in edges {
        if edge.edge_type == EdgeType::Default {
            adjacency.entry(&edge.from).or_default().push(&edge.to);
        }
    }
    let mut state: HashMap<&NodeId, u8> = HashMap::new(); // 0 unvisited, 1 in-progress, 2 done
    for node in nodes {
        if state.get(&node.id).copied().unwrap_or(0) == 0 {
            visit(&node.id, &adjacency, &mut state)?;
        }
    }
    let _ = root;
    Ok(())
}

fn visit<'a>(
    id: &'a NodeId,
    adjacency: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
    state: &mut HashMap<&'a NodeId, u8>,
) -> Result<(), AccessError> {
    state.insert(id, 1);
    if let Some(neighbors) = adjacency.get(id) {
        for next in neighbors {
            match state.get(*next).copied().unwrap_or(0) {
                0 => visit(next, adjacency, state)?,
                1 => return Err(AccessError::Cycle(next.to_string())),
                _ => {}
            }
        }
    }
    state.insert(id, 2);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str) -> Node {
        Node::new(NodeId::from(id), json!({"kind": "test"}), "u1".to_owned())
    }

    #[test]
    fn finds_single_root_with_no_incoming_default_edge() {
        let nodes = vec![node("root"), node("child")];
        let edges = vec![Edge::new(NodeId::from("root"), NodeId::from("child"), EdgeType::Default, "u1")];
        let access = GraphAccess::new(nodes, edges).unwrap();
        assert_eq!(access.root().as_str(), "root");
    }

    #[test]
    fn rejects_multiple_roots() {
        let nodes = vec![node("a"), node("b")];
        let access = GraphAccess::new(nodes, vec![]);
        assert!(matches!(access, Err(AccessError::MultipleRoots(_))));
    }

    #[test]
    fn rejects_cycles_in_default_edges() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![
            Edge::new(NodeId::from("a"), NodeId::from("b"), EdgeType::Default, "u1"),
            Edge::new(NodeId::from("b"), NodeId::from("a"), EdgeType::Default, "u1"),
        ];
        let access = GraphAccess::new(nodes, edges);
        assert!(matches!(access, Err(AccessError::Cycle(_))));
    }

    #[test]
    fn ancestors_walks_default_edges_in_reverse() {
        let nodes = vec![node("root"), node("mid"), node("leaf")];
        let edges = vec![
            Edge::new(NodeId::from("root"), NodeId::from("mid"), EdgeType::Default, "u1"),
            Edge::new(NodeId::from("mid"), NodeId::from("leaf"), EdgeType::Default, "u1"),
        ];
        let access = GraphAccess::new(nodes, edges).unwrap();
        let ancestors = access.ancestors(&NodeId::from("leaf"));
        assert!(ancestors.contains(&NodeId::from("mid")));
        assert!(ancestors.contains(&NodeId::from("root")));
    }
}
