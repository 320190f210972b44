//! Fixture builders for nodes, edges and a pre-seeded in-memory driver,
//! grounded on `MockBlockStreamBuilder` in `graph-mock`: a small builder a
//! test configures once, then asks for the finished collaborator instead of
//! repeating the same setup boilerplate in every crate's test module.

use serde_json::Value as Json;

use invgraph::components::store::Store;
use invgraph::data::edge::{Edge, EdgeType};
use invgraph::data::graph::GraphName;
use invgraph::data::node::{Node, NodeId};
use invgraph_store::driver::InMemoryDriver;

/// Build a single node fixture with a fixed `"mock"` update id.
pub fn node(id: &str, reported: Json) -> Node {
    Node::new(NodeId::from(id), reported, "mock")
}

/// Accumulates nodes and edges for one named graph, then seeds them into a
/// fresh [`InMemoryDriver`].
pub struct GraphFixture {
    graph: GraphName,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphFixture {
    pub fn new(graph: &str) -> Self {
        GraphFixture {
            graph: GraphName::new(graph).expect("fixture graph name must be valid"),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_node(mut self, id: &str, reported: Json) -> Self {
        self.nodes.push(node(id, reported));
        self
    }

    pub fn with_edge(mut self, from: &str, to: &str, edge_type: EdgeType) -> Self {
        self.edges.push(Edge::new(NodeId::from(from), NodeId::from(to), edge_type, "mock"));
        self
    }

    /// Seed a fresh driver with every accumulated node and edge, returning
    /// it alongside the graph name tests should query against.
    pub fn build(self) -> (InMemoryDriver, GraphName) {
        let driver = InMemoryDriver::new();
        for node in self.nodes {
            driver.upsert_node(&self.graph, node).expect("seed node");
        }
        for edge in self.edges {
            driver.upsert_edge(&self.graph, edge).expect("seed edge");
        }
        (driver, self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_seeds_every_node_and_edge_into_the_driver() {
        let (driver, graph) = GraphFixture::new("aws")
            .with_node("a", json!({"name": "alpha"}))
            .with_node("b", json!({"name": "beta"}))
            .with_edge("a", "b", EdgeType::Default)
            .build();
        assert_eq!(driver.all_nodes(&graph).unwrap().len(), 2);
        assert_eq!(driver.all_edges(&graph).unwrap().len(), 1);
    }

    #[test]
    fn node_fixture_carries_the_reported_section_through() {
        let n = node("a", json!({"name": "alpha"}));
        assert_eq!(n.id.as_str(), "a");
        assert_eq!(n.reported, json!({"name": "alpha"}));
    }
}
