use std::fmt;

use crate::data::node::NodeId;

/// Label distinguishing parallel relationships between the same pair of
/// nodes. `Default` is the acyclic backbone edge type that every node must
/// be reachable from `root` through.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    Default,
    Delete,
    Custom(String),
}

impl EdgeType {
    pub const ALL_KNOWN: &'static [&'static str] = &["default", "delete"];

    pub fn as_str(&self) -> &str {
        match self {
            EdgeType::Default => "default",
            EdgeType::Delete => "delete",
            EdgeType::Custom(s) => s,
        }
    }

    pub fn parse(s: &str) -> EdgeType {
        match s {
            "default" => EdgeType::Default,
            "delete" => EdgeType::Delete,
            other => EdgeType::Custom(other.to_owned()),
        }
    }
}

impl Default for EdgeType {
    fn default() -> Self {
        EdgeType::Default
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge, tagged with the merge that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub edge_type: EdgeType,
    pub update_id: String,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, edge_type: EdgeType, update_id: impl Into<String>) -> Self {
        Edge {
            from,
            to,
            edge_type,
            update_id: update_id.into(),
        }
    }
}

#[test]
fn edge_type_round_trips_through_display_and_parse() {
    for known in EdgeType::ALL_KNOWN {
        assert_eq!(EdgeType::parse(known).as_str(), *known);
    }
    assert_eq!(EdgeType::parse("aws_account").as_str(), "aws_account");
}
