use std::fmt;

/// Name of a persistent graph: a named set of nodes and edges.
///
/// Graph names double as the storage driver's collection-name prefix, the
/// way `ArangoGraphDB.vertex_name`/`edge_collection` derive the backend
/// collection names from `self.name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphName(String);

impl GraphName {
    pub fn new(s: impl Into<String>) -> Result<Self, ()> {
        let s = s.into();
        if s.is_empty() || s.len() > 255 {
            return Err(());
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(());
        }
        Ok(GraphName(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[test]
fn graph_name_rejects_bad_characters() {
    assert!(GraphName::new("aws").is_ok());
    assert!(GraphName::new("aws_prod-1").is_ok());
    assert!(GraphName::new("has space").is_err());
    assert!(GraphName::new("").is_err());
}
