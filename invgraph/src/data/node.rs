use serde_json::Value as Json;
use std::fmt;

/// Stable identifier of a node, unique within a single named graph.
///
/// Mirrors the validation style of `SubgraphDeploymentId`: a thin newtype
/// over `String` with a constructor that rejects malformed input rather
/// than a bare `type NodeId = String`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(s: impl Into<String>) -> Result<Self, ()> {
        let s = s.into();
        if s.is_empty() || s.len() > 1024 {
            return Err(());
        }
        Ok(NodeId(s))
    }

    /// The identifier of the synthetic root of every graph.
    pub fn root() -> Self {
        NodeId("root".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// One of the three JSON namespaces a node carries.
///
/// `section=reported|desired|metadata` in a query preamble selects one of
/// these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Reported,
    Desired,
    Metadata,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Reported => "reported",
            Section::Desired => "desired",
            Section::Metadata => "metadata",
        }
    }

    pub fn parse(s: &str) -> Option<Section> {
        match s {
            "reported" | "rep" | "r" => Some(Section::Reported),
            "desired" | "des" | "d" => Some(Section::Desired),
            "metadata" | "meta" | "m" => Some(Section::Metadata),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single vertex in the stored graph.
///
/// `reported` is the authoritative collector observation; `desired` and
/// `metadata` are operator/system overlays. `hash` is the content hash of
/// `reported` alone: an unchanged hash means no update is emitted for the
/// node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub hash: String,
    pub kinds: Vec<String>,
    pub reported: Json,
    #[serde(default = "empty_object", skip_serializing_if = "Json::is_null")]
    pub desired: Json,
    #[serde(default = "empty_object", skip_serializing_if = "Json::is_null")]
    pub metadata: Json,
    /// Flattened, lower-cased text used for the full-text search view.
    pub flat: String,
    /// ID of the subgraph merge that last touched this node.
    pub update_id: String,
}

fn empty_object() -> Json {
    Json::Object(Default::default())
}

impl Node {
    pub fn new(id: NodeId, reported: Json, update_id: impl Into<String>) -> Self {
        let hash = crate::util::content_hash(&reported);
        let flat = crate::util::flatten(&reported);
        let kinds = crate::util::kinds_of(&reported);
        Node {
            id,
            hash,
            kinds,
            reported,
            desired: empty_object(),
            metadata: empty_object(),
            flat,
            update_id: update_id.into(),
        }
    }

    pub fn section(&self, section: Section) -> &Json {
        match section {
            Section::Reported => &self.reported,
            Section::Desired => &self.desired,
            Section::Metadata => &self.metadata,
        }
    }

    pub fn section_mut(&mut self, section: Section) -> &mut Json {
        match section {
            Section::Reported => &mut self.reported,
            Section::Desired => &mut self.desired,
            Section::Metadata => &mut self.metadata,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == NodeId::root()
    }
}

#[test]
fn node_id_validation() {
    assert!(NodeId::new("a").is_ok());
    assert!(NodeId::new("").is_err());
    assert_eq!(NodeId::root().as_str(), "root");
}

#[test]
fn section_parsing_accepts_abbreviations() {
    assert_eq!(Section::parse("r"), Some(Section::Reported));
    assert_eq!(Section::parse("des"), Some(Section::Desired));
    assert_eq!(Section::parse("meta"), Some(Section::Metadata));
    assert_eq!(Section::parse("bogus"), None);
}
