use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Content hash over a node's `reported` section. Equal hash means equal
/// content; the merge engine uses this instead of deep-comparing JSON on
/// every diff.
pub fn content_hash(value: &Json) -> String {
    // Canonicalize by round-tripping through a BTreeMap-backed value so that
    // key order never affects the hash.
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.input(&bytes);
    hex::encode(hasher.result())
}

fn canonicalize(value: &Json) -> Json {
    match value {
        Json::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Json> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Json::Object(out)
        }
        Json::Array(items) => Json::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Flatten all string-ish leaf values into a single lower-cased, whitespace
/// separated token stream, used to populate `Node::flat` for the optional
/// full-text search view. Tokenizer/ranking is left to the backend; only
/// this flattening step is fixed here.
pub fn flatten(value: &Json) -> String {
    let mut out = String::new();
    flatten_into(value, &mut out);
    out.to_lowercase()
}

fn flatten_into(value: &Json, out: &mut String) {
    match value {
        Json::String(s) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(s);
        }
        Json::Number(n) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&n.to_string());
        }
        Json::Bool(b) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(if *b { "true" } else { "false" });
        }
        Json::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        Json::Object(map) => {
            for v in map.values() {
                flatten_into(v, out);
            }
        }
        Json::Null => {}
    }
}

/// Derive the type-hierarchy `kinds` list for a reported document. The
/// reference backend only knows the single `kind` the collector reported,
/// plus `graph_root` for the synthetic root; a richer model layer (mapping
/// a `kind` to its ancestor kinds) is a storage-driver concern, not this
/// crate's.
pub fn kinds_of(reported: &Json) -> Vec<String> {
    reported
        .get("kind")
        .and_then(Json::as_str)
        .map(|k| vec![k.to_owned()])
        .unwrap_or_default()
}

#[test]
fn content_hash_is_stable_under_key_reordering() {
    let a = serde_json::json!({"name": "A", "kind": "x"});
    let b = serde_json::json!({"kind": "x", "name": "A"});
    assert_eq!(content_hash(&a), content_hash(&b));
}

#[test]
fn content_hash_differs_on_value_change() {
    let a = serde_json::json!({"name": "A"});
    let b = serde_json::json!({"name": "B"});
    assert_ne!(content_hash(&a), content_hash(&b));
}

#[test]
fn flatten_collects_leaf_strings_and_numbers() {
    let v = serde_json::json!({"name": "Instance-1", "tags": ["prod", "web"], "port": 443});
    let flat = flatten(&v);
    assert!(flat.contains("instance-1"));
    assert!(flat.contains("prod"));
    assert!(flat.contains("443"));
}
