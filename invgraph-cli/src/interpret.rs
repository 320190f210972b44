//! Direct in-memory evaluator for a parsed `Query` against an
//! `InMemoryDriver`'s node/edge collections. The real backend target
//! (`invgraph_query::translate`) emits query text for an external storage
//! engine this workspace never ships; the command pipeline still needs to
//! *run* queries against the reference driver, so this module walks the
//! `Query` AST the way `original_source/keepercore/core/db/graphdb.py`'s
//! connection-less query fallback (`GraphDB.query_list` without an arango
//! connection) interprets it node by node.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as Json};

use invgraph::components::store::Store;
use invgraph::data::edge::EdgeType;
use invgraph::data::graph::GraphName;
use invgraph::data::node::{Node, NodeId, Section};
use invgraph_query::{Aggregate, AggregateOp, CompareOp, Direction, Navigation, Part, Query, Sort, Term};
use invgraph_store::driver::InMemoryDriver;

use crate::error::CliError;

fn path_value(node: &Node, path: &str) -> Option<Json> {
    if path == "id" {
        return Some(Json::String(node.id.to_string()));
    }
    if path == "kinds" {
        return Some(Json::Array(node.kinds.iter().map(|k| Json::String(k.clone())).collect()));
    }
    let mut segments = path.split('.');
    let head = segments.next()?;
    let mut current = match head {
        "reported" => node.section(Section::Reported),
        "desired" => node.section(Section::Desired),
        "metadata" => node.section(Section::Metadata),
        _ => node.section(Section::Reported),
    };
    let rest: Vec<&str> = if matches!(head, "reported" | "desired" | "metadata") {
        segments.collect()
    } else {
        std::iter::once(head).chain(segments).collect()
    };
    for segment in rest {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn compare(left: &Json, op: CompareOp, right: &Json) -> bool {
    match op {
        CompareOp::Eq => left == right,
        CompareOp::NotEq => left != right,
        CompareOp::Lt => numeric_cmp(left, right) == Some(std::cmp::Ordering::Less),
        CompareOp::Lte => matches!(numeric_cmp(left, right), Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)),
        CompareOp::Gt => numeric_cmp(left, right) == Some(std::cmp::Ordering::Greater),
        CompareOp::Gte => matches!(numeric_cmp(left, right), Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)),
        CompareOp::Regex | CompareOp::NotRegex => {
            let matched = left.as_str().map(|s| s.contains(right.as_str().unwrap_or(""))).unwrap_or(false);
            if op == CompareOp::Regex {
                matched
            } else {
                !matched
            }
        }
        CompareOp::In => right.as_array().map(|arr| arr.contains(left)).unwrap_or(false),
        CompareOp::NotIn => !right.as_array().map(|arr| arr.contains(left)).unwrap_or(false),
    }
}

fn numeric_cmp(left: &Json, right: &Json) -> Option<std::cmp::Ordering> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => left.as_str().zip(right.as_str()).and_then(|(a, b)| a.partial_cmp(b)),
    }
}

fn eval_term(term: &Term, node: &Node) -> bool {
    match term {
        Term::All => true,
        Term::IsKind(kind) => node.kinds.iter().any(|k| k == kind),
        Term::ById(id) => node.id.as_str() == id,
        Term::Predicate { path, op, value } => match path_value(node, path) {
            Some(found) => compare(&found, *op, value),
            None => false,
        },
        Term::FunctionTerm { function, path, args } => eval_function(function, path, args, node),
        Term::Combined { left, op, right } => match op {
            invgraph_query::LogicOp::And => eval_term(left, node) && eval_term(right, node),
            invgraph_query::LogicOp::Or => eval_term(left, node) || eval_term(right, node),
        },
        Term::Not(inner) => !eval_term(inner, node),
    }
}

fn eval_function(function: &str, path: &str, args: &[Json], node: &Node) -> bool {
    let value = match path_value(node, path) {
        Some(v) => v,
        None => return false,
    };
    match function {
        "has_key" => args.first().and_then(Json::as_str).map(|k| value.get(k).is_some()).unwrap_or(false),
        _ => false,
    }
}

fn traverse(driver: &InMemoryDriver, graph: &GraphName, start_ids: &HashSet<NodeId>, nav: &Navigation) -> Result<HashSet<NodeId>, CliError> {
    let edges = driver.all_edges(graph)?;
    let edge_type = nav.edge_type.as_deref().map(EdgeType::parse).unwrap_or(EdgeType::Default);
    let mut frontier = start_ids.clone();
    let mut reached: HashSet<NodeId> = HashSet::new();
    if nav.start == 0 {
        reached.extend(start_ids.iter().cloned());
    }
    for depth in 1..=nav.until {
        let mut next = HashSet::new();
        for edge in &edges {
            if edge.edge_type != edge_type {
                continue;
            }
            let (from, to) = (&edge.from, &edge.to);
            match nav.direction {
                Direction::Outbound => {
                    if frontier.contains(from) {
                        next.insert(to.clone());
                    }
                }
                Direction::Inbound => {
                    if frontier.contains(to) {
                        next.insert(from.clone());
                    }
                }
                Direction::Both => {
                    if frontier.contains(from) {
                        next.insert(to.clone());
                    }
                    if frontier.contains(to) {
                        next.insert(from.clone());
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        if depth >= nav.start {
            reached.extend(next.iter().cloned());
        }
        frontier = next;
    }
    Ok(reached)
}

fn apply_part(driver: &InMemoryDriver, graph: &GraphName, nodes: &[Node], part: &Part) -> Result<Vec<Node>, CliError> {
    let matched: Vec<Node> = nodes.iter().filter(|n| eval_term(&part.term, n)).cloned().collect();
    match &part.navigation {
        None => Ok(matched),
        Some(nav) => {
            let start_ids: HashSet<NodeId> = matched.iter().map(|n| n.id.clone()).collect();
            let next_ids = traverse(driver, graph, &start_ids, nav)?;
            let all = driver.all_nodes(graph)?;
            Ok(all.into_iter().filter(|n| next_ids.contains(&n.id)).collect())
        }
    }
}

fn node_record(node: &Node) -> Json {
    let mut map = Map::new();
    map.insert("id".to_owned(), Json::String(node.id.to_string()));
    map.insert("reported".to_owned(), node.reported.clone());
    map.insert("desired".to_owned(), node.desired.clone());
    map.insert("metadata".to_owned(), node.metadata.clone());
    map.insert("kinds".to_owned(), Json::Array(node.kinds.iter().map(|k| Json::String(k.clone())).collect()));
    Json::Object(map)
}

fn group_key(node: &Node, aggregate: &Aggregate) -> Vec<Json> {
    aggregate
        .group_by
        .iter()
        .map(|v| path_value(node, &v.path).unwrap_or(Json::Null))
        .collect()
}

fn apply_aggregate(nodes: &[Node], aggregate: &Aggregate) -> Vec<Json> {
    let mut groups: HashMap<Vec<String>, (Vec<Json>, Vec<&Node>)> = HashMap::new();
    for node in nodes {
        let key = group_key(node, aggregate);
        let key_str: Vec<String> = key.iter().map(|v| v.to_string()).collect();
        groups.entry(key_str).or_insert_with(|| (key.clone(), Vec::new())).1.push(node);
    }
    if groups.is_empty() && aggregate.group_by.is_empty() {
        groups.insert(Vec::new(), (Vec::new(), nodes.iter().collect()));
    }
    let mut rows: Vec<Json> = groups
        .into_values()
        .map(|(keys, members)| {
            let mut row = Map::new();
            for (variable, value) in aggregate.group_by.iter().zip(keys.iter()) {
                let name = variable.as_name.clone().unwrap_or_else(|| variable.path.clone());
                row.insert(name, value.clone());
            }
            for func in &aggregate.functions {
                let name = func.as_name.clone().unwrap_or_else(|| func.op.to_string());
                let value = match func.op {
                    AggregateOp::Count => Json::from(members.len() as u64),
                    AggregateOp::Sum | AggregateOp::Min | AggregateOp::Max | AggregateOp::Avg => {
                        let numbers: Vec<f64> = members
                            .iter()
                            .filter_map(|n| func.path.as_deref().and_then(|p| path_value(n, p)).and_then(|v| v.as_f64()))
                            .collect();
                        match func.op {
                            AggregateOp::Sum => Json::from(numbers.iter().sum::<f64>()),
                            AggregateOp::Min => numbers.iter().cloned().fold(None, |a: Option<f64>, b| Some(a.map_or(b, |a| a.min(b)))).map(Json::from).unwrap_or(Json::Null),
                            AggregateOp::Max => numbers.iter().cloned().fold(None, |a: Option<f64>, b| Some(a.map_or(b, |a| a.max(b)))).map(Json::from).unwrap_or(Json::Null),
                            AggregateOp::Avg => {
                                if numbers.is_empty() {
                                    Json::Null
                                } else {
                                    Json::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
                                }
                            }
                            AggregateOp::Count => unreachable!(),
                        }
                    }
                };
                row.insert(name, value);
            }
            Json::Object(row)
        })
        .collect();
    rows.sort_by_key(|r| r.to_string());
    rows
}

fn sort_nodes(mut nodes: Vec<Node>, sorts: &[Sort]) -> Vec<Node> {
    nodes.sort_by(|a, b| {
        for sort in sorts {
            let av = path_value(a, &sort.path);
            let bv = path_value(b, &sort.path);
            let ord = match (&av, &bv) {
                (Some(av), Some(bv)) => numeric_cmp(av, bv).unwrap_or(std::cmp::Ordering::Equal),
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (None, None) => std::cmp::Ordering::Equal,
            };
            let ord = if sort.ascending { ord } else { ord.reverse() };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    nodes
}

/// Execute `query` against `graph`'s current contents, returning one JSON
/// record per result (a node record, or an aggregation row when the query
/// carries an `aggregate(...)` clause).
pub fn execute(driver: &InMemoryDriver, graph: &GraphName, query: &Query) -> Result<Vec<Json>, CliError> {
    let mut current = driver.all_nodes(graph)?;
    for part in &query.parts {
        current = apply_part(driver, graph, &current, part)?;
    }
    let mut current = sort_nodes(current, &query.sorts);
    if let Some(limit) = query.limit {
        current.truncate(limit as usize);
    }
    if let Some(aggregate) = &query.aggregate {
        return Ok(apply_aggregate(&current, aggregate));
    }
    Ok(current.iter().map(node_record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_with_two_nodes() -> (InMemoryDriver, GraphName) {
        invgraph_mock::GraphFixture::new("aws")
            .with_node("a", json!({"name": "alpha", "size": 3}))
            .with_node("b", json!({"name": "beta", "size": 7}))
            .build()
    }

    #[test]
    fn predicate_filters_by_reported_field() {
        let (driver, graph) = graph_with_two_nodes();
        let query = Query::all().on_section(
            Term::Predicate {
                path: "reported.name".into(),
                op: CompareOp::Eq,
                value: json!("alpha"),
            },
            "reported",
        );
        let rows = execute(&driver, &graph, &query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("a"));
    }

    #[test]
    fn aggregate_counts_matching_nodes() {
        let (driver, graph) = graph_with_two_nodes();
        let mut query = Query::all();
        query.aggregate = Some(Aggregate {
            group_by: Vec::new(),
            functions: vec![invgraph_query::AggregateFunction {
                op: AggregateOp::Count,
                path: None,
                as_name: Some("count".into()),
            }],
        });
        let rows = execute(&driver, &graph, &query).unwrap();
        assert_eq!(rows[0]["count"], json!(2));
    }

    #[test]
    fn sort_and_limit_are_applied_in_order() {
        let (driver, graph) = graph_with_two_nodes();
        let query = Query::all().add_sort("reported.size", false).with_limit(1);
        let rows = execute(&driver, &graph, &query).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("b"));
    }
}
