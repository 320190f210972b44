//! Lowers a parsed `Query` into backend query text plus a bind-variable map,
//! grounded directly on `ArangoGraphDB.to_query` in
//! `original_source/keepercore/core/db/graphdb.py`: per-part pipelined
//! `LET stepN = (...)` scans, navigation lowered to a bounded graph walk,
//! predicates lowered with array-existential handling, and sequentially
//! numbered bind variables returned alongside the query text.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::model::{AggregateOp, CompareOp, Direction, Part, Query, Term};

/// What a concrete backend needs to know about a path to coerce a query
/// value correctly (e.g. whether `reported.tags` is an array). The merge
/// engine and storage driver supply a real implementation; translation
/// itself only needs this narrow seam.
pub trait PathModel {
    /// `true` when values stored at `path` are arrays, so that a scalar
    /// predicate against it must be lowered with an existential quantifier.
    fn is_array_path(&self, path: &str) -> bool {
        let _ = path;
        false
    }
}

/// A model that treats every path as scalar; suitable when no model
/// metadata is available (e.g. ad hoc `execute_query` in tests).
pub struct NoopModel;
impl PathModel for NoopModel {}

/// The compiled form of a `Query`: backend query text plus its bind
/// variables, numbered sequentially as `to_query` does (`str(len(bind_vars))`).
#[derive(Clone, Debug, PartialEq)]
pub struct BackendQuery {
    pub text: String,
    pub bind_vars: BTreeMap<String, Json>,
}

struct Translator<'a> {
    model: &'a dyn PathModel,
    bind_vars: BTreeMap<String, Json>,
}

impl<'a> Translator<'a> {
    fn new(model: &'a dyn PathModel) -> Self {
        Translator {
            model,
            bind_vars: BTreeMap::new(),
        }
    }

    fn bind(&mut self, value: Json) -> String {
        let name = format!("b{}", self.bind_vars.len());
        self.bind_vars.insert(name.clone(), value);
        name
    }

    fn term(&mut self, cursor: &str, term: &Term) -> String {
        match term {
            Term::All => "true".to_owned(),
            Term::ById(id) => {
                let bind = self.bind(Json::String(id.clone()));
                format!("{}.id == @{}", cursor, bind)
            }
            Term::IsKind(kind) => {
                let bind = self.bind(Json::String(kind.clone()));
                format!("@{} IN {}.kinds", bind, cursor)
            }
            Term::Predicate { path, op, value } => self.predicate(cursor, path, *op, value),
            Term::FunctionTerm { function, path, args } => self.function(cursor, function, path, args),
            Term::Combined { left, op, right } => {
                let left = self.term(cursor, left);
                let right = self.term(cursor, right);
                let op = match op {
                    crate::model::LogicOp::And => "AND",
                    crate::model::LogicOp::Or => "OR",
                };
                format!("({} {} {})", left, op, right)
            }
            Term::Not(inner) => format!("NOT ({})", self.term(cursor, inner)),
        }
    }

    fn predicate(&mut self, cursor: &str, path: &str, op: CompareOp, value: &Json) -> String {
        let bind = self.bind(value.clone());
        let field = format!("{}.{}", cursor, path);
        if self.model.is_array_path(path) {
            let quantifier = match op {
                CompareOp::NotEq | CompareOp::NotIn | CompareOp::NotRegex => "NONE",
                _ => "ANY",
            };
            format!("{} CURRENT {} @{} FOR CURRENT IN {}", quantifier, op.as_str(), bind, field)
        } else {
            format!("{} {} @{}", field, op.as_str(), bind)
        }
    }

    fn function(&mut self, cursor: &str, function: &str, path: &str, args: &[Json]) -> String {
        let field = format!("{}.{}", cursor, path);
        let bound: Vec<String> = args.iter().map(|a| format!("@{}", self.bind(a.clone()))).collect();
        format!("{}({}, {})", function, field, bound.join(", "))
    }

    fn navigation_clause(&mut self, step_var: &str, nav: &crate::model::Navigation) -> String {
        let edge = nav.edge_type.clone().unwrap_or_else(|| "default".to_owned());
        let direction = match nav.direction {
            Direction::Outbound => "OUTBOUND",
            Direction::Inbound => "INBOUND",
            Direction::Both => "ANY",
        };
        format!(
            "FOR v, e IN {}..{} {} {} GRAPH {:?}",
            nav.start, nav.until, direction, step_var, edge
        )
    }

    fn part(&mut self, index: usize, part: &Part, prior_step: Option<String>) -> String {
        let step_name = format!("step{}", index);
        let cursor = "r";
        let source = match &prior_step {
            Some(prior) => format!("FOR {} IN {}", cursor, prior),
            None => format!("FOR {} IN @@vertex_collection", cursor),
        };
        let filter = self.term(cursor, &part.term);
        let mut text = format!("LET {} = ({} FILTER {} RETURN {})", step_name, source, filter, cursor);
        if let Some(nav) = &part.navigation {
            let nav_clause = self.navigation_clause(&step_name, nav);
            text = format!("{}\nLET {}_nav = ({} RETURN v)", text, step_name, nav_clause);
        }
        text
    }

    fn aggregate(&mut self, agg: &crate::model::Aggregate, prior_step: &str) -> String {
        let group_vars: Vec<String> = agg
            .group_by
            .iter()
            .enumerate()
            .map(|(i, v)| format!("g{} = r.{}", i, v.path))
            .collect();
        let func_exprs: Vec<String> = agg
            .functions
            .iter()
            .map(|f| {
                let op = match f.op {
                    AggregateOp::Sum => "SUM",
                    AggregateOp::Count => "LENGTH",
                    AggregateOp::Min => "MIN",
                    AggregateOp::Max => "MAX",
                    AggregateOp::Avg => "AVERAGE",
                };
                match &f.path {
                    Some(path) => format!("{} = {}(r.{})", f.as_name.clone().unwrap_or_else(|| op.to_lowercase()), op, path),
                    None => format!("{} = {}(1)", f.as_name.clone().unwrap_or_else(|| op.to_lowercase()), op),
                }
            })
            .collect();
        format!(
            "FOR r IN {} COLLECT {} AGGREGATE {} RETURN MERGE(KEEP(CURRENT, {:?}), {{ {} }})",
            prior_step,
            group_vars.join(", "),
            func_exprs.join(", "),
            agg.group_by.iter().map(|v| v.path.clone()).collect::<Vec<_>>(),
            func_exprs.join(", "),
        )
    }
}

/// Translate a simplified `Query` into backend query text and its bind
/// variables.
pub fn translate(query: &Query, model: &dyn PathModel) -> BackendQuery {
    let mut translator = Translator::new(model);
    let mut lines = Vec::new();
    let mut prior_step: Option<String> = None;
    for (index, part) in query.parts.iter().enumerate() {
        lines.push(translator.part(index, part, prior_step.clone()));
        prior_step = Some(format!("step{}", index));
    }
    let final_step = prior_step.unwrap_or_else(|| "step0".to_owned());

    if let Some(agg) = &query.aggregate {
        lines.push(translator.aggregate(agg, &final_step));
    } else {
        let mut tail = format!("FOR r IN {}", final_step);
        if !query.sorts.is_empty() {
            let sorts: Vec<String> = query
                .sorts
                .iter()
                .map(|s| format!("r.{} {}", s.path, if s.ascending { "ASC" } else { "DESC" }))
                .collect();
            tail = format!("{} SORT {}", tail, sorts.join(", "));
        }
        if let Some(limit) = query.limit {
            tail = format!("{} LIMIT {}", tail, limit);
        }
        tail = format!("{} RETURN r", tail);
        lines.push(tail);
    }

    BackendQuery {
        text: lines.join("\n"),
        bind_vars: translator.bind_vars,
    }
}

#[test]
fn translate_simple_predicate_binds_one_variable() {
    let query = crate::parser::parse_query("reported.name == \"x\"").unwrap();
    let compiled = translate(&query, &NoopModel);
    assert_eq!(compiled.bind_vars.len(), 1);
    assert!(compiled.text.contains("step0"));
    assert!(compiled.text.contains("r.reported.name == @b0"));
}

#[test]
fn translate_aggregate_emits_collect_aggregate() {
    let query = crate::parser::parse_query("aggregate(reported.kind: sum(reported.cpu_count) as total): all").unwrap();
    let compiled = translate(&query, &NoopModel);
    assert!(compiled.text.contains("AGGREGATE"));
}

#[test]
fn translate_numbers_bind_variables_sequentially() {
    let query = crate::parser::parse_query("reported.a == 1 and reported.b == 2").unwrap();
    let compiled = translate(&query, &NoopModel);
    assert!(compiled.bind_vars.contains_key("b0"));
    assert!(compiled.bind_vars.contains_key("b1"));
}
