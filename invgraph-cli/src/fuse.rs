//! Query-part fusion: collapses a run of `QueryPart` commands at the front
//! of a pipeline into a single synthetic `execute_query` source, grounded on
//! `CLI.create_query`/`cli_source` in
//! `original_source/ckcore/core/cli/cli.py`.

use invgraph_query::{Aggregate, AggregateFunction, AggregateOp, Query};

use crate::grammar::ParsedCommand;

/// Names that participate in query-part fusion.
const QUERY_PART_NAMES: &[&str] = &[
    "reported",
    "desired",
    "metadata",
    "predecessors",
    "successors",
    "ancestors",
    "descendants",
    "aggregate",
    "merge_ancestors",
];

const MAX_DEPTH: u64 = u64::max_value();

pub fn is_query_part(name: &str) -> bool {
    QUERY_PART_NAMES.contains(&name)
}

/// `true` when `count`/`head`/`tail` should be folded into the fused query
/// instead of running as ordinary flows, because the command immediately
/// preceding them in `prior_is_query` was itself part of the fused run.
pub fn is_query_tail(name: &str, prior_is_query: bool) -> bool {
    prior_is_query && matches!(name, "count" | "head" | "tail")
}

/// Result of fusing a leading run of commands: the built query plus the
/// number of commands it consumed.
pub struct Fused {
    pub query: Query,
    pub consumed: usize,
}

fn section_of(name: &str) -> &'static str {
    match name {
        "desired" => "desired",
        "metadata" => "metadata",
        _ => "reported",
    }
}

/// Fuse as many leading commands of `commands` as form a contiguous
/// query-part run, returning `None` if the first command isn't one.
pub fn fuse(commands: &[ParsedCommand]) -> Result<Option<Fused>, crate::error::CliError> {
    if commands.is_empty() || !is_query_part(&commands[0].name) {
        return Ok(None);
    }
    let mut query = Query::all();
    let mut consumed = 0;
    let mut prior_is_query = false;
    for cmd in commands {
        if is_query_part(&cmd.name) {
            query = apply_query_part(query, cmd)?;
            prior_is_query = true;
        } else if is_query_tail(&cmd.name, prior_is_query) {
            query = apply_tail(query, cmd)?;
        } else {
            break;
        }
        consumed += 1;
    }
    Ok(Some(Fused { query, consumed }))
}

fn apply_query_part(query: Query, cmd: &ParsedCommand) -> Result<Query, crate::error::CliError> {
    match cmd.name.as_str() {
        "reported" | "desired" | "metadata" => {
            let term = invgraph_query::parser::parse_query(&cmd.arg)
                .map_err(|e| crate::error::CliError::wrap(&cmd.name, &cmd.arg, e.to_string()))?
                .parts
                .into_iter()
                .fold(invgraph_query::Term::All, |acc, part| acc.and(part.term));
            Ok(query.on_section(term, section_of(&cmd.name)))
        }
        "predecessors" => Ok(query.traverse_in(1)),
        "successors" => Ok(query.traverse_out(1)),
        "ancestors" => Ok(query.traverse_in(MAX_DEPTH)),
        "descendants" => Ok(query.traverse_out(MAX_DEPTH)),
        "merge_ancestors" => Ok(query.traverse_in(MAX_DEPTH)),
        "aggregate" => apply_aggregate(query, &cmd.arg),
        other => Err(crate::error::CliError::wrap(other, &cmd.arg, "not a query part")),
    }
}

fn apply_aggregate(mut query: Query, arg: &str) -> Result<Query, crate::error::CliError> {
    let mut group_by = Vec::new();
    let mut functions = Vec::new();
    for part in arg.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(rest) = part.strip_prefix("sum ") {
            functions.push(AggregateFunction {
                op: AggregateOp::Sum,
                path: Some(rest.trim().to_owned()),
                as_name: Some(rest.trim().to_owned()),
            });
        } else if let Some(rest) = part.strip_prefix("count ") {
            functions.push(AggregateFunction {
                op: AggregateOp::Count,
                path: Some(rest.trim().to_owned()),
                as_name: Some(rest.trim().to_owned()),
            });
        } else {
            group_by.push(invgraph_query::AggregateVariable {
                path: part.to_owned(),
                as_name: Some(part.to_owned()),
            });
        }
    }
    if functions.is_empty() {
        functions.push(AggregateFunction {
            op: AggregateOp::Count,
            path: None,
            as_name: Some("count".to_owned()),
        });
    }
    query.aggregate = Some(Aggregate { group_by, functions });
    Ok(query)
}

fn apply_tail(query: Query, cmd: &ParsedCommand) -> Result<Query, crate::error::CliError> {
    match cmd.name.as_str() {
        "count" => {
            let path = cmd.arg.trim();
            let group_by = if path.is_empty() {
                Vec::new()
            } else {
                vec![invgraph_query::AggregateVariable {
                    path: path.to_owned(),
                    as_name: Some(path.to_owned()),
                }]
            };
            let mut q = query;
            q.aggregate = Some(Aggregate {
                group_by,
                functions: vec![AggregateFunction {
                    op: AggregateOp::Count,
                    path: None,
                    as_name: Some("count".to_owned()),
                }],
            });
            Ok(q)
        }
        "head" => {
            let n: u64 = cmd.arg.trim().parse().unwrap_or(100);
            Ok(query.with_limit(n))
        }
        "tail" => {
            let n: u64 = cmd.arg.trim().parse().unwrap_or(100);
            let mut q = query;
            if q.sorts.is_empty() {
                q = q.add_sort("id", false);
            }
            Ok(q.with_limit(n))
        }
        other => Err(crate::error::CliError::wrap(other, &cmd.arg, "not a query tail command")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse_command_line;
    use invgraph_query::Direction;

    #[test]
    fn fuses_reported_predicate_with_trailing_head() {
        let line = parse_command_line("reported reported.name == \"x\" | head 5");
        let fused = fuse(&line.pipelines[0].commands).unwrap().unwrap();
        assert_eq!(fused.consumed, 2);
        assert_eq!(fused.query.limit, Some(5));
    }

    #[test]
    fn non_query_part_first_command_does_not_fuse() {
        let line = parse_command_line("echo hi | head 5");
        assert!(fuse(&line.pipelines[0].commands).unwrap().is_none());
    }

    #[test]
    fn predecessors_appends_inbound_traversal() {
        let line = parse_command_line("reported reported.name == \"x\" | predecessors");
        let fused = fuse(&line.pipelines[0].commands).unwrap().unwrap();
        assert_eq!(fused.consumed, 2);
        let navigating = &fused.query.parts[fused.query.parts.len() - 2];
        assert_eq!(navigating.navigation.as_ref().unwrap().direction, Direction::Inbound);
    }
}
