//! Recursive-descent parser for the query grammar, structured after
//! `original_source/ckcore/core/query/query_parser.py`: the same production
//! names, rebuilt against `invgraph_parse`'s native combinators instead of
//! `parsy`.

use invgraph_parse::lexeme::{identifier, json_value, keyword, punct, quoted_string};
use invgraph_parse::{literal, ParseError, Parser};

use crate::model::{
    Aggregate, AggregateFunction, AggregateOp, AggregateVariable, CompareOp, Direction, Navigation, Part, Query,
    Sort, Term, WithClause, WithFilter,
};

fn compare_op() -> Parser<CompareOp> {
    let ops = ["not in", "==", "!=", "<=", ">=", "!~", "=", "<", ">", "~", "in"];
    let mut parser: Option<Parser<CompareOp>> = None;
    for op in ops.iter() {
        let this = punct(op).map(move |_| CompareOp::parse(op).expect("known operator"));
        parser = Some(match parser {
            Some(p) => p.or(this),
            None => this,
        });
    }
    parser.expect("at least one operator")
}

/// `predicate := path op json_value`
fn predicate_term() -> Parser<Term> {
    identifier()
        .then(compare_op())
        .then(json_value())
        .map(|((path, op), value)| Term::Predicate { path, op, value })
}

/// `is(kind)`
fn is_term() -> Parser<Term> {
    keyword("is")
        .skip(punct("("))
        .then(identifier())
        .skip(punct(")"))
        .map(|(_, kind)| Term::IsKind(kind))
}

/// `id(literal)`
fn id_term() -> Parser<Term> {
    keyword("id")
        .skip(punct("("))
        .then(quoted_string().or(identifier()))
        .skip(punct(")"))
        .map(|(_, id)| Term::ById(id))
}

fn all_term() -> Parser<Term> {
    keyword("all").map(|_| Term::All)
}

/// `function_term := name '(' path (',' arg)* ')'`
fn function_term() -> Parser<Term> {
    identifier()
        .skip(punct("("))
        .then(identifier())
        .then(punct(",").skip_first_keep(json_value()).many0())
        .skip(punct(")"))
        .map(|((function, path), args)| Term::FunctionTerm { function, path, args })
}

/// `simple := '(' term ')' | predicate | is(kind) | id(literal) | all | function`
fn simple_term() -> Parser<Term> {
    Parser::new(|input, offset| {
        let parenthesized = punct("(")
            .skip_first_keep(combined_term())
            .skip(punct(")"));
        parenthesized
            .or(is_term())
            .or(id_term())
            .or(all_term())
            .or(function_term())
            .or(predicate_term())
            .parse(input)
            .map_err(|e| ParseError::new(offset + e.offset, e.message))
    })
}

/// `term := simple ( (' and ' | ' or ') simple )*`
fn combined_term() -> Parser<Term> {
    let and_or = keyword("and").map(|_| crate::model::LogicOp::And).or(keyword("or").map(|_| crate::model::LogicOp::Or));
    simple_term()
        .then(and_or.then(simple_term()).many0())
        .map(|(first, rest)| {
            rest.into_iter().fold(first, |acc, (op, next)| match op {
                crate::model::LogicOp::And => acc.and(next),
                crate::model::LogicOp::Or => acc.or(next),
            })
        })
}

fn direction_and_arrow() -> Parser<Direction> {
    literal("<-").map(|_| Direction::Inbound).or(literal("-").map(|_| Direction::Outbound))
}

/// `range := '[' int (':' | ',' | '..') int? ']'`
fn range_parser() -> Parser<(u64, u64)> {
    punct("[")
        .skip_first_keep(uint())
        .then(
            (punct(":").or(punct(",")).or(punct("..")))
                .skip_first_keep(uint().optional())
                .optional(),
        )
        .skip(punct("]"))
        .map(|(start, rest)| match rest {
            Some(Some(until)) => (start, until),
            Some(None) => (start, u64::MAX),
            None => (start, start),
        })
}

fn uint() -> Parser<u64> {
    invgraph_parse::lexeme::identifier().and_then(|s| {
        let value = s.parse::<u64>();
        Parser::new(move |input, offset| match value {
            Ok(n) => Ok((n, input)),
            Err(_) => Err(ParseError::new(offset, "expected an integer")),
        })
    })
}

/// `navigation := '-' [range] edge_type? '->' | '<-' [range] edge_type? '-' | '<-' [range] edge_type? '->'`
fn navigation_parser() -> Parser<Navigation> {
    Parser::new(|input, offset| {
        let p = direction_and_arrow()
            .then(range_parser().optional())
            .then(identifier().optional())
            .then(literal("->").map(|_| true).or(literal("-").map(|_| false)))
            .map(|(((dir, range), edge_type), outbound_close)| {
                let direction = match (dir, outbound_close) {
                    (Direction::Inbound, true) => Direction::Both,
                    (Direction::Inbound, false) => Direction::Inbound,
                    (Direction::Outbound, _) => Direction::Outbound,
                    _ => Direction::Outbound,
                };
                let (start, until) = range.unwrap_or((1, 1));
                Navigation {
                    start,
                    until,
                    edge_type,
                    direction,
                }
            });
        p.parse(input).map_err(|e| ParseError::new(offset + e.offset, e.message))
    })
}

fn with_filter() -> Parser<WithFilter> {
    keyword("empty")
        .map(|_| WithFilter::Empty)
        .or(keyword("any").map(|_| WithFilter::Any))
        .or(keyword("count")
            .skip_first_keep(compare_op())
            .then(uint())
            .map(|(op, n)| WithFilter::Count(op, n)))
}

/// `with_clause := 'with' '(' (empty|any|count op int) ',' navigation term? with_clause? ')'`
fn with_clause_parser() -> Parser<WithClause> {
    Parser::new(|input, offset| {
        let p = keyword("with")
            .skip(punct("("))
            .skip_first_keep(with_filter())
            .then(punct(",").skip_first_keep(navigation_parser()))
            .then(combined_term().optional())
            .then(with_clause_parser_boxed().optional())
            .skip(punct(")"))
            .map(|(((filter, navigation), term), inner)| WithClause {
                filter,
                navigation,
                term,
                inner: inner.map(Box::new),
            });
        p.parse(input).map_err(|e| ParseError::new(offset + e.offset, e.message))
    })
}

fn with_clause_parser_boxed() -> Parser<WithClause> {
    with_clause_parser()
}

/// `part := term with_clause? tag? navigation?`
fn part_parser() -> Parser<Part> {
    combined_term()
        .then(with_clause_parser().optional())
        .then(keyword("as").skip_first_keep(identifier()).optional())
        .then(navigation_parser().optional())
        .map(|(((term, with_clause), tag), navigation)| Part {
            term,
            tag,
            with_clause,
            navigation,
        })
}

fn aggregate_variable() -> Parser<AggregateVariable> {
    identifier()
        .then(keyword("as").skip_first_keep(identifier()).optional())
        .map(|(path, as_name)| AggregateVariable { path, as_name })
}

fn aggregate_op() -> Parser<AggregateOp> {
    keyword("sum")
        .map(|_| AggregateOp::Sum)
        .or(keyword("count").map(|_| AggregateOp::Count))
        .or(keyword("min").map(|_| AggregateOp::Min))
        .or(keyword("max").map(|_| AggregateOp::Max))
        .or(keyword("avg").map(|_| AggregateOp::Avg))
}

fn aggregate_function() -> Parser<AggregateFunction> {
    aggregate_op()
        .then(punct("(").skip_first_keep(identifier().optional()).skip(punct(")")))
        .then(keyword("as").skip_first_keep(identifier()).optional())
        .map(|((op, path), as_name)| AggregateFunction { op, path, as_name })
}

/// `aggregate := 'aggregate' '(' group_vars? func (',' func)* ')'`
fn aggregate_parser() -> Parser<Aggregate> {
    keyword("aggregate")
        .skip(punct("("))
        .skip_first_keep(aggregate_variable().sep_by(punct(",")))
        .then(punct(":").skip_first_keep(aggregate_function().sep_by(punct(","))).optional())
        .skip(punct(")"))
        .map(|(group_by, functions)| Aggregate {
            group_by,
            functions: functions.unwrap_or_default(),
        })
}

fn sort_parser() -> Parser<Vec<Sort>> {
    keyword("sort").skip_first_keep(
        identifier()
            .then(keyword("asc").map(|_| true).or(keyword("desc").map(|_| false)).optional())
            .map(|(path, dir)| Sort {
                path,
                ascending: dir.unwrap_or(true),
            })
            .sep_by(punct(",")),
    )
}

fn limit_parser() -> Parser<u64> {
    keyword("limit").skip_first_keep(uint())
}

/// `preamble := (aggregate)? ('(' key '=' literal (',' key '=' literal)* ')')? section? ':'`
fn preamble_parser() -> Parser<(Option<Aggregate>, Option<String>)> {
    aggregate_parser()
        .optional()
        .then(identifier().optional())
        .skip(punct(":"))
}

/// `query := preamble? part ( (' '+ part) )* sort? limit?`
pub fn query_parser() -> Parser<Query> {
    preamble_parser()
        .optional()
        .then(part_parser().many1())
        .then(sort_parser().optional())
        .then(limit_parser().optional())
        .map(|(((preamble, parts), sorts), limit)| {
            let (aggregate, section) = preamble.unwrap_or((None, None));
            let mut parts = parts;
            if let Some(section) = &section {
                for part in &mut parts {
                    part.term = std::mem::replace(&mut part.term, Term::All).prefix_paths(section);
                }
            }
            Query {
                parts,
                preamble_section: section,
                aggregate,
                sorts: sorts.unwrap_or_default(),
                limit,
            }
        })
}

/// Parse an entire query string, requiring the whole input to be consumed.
pub fn parse_query(input: &str) -> Result<Query, ParseError> {
    query_parser().parse_all(input)
}

#[test]
fn parses_simple_predicate() {
    let q = parse_query("reported.name == \"foo\"").unwrap();
    assert_eq!(q.parts.len(), 1);
    match &q.parts[0].term {
        Term::Predicate { path, op, .. } => {
            assert_eq!(path, "reported.name");
            assert_eq!(*op, CompareOp::Eq);
        }
        other => panic!("unexpected term: {:?}", other),
    }
}

#[test]
fn parses_is_and_combined_and() {
    let q = parse_query("is(instance) and reported.cpu_count > 2").unwrap();
    match &q.parts[0].term {
        Term::Combined { op, .. } => assert_eq!(*op, crate::model::LogicOp::And),
        other => panic!("expected combined term, got {:?}", other),
    }
}

#[test]
fn parses_limit_and_sort() {
    let q = parse_query("all sort reported.name asc limit 10").unwrap();
    assert_eq!(q.limit, Some(10));
    assert_eq!(q.sorts.len(), 1);
}
