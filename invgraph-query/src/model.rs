//! Query abstract syntax, grounded on the node types `original_source`'s
//! `core/query/model.py` defines, following the habit of implementing
//! `Display` next to every type it documents
//! (`graph/src/components/store.rs::StoreEvent`).

use std::fmt;

use serde_json::Value as Json;

/// Comparison operator of a `Predicate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
    NotRegex,
    In,
    NotIn,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Regex => "~",
            CompareOp::NotRegex => "!~",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }

    pub fn parse(s: &str) -> Option<CompareOp> {
        match s {
            "=" | "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::NotEq),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Lte),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Gte),
            "~" => Some(CompareOp::Regex),
            "!~" => Some(CompareOp::NotRegex),
            "in" => Some(CompareOp::In),
            "not in" => Some(CompareOp::NotIn),
            _ => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical combinator joining two `Term`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

impl fmt::Display for LogicOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            LogicOp::And => "and",
            LogicOp::Or => "or",
        })
    }
}

/// Direction a `Navigation` travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
    Both,
}

/// A bounded traversal step: `-[start:until]edge_type->` and its relatives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    pub start: u64,
    pub until: u64,
    pub edge_type: Option<String>,
    pub direction: Direction,
}

impl Default for Navigation {
    fn default() -> Self {
        Navigation {
            start: 1,
            until: 1,
            edge_type: None,
            direction: Direction::Outbound,
        }
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let edge = self.edge_type.as_deref().unwrap_or("default");
        let range = if self.start == self.until {
            format!("[{}]", self.start)
        } else {
            format!("[{}:{}]", self.start, self.until)
        };
        match self.direction {
            Direction::Outbound => write!(f, "-{}{}->", range, edge),
            Direction::Inbound => write!(f, "<-{}{}-", range, edge),
            Direction::Both => write!(f, "<-{}{}->", range, edge),
        }
    }
}

/// One of the atomic (non-combined) term kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Predicate {
        path: String,
        op: CompareOp,
        value: Json,
    },
    IsKind(String),
    ById(String),
    All,
    FunctionTerm {
        function: String,
        path: String,
        args: Vec<Json>,
    },
    Combined {
        left: Box<Term>,
        op: LogicOp,
        right: Box<Term>,
    },
    Not(Box<Term>),
}

impl Term {
    pub fn and(self, other: Term) -> Term {
        match (&self, &other) {
            (Term::All, _) => other,
            (_, Term::All) => self,
            _ => Term::Combined {
                left: Box::new(self),
                op: LogicOp::And,
                right: Box::new(other),
            },
        }
    }

    pub fn or(self, other: Term) -> Term {
        match (&self, &other) {
            (Term::All, _) | (_, Term::All) => Term::All,
            _ => Term::Combined {
                left: Box::new(self),
                op: LogicOp::Or,
                right: Box::new(other),
            },
        }
    }

    /// Fold nested `and`/`or` with identity elements and collapse
    /// double negation, per the simplification contract.
    pub fn simplify(self) -> Term {
        match self {
            Term::Combined { left, op, right } => {
                let left = left.simplify();
                let right = right.simplify();
                match op {
                    LogicOp::And => left.and(right),
                    LogicOp::Or => left.or(right),
                }
            }
            Term::Not(inner) => match inner.simplify() {
                Term::Not(doubly) => *doubly,
                other => Term::Not(Box::new(other)),
            },
            other => other,
        }
    }

    /// Prefix every unqualified path with `section`, used when a query is
    /// parsed in a `section=reported|desired|metadata` preamble context.
    pub fn prefix_paths(self, section: &str) -> Term {
        let prefix = |path: String| {
            if path.starts_with(section) || path == "id" || path == "kinds" {
                path
            } else {
                format!("{}.{}", section, path)
            }
        };
        match self {
            Term::Predicate { path, op, value } => Term::Predicate {
                path: prefix(path),
                op,
                value,
            },
            Term::FunctionTerm { function, path, args } => Term::FunctionTerm {
                function,
                path: prefix(path),
                args,
            },
            Term::Combined { left, op, right } => Term::Combined {
                left: Box::new(left.prefix_paths(section)),
                op,
                right: Box::new(right.prefix_paths(section)),
            },
            Term::Not(inner) => Term::Not(Box::new(inner.prefix_paths(section))),
            other => other,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Predicate { path, op, value } => write!(f, "{} {} {}", path, op, value),
            Term::IsKind(k) => write!(f, "is({})", k),
            Term::ById(id) => write!(f, "id({})", id),
            Term::All => write!(f, "all"),
            Term::FunctionTerm { function, path, args } => {
                write!(f, "{}({}", function, path)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
            Term::Combined { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Term::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

/// `with(...)` clause attached to a navigating part: filters the navigated
/// set by how many of its neighbors satisfy an inner term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WithFilter {
    Empty,
    Any,
    Count(CompareOp, u64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithClause {
    pub filter: WithFilter,
    pub navigation: Navigation,
    pub term: Option<Term>,
    pub inner: Option<Box<WithClause>>,
}

impl fmt::Display for WithClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let filter = match &self.filter {
            WithFilter::Empty => "empty".to_owned(),
            WithFilter::Any => "any".to_owned(),
            WithFilter::Count(op, n) => format!("count{}{}", op, n),
        };
        write!(f, "with({}, {}", filter, self.navigation)?;
        if let Some(term) = &self.term {
            write!(f, " {}", term)?;
        }
        if let Some(inner) = &self.inner {
            write!(f, " {}", inner)?;
        }
        write!(f, ")")
    }
}

/// One segment of a pipelined query: a term, optional tag, optional
/// `with(...)` clause, and optional trailing navigation into the next part.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub term: Term,
    pub tag: Option<String>,
    pub with_clause: Option<WithClause>,
    pub navigation: Option<Navigation>,
}

impl Part {
    pub fn new(term: Term) -> Self {
        Part {
            term,
            tag: None,
            with_clause: None,
            navigation: None,
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.term)?;
        if let Some(with_clause) = &self.with_clause {
            write!(f, " {}", with_clause)?;
        }
        if let Some(tag) = &self.tag {
            write!(f, " as {}", tag)?;
        }
        if let Some(nav) = &self.navigation {
            write!(f, " {}", nav)?;
        }
        Ok(())
    }
}

/// A single group-by variable or aggregation function in an `aggregate(...)`
/// preamble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateVariable {
    pub path: String,
    pub as_name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOp {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Avg => "avg",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateFunction {
    pub op: AggregateOp,
    pub path: Option<String>,
    pub as_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub group_by: Vec<AggregateVariable>,
    pub functions: Vec<AggregateFunction>,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "aggregate(")?;
        let group: Vec<String> = self
            .group_by
            .iter()
            .map(|v| match &v.as_name {
                Some(name) => format!("{} as {}", v.path, name),
                None => v.path.clone(),
            })
            .collect();
        write!(f, "{}", group.join(", "))?;
        if !self.group_by.is_empty() && !self.functions.is_empty() {
            write!(f, ": ")?;
        }
        let funcs: Vec<String> = self
            .functions
            .iter()
            .map(|func| {
                let body = match &func.path {
                    Some(path) => format!("{}({})", func.op, path),
                    None => format!("{}()", func.op),
                };
                match &func.as_name {
                    Some(name) => format!("{} as {}", body, name),
                    None => body,
                }
            })
            .collect();
        write!(f, "{})", funcs.join(", "))
    }
}

/// Sort order of a sorted result set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub path: String,
    pub ascending: bool,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.path, if self.ascending { "asc" } else { "desc" })
    }
}

/// The fully parsed query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub parts: Vec<Part>,
    pub preamble_section: Option<String>,
    pub aggregate: Option<Aggregate>,
    pub sorts: Vec<Sort>,
    pub limit: Option<u64>,
}

impl Query {
    pub fn all() -> Self {
        Query {
            parts: vec![Part::new(Term::All)],
            preamble_section: None,
            aggregate: None,
            sorts: Vec::new(),
            limit: None,
        }
    }

    /// Combine this query's last part's term with `term` on the given
    /// section, the way `CLI.create_query` folds successive query-part
    /// commands into one accumulating `Query`.
    pub fn on_section(mut self, term: Term, section: &str) -> Self {
        let prefixed = term.prefix_paths(section);
        self.preamble_section = Some(section.to_owned());
        if let Some(last) = self.parts.last_mut() {
            last.term = std::mem::replace(&mut last.term, Term::All).and(prefixed);
        } else {
            self.parts.push(Part::new(prefixed));
        }
        self
    }

    pub fn combine(mut self, other: Query) -> Self {
        self.parts.extend(other.parts);
        if self.aggregate.is_none() {
            self.aggregate = other.aggregate;
        }
        self.sorts.extend(other.sorts);
        if self.limit.is_none() {
            self.limit = other.limit;
        }
        self
    }

    pub fn traverse_out(mut self, depth: u64) -> Self {
        if let Some(last) = self.parts.last_mut() {
            last.navigation = Some(Navigation {
                start: 1,
                until: depth,
                edge_type: None,
                direction: Direction::Outbound,
            });
        }
        self.parts.push(Part::new(Term::All));
        self
    }

    pub fn traverse_in(mut self, depth: u64) -> Self {
        if let Some(last) = self.parts.last_mut() {
            last.navigation = Some(Navigation {
                start: 1,
                until: depth,
                edge_type: None,
                direction: Direction::Inbound,
            });
        }
        self.parts.push(Part::new(Term::All));
        self
    }

    pub fn add_sort(mut self, path: impl Into<String>, ascending: bool) -> Self {
        let path = path.into();
        self.sorts.retain(|s| s.path != path);
        self.sorts.push(Sort { path, ascending });
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fold identity terms, dedup sorts (last write wins, already enforced
    /// by `add_sort`), per the simplification contract.
    pub fn simplify(mut self) -> Self {
        for part in &mut self.parts {
            part.term = std::mem::replace(&mut part.term, Term::All).simplify();
        }
        let mut seen = std::collections::HashSet::new();
        self.sorts.retain(|s| seen.insert(s.path.clone()));
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(agg) = &self.aggregate {
            write!(f, "{} ", agg)?;
        }
        if let Some(section) = &self.preamble_section {
            write!(f, "({}):", section)?;
        }
        let parts: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", parts.join(" "))?;
        if !self.sorts.is_empty() {
            let sorts: Vec<String> = self.sorts.iter().map(|s| s.to_string()).collect();
            write!(f, " sort {}", sorts.join(", "))?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }
        Ok(())
    }
}

#[test]
fn term_and_with_all_collapses_to_other_operand() {
    let t = Term::All.and(Term::IsKind("instance".into()));
    assert_eq!(t, Term::IsKind("instance".into()));
}

#[test]
fn term_or_with_all_collapses_to_all() {
    let t = Term::All.or(Term::IsKind("instance".into()));
    assert_eq!(t, Term::All);
}

#[test]
fn query_simplify_dedups_sorts_keeping_last() {
    let q = Query::all().add_sort("name", true).add_sort("name", false);
    let q = q.simplify();
    assert_eq!(q.sorts.len(), 1);
    assert!(!q.sorts[0].ascending);
}

#[test]
fn query_display_round_trips_simple_predicate() {
    let q = Query {
        parts: vec![Part::new(Term::Predicate {
            path: "reported.name".into(),
            op: CompareOp::Eq,
            value: Json::String("x".into()),
        })],
        preamble_section: None,
        aggregate: None,
        sorts: vec![],
        limit: None,
    };
    assert_eq!(q.to_string(), "reported.name == \"x\"");
}
