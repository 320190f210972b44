//! Error kinds for the command pipeline. Every pipeline failure is wrapped
//! with the command name and argument before it reaches the caller.

use invgraph::components::store::StoreError;
use invgraph_parse::ParseError as LexError;

#[derive(Debug, Fail)]
pub enum CliError {
    #[fail(display = "parse error in {:?}: {}", _0, _1)]
    Parse(String, LexError),
    #[fail(display = "model error: {}", _0)]
    Model(String),
    #[fail(display = "not found: {}", _0)]
    NotFound(String),
    #[fail(display = "a conflicting change to {} nodes is already in progress", _0)]
    ConflictingChangeInProgress(usize),
    #[fail(display = "invalid batch update: {}", _0)]
    InvalidBatchUpdate(String),
    #[fail(display = "database error: {}", _0)]
    Database(String),
    #[fail(display = "missing required uploads: {:?}", _0)]
    Requirement(Vec<String>),
    #[fail(display = "deadline elapsed")]
    Timeout,
    #[fail(display = "{} {}: {}", _0, _1, _2)]
    Command(String, String, String),
}

impl CliError {
    pub fn http_status(&self) -> u16 {
        match self {
            CliError::Parse(..) => 400,
            CliError::Model(_) => 400,
            CliError::NotFound(_) => 404,
            CliError::ConflictingChangeInProgress(_) => 409,
            CliError::InvalidBatchUpdate(_) => 409,
            CliError::Database(_) => 500,
            CliError::Requirement(_) => 424,
            CliError::Timeout => 504,
            CliError::Command(..) => 400,
        }
    }

    /// Wrap an error with the command name and argument that produced it,
    /// per the propagation rule.
    pub fn wrap(command: &str, arg: &str, message: impl Into<String>) -> CliError {
        CliError::Command(command.to_owned(), arg.to_owned(), message.into())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownGraph(g) => CliError::NotFound(format!("graph {}", g)),
            StoreError::UnknownNode(n) => CliError::NotFound(format!("node {}", n)),
            StoreError::ConflictingChangeInProgress(n) => CliError::ConflictingChangeInProgress(n),
            StoreError::InvalidBatchUpdate(m) => CliError::InvalidBatchUpdate(m),
            StoreError::QueryExecutionError(m) => CliError::Model(m),
            StoreError::Unknown(m) => CliError::Database(m),
        }
    }
}
