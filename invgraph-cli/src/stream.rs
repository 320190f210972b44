//! The three command kinds a pipeline can be built from, grounded on
//! `CLISource`/`CLIFlow`/`CLICommand` in
//! `original_source/ckcore/core/cli/cli.py`. A pipeline is `source (|
//! flow)* sink?`: exactly one source, zero or more flows, and at most one
//! sink (a bare source alone streams its items out as the pipeline result).

use crate::context::CliContext;
use crate::error::CliError;

/// A single element flowing through a pipeline: the reported/desired/
/// metadata JSON of a node, an aggregate row, or a plain scalar, depending
/// on which source produced it.
pub type CliItem = serde_json::Value;

pub type CliStream = Box<dyn Iterator<Item = Result<CliItem, CliError>>>;

/// Names of env keys (`graph=`, `section=`, ...) or uploaded file slots a
/// command needs bound before it can run. Unsatisfied requirements
/// short-circuit the whole pipeline with a 424.
pub trait Requires {
    fn requires(&self, _arg: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Produces the first stream of a pipeline; takes no input.
pub trait CliSource: Requires {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &CliContext, arg: &str) -> Result<CliStream, CliError>;
}

/// Transforms one stream into another.
pub trait CliFlow: Requires {
    fn name(&self) -> &'static str;
    fn apply(&self, ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError>;
}

/// Consumes a stream, optionally re-emitting a summary stream (`out`
/// commands pass through unchanged; others like `tag` emit one ack per
/// item). Mirrors `CLISink`, which is really just a `CLIFlow` that a
/// pipeline is allowed to end on.
pub trait CliSink: Requires {
    fn name(&self) -> &'static str;
    fn consume(&self, ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError>;
}

pub fn ok_stream<I>(items: I) -> CliStream
where
    I: IntoIterator<Item = CliItem> + 'static,
{
    Box::new(items.into_iter().map(Ok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_stream_wraps_every_item_in_ok() {
        let mut s = ok_stream(vec![serde_json::json!(1), serde_json::json!(2)]);
        assert_eq!(s.next().unwrap().unwrap(), serde_json::json!(1));
        assert_eq!(s.next().unwrap().unwrap(), serde_json::json!(2));
        assert!(s.next().is_none());
    }
}
