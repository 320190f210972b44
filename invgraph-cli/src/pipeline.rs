//! Evaluate and execute a full command line, grounded on
//! `CLI.evaluate_cli_command`/`CLI.execute_cli_command` in
//! `original_source/ckcore/core/cli/cli.py`: substitute placeholders, parse,
//! fuse query parts, collect requirements, then run source → flows → sink.

use serde_json::Value as Json;

use crate::context::{CliContext, CliDependencies};
use crate::error::CliError;
use crate::fuse;
use crate::grammar::{parse_command_line, ParsedCommand};
use crate::interpret;
use crate::placeholders;
use crate::registry::{CommandKind, CommandRegistry};
use crate::stream::{ok_stream, CliStream};

/// One pipeline's worth of results, already materialized: a lazy `CliStream`
/// only lives for the duration of a single `run_pipeline` call, since every
/// flow may need to see the whole stream (e.g. `tail`, `uniq`).
pub type PipelineResult = Result<Vec<Json>, CliError>;

/// Parse `line`, fuse query parts, and collect every command's declared
/// requirements without running anything: used by a caller that wants to
/// fail fast with a 424 before starting work.
pub fn evaluate(registry: &CommandRegistry, line: &str, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<String>, CliError> {
    let substituted = placeholders::substitute_unless_add_job(line, now);
    let parsed = parse_command_line(&substituted);
    let mut requirements = Vec::new();
    for pipeline in &parsed.pipelines {
        requirements.extend(pipeline_requirements(registry, &pipeline.commands)?);
    }
    requirements.sort();
    requirements.dedup();
    Ok(requirements)
}

fn pipeline_requirements(registry: &CommandRegistry, commands: &[ParsedCommand]) -> Result<Vec<String>, CliError> {
    let mut out = Vec::new();
    let fused = fuse::fuse(commands)?;
    let remaining = match &fused {
        Some(f) => {
            out.push("graph".to_owned());
            &commands[f.consumed..]
        }
        None => commands,
    };
    for cmd in remaining {
        match registry.get(&cmd.name) {
            Some(CommandKind::Source(s)) => out.extend(s.requires(&cmd.arg)),
            Some(CommandKind::Flow(f)) => out.extend(f.requires(&cmd.arg)),
            Some(CommandKind::Sink(s)) => out.extend(s.requires(&cmd.arg)),
            None => return Err(CliError::NotFound(format!("command {}", cmd.name))),
        }
    }
    Ok(out)
}

/// Run `line` end to end against `deps`, returning the flattened results of
/// every pipeline in the sequence. Each pipeline gets its own `CliContext`
/// built from its own leading env bindings, independent of its neighbors.
pub fn execute(
    registry: &CommandRegistry,
    deps: CliDependencies,
    line: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> PipelineResult {
    let substituted = placeholders::substitute_unless_add_job(line, now);
    let parsed = parse_command_line(&substituted);
    let requirements = evaluate(registry, line, now)?;
    let satisfied = requirements.iter().all(|r| {
        parsed
            .pipelines
            .iter()
            .any(|p| p.env.iter().any(|(k, _)| k == r))
    });
    if !requirements.is_empty() && !satisfied {
        return Err(CliError::Requirement(requirements));
    }

    let mut all_results = Vec::new();
    for pipeline in &parsed.pipelines {
        let ctx = CliContext::new(deps.clone(), now).with_env(pipeline.env.clone());
        all_results.extend(run_pipeline(registry, &ctx, &pipeline.commands)?);
    }
    Ok(all_results)
}

fn run_pipeline(registry: &CommandRegistry, ctx: &CliContext, commands: &[ParsedCommand]) -> PipelineResult {
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let fused = fuse::fuse(commands)?;
    let (mut stream, rest): (CliStream, &[ParsedCommand]) = match fused {
        Some(f) => {
            let graph = ctx.graph()?;
            let rows = interpret::execute(&ctx.deps.store, &graph, &f.query)?;
            (ok_stream(rows), &commands[f.consumed..])
        }
        None => {
            let first = &commands[0];
            match registry.get(&first.name) {
                Some(CommandKind::Source(source)) => (source.run(ctx, &first.arg)?, &commands[1..]),
                Some(_) => return Err(CliError::wrap(&first.name, &first.arg, "expected a source in the first position")),
                None => return Err(CliError::NotFound(format!("command {}", first.name))),
            }
        }
    };

    for (index, cmd) in rest.iter().enumerate() {
        let is_last = index == rest.len() - 1;
        match registry.get(&cmd.name) {
            Some(CommandKind::Flow(flow)) => {
                stream = flow.apply(ctx, &cmd.arg, stream)?;
            }
            Some(CommandKind::Sink(sink)) if is_last => {
                stream = sink.consume(ctx, &cmd.arg, stream)?;
            }
            Some(CommandKind::Sink(_)) => {
                return Err(CliError::wrap(&cmd.name, &cmd.arg, "a sink must be the last command in a pipeline"));
            }
            Some(CommandKind::Source(_)) => {
                return Err(CliError::wrap(&cmd.name, &cmd.arg, "a source may only appear in the first position"));
            }
            None => return Err(CliError::NotFound(format!("command {}", cmd.name))),
        }
    }

    stream.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use invgraph_bus::config::Config;
    use invgraph_bus::events::EventBus;
    use invgraph_bus::tasks::TaskQueue;
    use invgraph_bus::workflow::TaskHandler;
    use invgraph_store::driver::InMemoryDriver;
    use invgraph_store::merge::MergeConfig;
    use slog::{Discard, Logger};
    use std::sync::Arc;

    fn test_deps() -> CliDependencies {
        let config = Config::default();
        let bus = Arc::new(EventBus::new());
        CliDependencies {
            store: Arc::new(InMemoryDriver::new()),
            jobs: Arc::new(TaskHandler::new(bus.clone())),
            bus,
            tasks: Arc::new(TaskQueue::new(config.task_retry_limit, std::time::Duration::from_secs(60))),
            merge_config: MergeConfig::default(),
            logger: Logger::root(Discard, slog::o!()),
        }
    }

    #[test]
    fn echo_pipe_out_collects_into_one_array() {
        let registry = CommandRegistry::new();
        let result = execute(&registry, test_deps(), "echo hi | out", chrono::Utc::now()).unwrap();
        assert_eq!(result, vec![Json::Array(vec![Json::String("hi".to_owned())])]);
    }

    #[test]
    fn query_without_graph_env_is_rejected_as_a_missing_requirement() {
        let registry = CommandRegistry::new();
        let err = execute(&registry, test_deps(), "reported reported.name == \"x\"", chrono::Utc::now()).unwrap_err();
        assert!(matches!(err, CliError::Requirement(_)));
    }

    #[test]
    fn query_with_graph_env_runs_against_the_store() {
        let registry = CommandRegistry::new();
        let result = execute(&registry, test_deps(), "graph=aws reported reported.name == \"x\"", chrono::Utc::now()).unwrap();
        assert_eq!(result, Vec::<Json>::new());
    }

    #[test]
    fn sequential_pipelines_are_independent() {
        let registry = CommandRegistry::new();
        let result = execute(&registry, test_deps(), "echo a | out ; echo b | out", chrono::Utc::now()).unwrap();
        assert_eq!(result.len(), 2);
    }
}
