//! The command table itself, grounded command-by-command on
//! `original_source/ckcore/core/cli/command.py`, each struct named after the
//! command it implements and dispatched through [`crate::registry`].

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value as Json};

use invgraph::components::store::Store;
use invgraph::data::node::{Node, NodeId, Section};
use invgraph_bus::tasks::Task;
use invgraph_bus::workflow::{JobDefinition, SurpassBehavior, Trigger};
use invgraph_query::parser::parse_query;

use crate::context::CliContext;
use crate::error::CliError;
use crate::interpret;
use crate::stream::{ok_stream, CliFlow, CliSink, CliSource, CliStream, Requires};

pub struct EchoSource;
impl Requires for EchoSource {}
impl CliSource for EchoSource {
    fn name(&self) -> &'static str {
        "echo"
    }
    fn run(&self, _ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        Ok(ok_stream(vec![Json::String(arg.to_owned())]))
    }
}

pub struct JsonSource;
impl Requires for JsonSource {}
impl CliSource for JsonSource {
    fn name(&self) -> &'static str {
        "json"
    }
    fn run(&self, _ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let value: Json = serde_json::from_str(arg).map_err(|e| CliError::wrap("json", arg, e.to_string()))?;
        match value {
            Json::Array(items) => Ok(ok_stream(items)),
            other => Ok(ok_stream(vec![other])),
        }
    }
}

pub struct ExecuteQuerySource;
impl Requires for ExecuteQuerySource {
    fn requires(&self, _arg: &str) -> Vec<String> {
        vec!["graph".to_owned()]
    }
}
impl CliSource for ExecuteQuerySource {
    fn name(&self) -> &'static str {
        "execute_query"
    }
    fn run(&self, ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let query = parse_query(arg).map_err(|e| CliError::wrap("execute_query", arg, e.to_string()))?;
        let graph = ctx.graph()?;
        let rows = interpret::execute(&ctx.deps.store, &graph, &query)?;
        Ok(ok_stream(rows))
    }
}

pub struct EnvSource;
impl Requires for EnvSource {}
impl CliSource for EnvSource {
    fn name(&self) -> &'static str {
        "env"
    }
    fn run(&self, ctx: &CliContext, _arg: &str) -> Result<CliStream, CliError> {
        let mut map = Map::new();
        for (k, v) in &ctx.env {
            map.insert(k.clone(), Json::String(v.clone()));
        }
        Ok(ok_stream(vec![Json::Object(map)]))
    }
}

pub struct SleepSource;
impl Requires for SleepSource {}
impl CliSource for SleepSource {
    fn name(&self) -> &'static str {
        "sleep"
    }
    fn run(&self, _ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let secs: u64 = arg.trim().parse().map_err(|_| CliError::wrap("sleep", arg, "not a number of seconds"))?;
        std::thread::sleep(std::time::Duration::from_secs(secs));
        Ok(ok_stream(vec![Json::String(String::new())]))
    }
}

pub struct JobsSource;
impl Requires for JobsSource {}
impl CliSource for JobsSource {
    fn name(&self) -> &'static str {
        "jobs"
    }
    fn run(&self, ctx: &CliContext, _arg: &str) -> Result<CliStream, CliError> {
        let jobs = ctx.deps.jobs.jobs();
        let rows: Vec<Json> = jobs.iter().map(|j| serde_json::to_value(j).unwrap_or(Json::Null)).collect();
        Ok(ok_stream(rows))
    }
}

pub struct TasksSource;
impl Requires for TasksSource {}
impl CliSource for TasksSource {
    fn name(&self) -> &'static str {
        "tasks"
    }
    fn run(&self, ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let job_id = arg.trim();
        let ids = ctx.deps.jobs.running_task_ids(job_id);
        Ok(ok_stream(ids.into_iter().map(Json::String).collect::<Vec<_>>()))
    }
}

/// `add_job <id>: <cron-or-event>: <command>` — registers a job definition.
/// Placeholder substitution is suppressed for this command by the pipeline
/// layer, so `arg` carries the job's raw command text.
pub struct AddJobSource;
impl Requires for AddJobSource {}
impl CliSource for AddJobSource {
    fn name(&self) -> &'static str {
        "add_job"
    }
    fn run(&self, ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let segments: Vec<&str> = arg.splitn(3, ':').map(str::trim).collect();
        let (id, trigger_text, command) = match segments.as_slice() {
            [id, trigger, command] => (*id, *trigger, *command),
            _ => return Err(CliError::wrap("add_job", arg, "expected 'id: trigger: command'")),
        };
        let trigger = if let Some(event_type) = trigger_text.strip_prefix("event ") {
            Trigger::Event {
                event_type: event_type.trim().to_owned(),
                max_wait: std::time::Duration::from_secs(24 * 60 * 60),
            }
        } else {
            Trigger::Cron(trigger_text.to_owned())
        };
        ctx.deps.jobs.add_job(JobDefinition {
            id: id.to_owned(),
            trigger,
            command: command.to_owned(),
            surpass_behavior: SurpassBehavior::Skip,
        });
        Ok(ok_stream(vec![Json::String(format!("job {} added", id))]))
    }
}

pub struct DeleteJobSource;
impl Requires for DeleteJobSource {}
impl CliSource for DeleteJobSource {
    fn name(&self) -> &'static str {
        "delete_job"
    }
    fn run(&self, ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let job_id = arg.trim();
        ctx.deps.jobs.delete_job(job_id).map_err(|e| CliError::wrap("delete_job", arg, e.to_string()))?;
        Ok(ok_stream(vec![Json::String(format!("job {} deleted", job_id))]))
    }
}

pub struct StartTaskSource;
impl Requires for StartTaskSource {}
impl CliSource for StartTaskSource {
    fn name(&self) -> &'static str {
        "start_task"
    }
    fn run(&self, ctx: &CliContext, arg: &str) -> Result<CliStream, CliError> {
        let job_id = arg.trim();
        let task_id = format!("{}-{}", job_id, ctx.now.timestamp_millis());
        let started = ctx
            .deps
            .jobs
            .start_task_by_descriptor_id(job_id, task_id)
            .map_err(|e| CliError::wrap("start_task", arg, e.to_string()))?;
        Ok(ok_stream(vec![Json::String(started)]))
    }
}

fn collect(input: CliStream) -> Result<Vec<Json>, CliError> {
    input.collect()
}

pub struct CountFlow;
impl Requires for CountFlow {}
impl CliFlow for CountFlow {
    fn name(&self) -> &'static str {
        "count"
    }
    fn apply(&self, _ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let items = collect(input)?;
        let path = arg.trim();
        if path.is_empty() {
            return Ok(ok_stream(vec![Json::String(format!("{}: matched", items.len()))]));
        }
        let mut counts: HashMap<String, u64> = HashMap::new();
        for item in &items {
            let key = lookup(item, path).map(|v| v.to_string()).unwrap_or_else(|| "null".to_owned());
            *counts.entry(key).or_insert(0) += 1;
        }
        let mut rows: Vec<Json> = counts.into_iter().map(|(k, v)| Json::String(format!("{}: {}", k, v))).collect();
        rows.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        rows.push(Json::String(format!("total matched: {}", items.len())));
        Ok(ok_stream(rows))
    }
}

fn lookup<'a>(item: &'a Json, path: &str) -> Option<&'a Json> {
    let mut current = item;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

pub struct HeadFlow;
impl Requires for HeadFlow {}
impl CliFlow for HeadFlow {
    fn name(&self) -> &'static str {
        "head"
    }
    fn apply(&self, _ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let n: usize = arg.trim().parse().unwrap_or(100);
        Ok(Box::new(input.take(n)))
    }
}

pub struct TailFlow;
impl Requires for TailFlow {}
impl CliFlow for TailFlow {
    fn name(&self) -> &'static str {
        "tail"
    }
    fn apply(&self, _ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let n: usize = arg.trim().parse().unwrap_or(100);
        let mut items = collect(input)?;
        if items.len() > n {
            items.drain(0..items.len() - n);
        }
        Ok(ok_stream(items))
    }
}

pub struct ChunkFlow;
impl Requires for ChunkFlow {}
impl CliFlow for ChunkFlow {
    fn name(&self) -> &'static str {
        "chunk"
    }
    fn apply(&self, _ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let n: usize = arg.trim().parse().unwrap_or(100).max(1);
        let items = collect(input)?;
        let chunks: Vec<Json> = items.chunks(n).map(|c| Json::Array(c.to_vec())).collect();
        Ok(ok_stream(chunks))
    }
}

pub struct FlattenFlow;
impl Requires for FlattenFlow {}
impl CliFlow for FlattenFlow {
    fn name(&self) -> &'static str {
        "flatten"
    }
    fn apply(&self, _ctx: &CliContext, _arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let items = collect(input)?;
        let mut flat = Vec::new();
        for item in items {
            match item {
                Json::Array(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Ok(ok_stream(flat))
    }
}

pub struct UniqFlow;
impl Requires for UniqFlow {}
impl CliFlow for UniqFlow {
    fn name(&self) -> &'static str {
        "uniq"
    }
    fn apply(&self, _ctx: &CliContext, _arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let items = collect(input)?;
        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<Json> = items.into_iter().filter(|item| seen.insert(item.to_string())).collect();
        Ok(ok_stream(deduped))
    }
}

fn parse_kv_pairs(arg: &str) -> Vec<(String, String)> {
    arg.split_whitespace()
        .filter_map(|token| {
            let mut parts = token.splitn(2, '=');
            let key = parts.next()?.to_owned();
            let value = parts.next().unwrap_or("").to_owned();
            Some((key, value))
        })
        .collect()
}

fn node_id_of(item: &Json) -> Option<NodeId> {
    item.get("id").and_then(Json::as_str).map(NodeId::from)
}

fn patch_section(ctx: &CliContext, command: &str, arg: &str, input: CliStream, section: Section) -> Result<CliStream, CliError> {
    let pairs = parse_kv_pairs(arg);
    let graph = ctx.graph()?;
    let items = collect(input)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let Some(id) = node_id_of(&item) {
            if let Some(mut node) = ctx.deps.store.get(&graph, &id)? {
                apply_patch(&mut node, section, &pairs);
                ctx.deps.store.upsert_node(&graph, node.clone())?;
                out.push(serde_json::to_value(&node).unwrap_or(item));
                continue;
            }
        }
        return Err(CliError::wrap(command, arg, "element has no resolvable node id"));
    }
    Ok(ok_stream(out))
}

fn apply_patch(node: &mut Node, section: Section, pairs: &[(String, String)]) {
    let target = node.section_mut(section);
    if !target.is_object() {
        *target = Json::Object(Map::new());
    }
    if let Json::Object(map) = target {
        for (k, v) in pairs {
            let value = serde_json::from_str(v).unwrap_or_else(|_| Json::String(v.clone()));
            map.insert(k.clone(), value);
        }
    }
}

pub struct SetDesiredFlow;
impl Requires for SetDesiredFlow {
    fn requires(&self, _arg: &str) -> Vec<String> {
        vec!["graph".to_owned()]
    }
}
impl CliFlow for SetDesiredFlow {
    fn name(&self) -> &'static str {
        "set_desired"
    }
    fn apply(&self, ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        patch_section(ctx, "set_desired", arg, input, Section::Desired)
    }
}

pub struct CleanFlow;
impl Requires for CleanFlow {
    fn requires(&self, _arg: &str) -> Vec<String> {
        vec!["graph".to_owned()]
    }
}
impl CliFlow for CleanFlow {
    fn name(&self) -> &'static str {
        "clean"
    }
    fn apply(&self, ctx: &CliContext, _arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        patch_section(ctx, "clean", "clean=true", input, Section::Desired)
    }
}

pub struct SetMetadataFlow;
impl Requires for SetMetadataFlow {
    fn requires(&self, _arg: &str) -> Vec<String> {
        vec!["graph".to_owned()]
    }
}
impl CliFlow for SetMetadataFlow {
    fn name(&self) -> &'static str {
        "set_metadata"
    }
    fn apply(&self, ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        patch_section(ctx, "set_metadata", arg, input, Section::Metadata)
    }
}

pub struct ProtectFlow;
impl Requires for ProtectFlow {
    fn requires(&self, _arg: &str) -> Vec<String> {
        vec!["graph".to_owned()]
    }
}
impl CliFlow for ProtectFlow {
    fn name(&self) -> &'static str {
        "protect"
    }
    fn apply(&self, ctx: &CliContext, _arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        patch_section(ctx, "protect", "protected=true", input, Section::Metadata)
    }
}

pub struct FormatFlow;
impl Requires for FormatFlow {}
impl CliFlow for FormatFlow {
    fn name(&self) -> &'static str {
        "format"
    }
    fn apply(&self, _ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let template = arg.to_owned();
        Ok(Box::new(input.map(move |item| {
            let item = item?;
            Ok(Json::String(render_template(&template, &item)))
        })))
    }
}

fn render_template(template: &str, item: &Json) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let path = &after[..end];
                let value = lookup(item, path).cloned().unwrap_or(Json::Null);
                out.push_str(&render_scalar(&value));
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn render_scalar(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => "null".to_owned(),
        other => other.to_string(),
    }
}

const DEFAULT_LIST_PROPERTIES: &[&str] = &["id", "reported.name", "reported.kind"];

pub struct ListFlow;
impl Requires for ListFlow {}
impl CliFlow for ListFlow {
    fn name(&self) -> &'static str {
        "list"
    }
    fn apply(&self, _ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let requested: Vec<(String, String)> = if arg.trim().is_empty() {
            DEFAULT_LIST_PROPERTIES.iter().map(|p| (p.to_string(), p.to_string())).collect()
        } else {
            arg.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|part| {
                    let mut pieces = part.splitn(2, " as ");
                    let path = pieces.next().unwrap_or(part).trim().to_owned();
                    let name = pieces.next().map(str::trim).unwrap_or(&path).to_owned();
                    (path, name)
                })
                .collect()
        };
        Ok(Box::new(input.map(move |item| {
            let item = item?;
            let rendered: Vec<String> = requested
                .iter()
                .map(|(path, name)| format!("{}={}", name, lookup(&item, path).map(render_scalar).unwrap_or_else(|| "null".to_owned())))
                .collect();
            Ok(Json::String(rendered.join(", ")))
        })))
    }
}

/// `tag update/delete k [v]` dispatches a worker task per element; with no
/// worker transport in scope, the patch is applied directly and the
/// updated node reflected back, the way a worker ack would.
pub struct TagFlow;
impl Requires for TagFlow {
    fn requires(&self, _arg: &str) -> Vec<String> {
        vec!["graph".to_owned()]
    }
}
impl CliFlow for TagFlow {
    fn name(&self) -> &'static str {
        "tag"
    }
    fn apply(&self, ctx: &CliContext, arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let mut tokens = arg.split_whitespace();
        let action = tokens.next().unwrap_or("update");
        let key = tokens.next().unwrap_or("").to_owned();
        let value = tokens.next().map(str::to_owned);
        let graph = ctx.graph()?;
        let items = collect(input)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let id = node_id_of(&item).ok_or_else(|| CliError::wrap("tag", arg, "element has no resolvable node id"))?;
            let mut node = ctx
                .deps
                .store
                .get(&graph, &id)?
                .ok_or_else(|| CliError::NotFound(format!("node {}", id)))?;
            ctx.deps.tasks.submit(Task {
                id: format!("tag-{}-{}", id, ctx.now.timestamp_millis()),
                name: "tag".to_owned(),
                attrs: HashMap::new(),
                data: Json::String(format!("{} {} {:?}", action, key, value)),
            });
            if action == "delete" {
                if let Json::Object(map) = node.section_mut(Section::Metadata) {
                    map.remove(&key);
                }
            } else {
                apply_patch(&mut node, Section::Metadata, &[(key.clone(), value.clone().unwrap_or_else(|| "true".to_owned()))]);
            }
            ctx.deps.store.upsert_node(&graph, node.clone())?;
            out.push(serde_json::to_value(&node).unwrap_or(item));
        }
        Ok(ok_stream(out))
    }
}

pub struct OutSink;
impl Requires for OutSink {}
impl CliSink for OutSink {
    fn name(&self) -> &'static str {
        "out"
    }
    fn consume(&self, _ctx: &CliContext, _arg: &str, input: CliStream) -> Result<CliStream, CliError> {
        let items = collect(input)?;
        Ok(ok_stream(vec![Json::Array(items)]))
    }
}

#[allow(dead_code)]
fn current_time_marker() -> Json {
    Json::String(Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CliDependencies;
    use invgraph_bus::config::Config;
    use invgraph_bus::events::EventBus;
    use invgraph_bus::tasks::TaskQueue;
    use invgraph_bus::workflow::TaskHandler;
    use invgraph_store::driver::InMemoryDriver;
    use invgraph_store::merge::MergeConfig;
    use slog::{Discard, Logger};
    use std::sync::Arc;

    fn test_ctx() -> CliContext {
        let config = Config::default();
        let bus = Arc::new(EventBus::new());
        let deps = CliDependencies {
            store: Arc::new(InMemoryDriver::new()),
            jobs: Arc::new(TaskHandler::new(bus.clone())),
            bus,
            tasks: Arc::new(TaskQueue::new(config.task_retry_limit, std::time::Duration::from_secs(60))),
            merge_config: MergeConfig::default(),
            logger: Logger::root(Discard, slog::o!()),
        };
        CliContext::new(deps, Utc::now())
    }

    #[test]
    fn echo_emits_single_string() {
        let ctx = test_ctx();
        let mut stream = EchoSource.run(&ctx, "hello").unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), Json::String("hello".to_owned()));
        assert!(stream.next().is_none());
    }

    #[test]
    fn json_array_yields_each_element() {
        let ctx = test_ctx();
        let stream = JsonSource.run(&ctx, "[1,2,3]").unwrap();
        let items: Vec<Json> = stream.collect::<Result<_, _>>().unwrap();
        assert_eq!(items, vec![Json::from(1), Json::from(2), Json::from(3)]);
    }

    #[test]
    fn head_limits_to_n_elements() {
        let ctx = test_ctx();
        let input = ok_stream(vec![Json::from(1), Json::from(2), Json::from(3)]);
        let out = HeadFlow.apply(&ctx, "2", input).unwrap();
        let items: Vec<Json> = out.collect::<Result<_, _>>().unwrap();
        assert_eq!(items, vec![Json::from(1), Json::from(2)]);
    }

    #[test]
    fn tail_keeps_last_n_elements() {
        let ctx = test_ctx();
        let input = ok_stream(vec![Json::from(1), Json::from(2), Json::from(3)]);
        let out = TailFlow.apply(&ctx, "2", input).unwrap();
        let items: Vec<Json> = out.collect::<Result<_, _>>().unwrap();
        assert_eq!(items, vec![Json::from(2), Json::from(3)]);
    }

    #[test]
    fn format_substitutes_placeholders_from_item() {
        let ctx = test_ctx();
        let input = ok_stream(vec![serde_json::json!({"name": "box"})]);
        let out = FormatFlow.apply(&ctx, "hello {name}!", input).unwrap();
        let items: Vec<Json> = out.collect::<Result<_, _>>().unwrap();
        assert_eq!(items, vec![Json::String("hello box!".to_owned())]);
    }

    #[test]
    fn out_collects_stream_into_a_single_array() {
        let ctx = test_ctx();
        let input = ok_stream(vec![Json::from(1), Json::from(2)]);
        let out = OutSink.consume(&ctx, "", input).unwrap();
        let items: Vec<Json> = out.collect::<Result<_, _>>().unwrap();
        assert_eq!(items, vec![Json::Array(vec![Json::from(1), Json::from(2)])]);
    }

    #[test]
    fn add_job_then_jobs_reflects_the_registration() {
        let ctx = test_ctx();
        AddJobSource.run(&ctx, "nightly: 0 0 * * *: echo hi").unwrap().next();
        let jobs: Vec<Json> = JobsSource.run(&ctx, "").unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
