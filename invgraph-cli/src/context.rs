//! Execution context threaded through a single pipeline evaluation, grounded
//! on `CLIContext` in `original_source/ckcore/core/cli/cli.py`: the env map
//! a pipeline's leading `key=value` tokens populate, the graph currently in
//! scope, and the collaborators every command needs (store, bus, clock).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use slog::Logger;

use invgraph::data::graph::GraphName;
use invgraph_bus::events::EventBus;
use invgraph_bus::tasks::TaskQueue;
use invgraph_bus::workflow::TaskHandler;
use invgraph_store::driver::InMemoryDriver;
use invgraph_store::merge::MergeConfig;

/// Collaborators shared by every command invocation within a process.
#[derive(Clone)]
pub struct CliDependencies {
    pub store: Arc<InMemoryDriver>,
    pub bus: Arc<EventBus>,
    pub tasks: Arc<TaskQueue>,
    pub jobs: Arc<TaskHandler>,
    pub merge_config: MergeConfig,
    pub logger: Logger,
}

/// Per-pipeline execution state: the env map accumulated from leading
/// `key=value` tokens plus whichever graph `graph=` selected.
#[derive(Clone)]
pub struct CliContext {
    pub deps: CliDependencies,
    pub env: Vec<(String, String)>,
    pub now: DateTime<Utc>,
}

impl CliContext {
    pub fn new(deps: CliDependencies, now: DateTime<Utc>) -> Self {
        CliContext {
            deps,
            env: Vec::new(),
            now,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.env.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn graph(&self) -> Result<GraphName, crate::error::CliError> {
        let name = self.get("graph").unwrap_or("resources");
        GraphName::new(name).map_err(|_| crate::error::CliError::Model(format!("invalid graph name {:?}", name)))
    }

    pub fn section(&self) -> &str {
        self.get("section").unwrap_or("reported")
    }

    pub fn now_value(&self) -> Json {
        Json::String(self.now.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invgraph_bus::config::Config;
    use invgraph_bus::events::EventBus;
    use invgraph_bus::tasks::TaskQueue;
    use slog::{Discard, Logger};

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
    fn last_assignment_for_a_key_wins() {
        let ctx = CliContext::new(test_deps(), Utc::now()).with_env(vec![
            ("graph".to_owned(), "aws".to_owned()),
            ("graph".to_owned(), "gcp".to_owned()),
        ]);
        assert_eq!(ctx.get("graph"), Some("gcp"));
    }

    #[test]
    fn graph_defaults_to_resources_when_unset() {
        let ctx = CliContext::new(test_deps(), Utc::now());
        assert_eq!(ctx.graph().unwrap().as_str(), "resources");
    }
}
