//! Maps a command name to its kind, grounded on `CLI.all_commands` in
//! `original_source/ckcore/core/cli/cli.py`: a single lookup table a
//! pipeline consults once per command name before dispatch.

use std::collections::HashMap;

use crate::commands;
use crate::stream::{CliFlow, CliSink, CliSource};

pub enum CommandKind {
    Source(Box<dyn CliSource>),
    Flow(Box<dyn CliFlow>),
    Sink(Box<dyn CliSink>),
}

pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandKind>,
}

macro_rules! source {
    ($map:expr, $ctor:expr) => {{
        let cmd = $ctor;
        $map.insert(cmd.name(), CommandKind::Source(Box::new(cmd)));
    }};
}

macro_rules! flow {
    ($map:expr, $ctor:expr) => {{
        let cmd = $ctor;
        $map.insert(cmd.name(), CommandKind::Flow(Box::new(cmd)));
    }};
}

macro_rules! sink {
    ($map:expr, $ctor:expr) => {{
        let cmd = $ctor;
        $map.insert(cmd.name(), CommandKind::Sink(Box::new(cmd)));
    }};
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut commands: HashMap<&'static str, CommandKind> = HashMap::new();
        source!(commands, commands::EchoSource);
        source!(commands, commands::JsonSource);
        source!(commands, commands::ExecuteQuerySource);
        source!(commands, commands::EnvSource);
        source!(commands, commands::SleepSource);
        source!(commands, commands::JobsSource);
        source!(commands, commands::TasksSource);
        source!(commands, commands::AddJobSource);
        source!(commands, commands::DeleteJobSource);
        source!(commands, commands::StartTaskSource);

        flow!(commands, commands::CountFlow);
        flow!(commands, commands::HeadFlow);
        flow!(commands, commands::TailFlow);
        flow!(commands, commands::ChunkFlow);
        flow!(commands, commands::FlattenFlow);
        flow!(commands, commands::UniqFlow);
        flow!(commands, commands::SetDesiredFlow);
        flow!(commands, commands::CleanFlow);
        flow!(commands, commands::SetMetadataFlow);
        flow!(commands, commands::ProtectFlow);
        flow!(commands, commands::FormatFlow);
        flow!(commands, commands::ListFlow);
        flow!(commands, commands::TagFlow);

        sink!(commands, commands::OutSink);

        CommandRegistry { commands }
    }

    pub fn get(&self, name: &str) -> Option<&CommandKind> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_every_documented_command() {
        let registry = CommandRegistry::new();
        for name in ["echo", "json", "execute_query", "env", "sleep", "count", "head", "tail", "out"] {
            assert!(registry.contains(name), "missing command {}", name);
        }
    }
}
