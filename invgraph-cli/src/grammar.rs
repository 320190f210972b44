//! Command-line grammar: `env? cmd ('|' cmd)* (';' env? cmd ('|' cmd)*)*`.
//! Splitting on `|`/`;` has to respect quoted strings (a `format` or `json`
//! argument may itself contain those characters), so this is a small
//! hand-rolled scanner rather than a direct grammar-combinator port, the
//! way `original_source/ckcore/core/cli/cli.py`'s `ParsedCommandLine`
//! construction tokenizes ahead of parsing each command's own argument.

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCommand {
    pub name: String,
    pub arg: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedPipeline {
    pub env: Vec<(String, String)>,
    pub commands: Vec<ParsedCommand>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCommandLine {
    pub pipelines: Vec<ParsedPipeline>,
}

/// Split `input` on `separator` at top level only, i.e. not inside a
/// double-quoted string.
fn split_top_level(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in input.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            current.push(c);
        } else if c == separator {
            parts.push(current.clone());
            current.clear();
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

/// Parse a single `env? cmd ('|' cmd)*` segment.
fn parse_single_pipeline(segment: &str) -> ParsedPipeline {
    let cmd_segments = split_top_level(segment, '|');
    let mut env = Vec::new();
    let mut commands = Vec::new();
    for (index, raw) in cmd_segments.iter().enumerate() {
        let trimmed = raw.trim();
        if index == 0 {
            let (leading_env, rest) = take_leading_env(trimmed);
            env = leading_env;
            if !rest.trim().is_empty() {
                commands.push(split_name_and_arg(rest.trim()));
            }
        } else if !trimmed.is_empty() {
            commands.push(split_name_and_arg(trimmed));
        }
    }
    ParsedPipeline { env, commands }
}

/// Consume leading `key=value` tokens (space separated, outside quotes)
/// until the first token that isn't itself an assignment; that token (and
/// everything after it) is returned as the remaining command text.
fn take_leading_env(input: &str) -> (Vec<(String, String)>, &str) {
    let mut env = Vec::new();
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        let token_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let token = &trimmed[..token_end];
        if let Some(eq) = token.find('=') {
            if eq > 0 {
                let key = token[..eq].to_owned();
                let value = token[eq + 1..].to_owned();
                env.push((key, value));
                rest = &trimmed[token_end..];
                continue;
            }
        }
        return (env, trimmed);
    }
}

fn split_name_and_arg(input: &str) -> ParsedCommand {
    let input = input.trim();
    match input.find(char::is_whitespace) {
        Some(idx) => ParsedCommand {
            name: input[..idx].to_owned(),
            arg: input[idx..].trim_start().to_owned(),
        },
        None => ParsedCommand {
            name: input.to_owned(),
            arg: String::new(),
        },
    }
}

/// Parse a full command line: `command_line := env? cmd ('|' cmd)* (';'
/// env? cmd ('|' cmd)*)*`.
pub fn parse_command_line(input: &str) -> ParsedCommandLine {
    let segments = split_top_level(input, ';');
    let pipelines = segments
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .map(|s| parse_single_pipeline(&s))
        .collect();
    ParsedCommandLine { pipelines }
}

#[test]
fn splits_pipe_and_semicolon_at_top_level_only() {
    let line = parse_command_line(r#"echo "a|b" | count ; json [1,2]"#);
    assert_eq!(line.pipelines.len(), 2);
    assert_eq!(line.pipelines[0].commands.len(), 2);
    assert_eq!(line.pipelines[0].commands[0].name, "echo");
    assert_eq!(line.pipelines[0].commands[0].arg, "\"a|b\"");
}

#[test]
fn leading_env_assignments_are_captured_separately() {
    let line = parse_command_line("now=2021-01-01T00:00:00Z graph=aws reported reported.name == \"x\"");
    let pipeline = &line.pipelines[0];
    assert_eq!(
        pipeline.env,
        vec![
            ("now".to_owned(), "2021-01-01T00:00:00Z".to_owned()),
            ("graph".to_owned(), "aws".to_owned())
        ]
    );
    assert_eq!(pipeline.commands[0].name, "reported");
    assert_eq!(pipeline.commands[0].arg, "reported.name == \"x\"");
}

#[test]
fn pipeline_without_env_has_empty_env() {
    let line = parse_command_line("echo hi | out");
    assert!(line.pipelines[0].env.is_empty());
    assert_eq!(line.pipelines[0].commands.len(), 2);
}
