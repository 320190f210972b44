//! Whitespace-skipping lexical primitives built on the combinator core:
//! quoted strings, numeric literals, JSON scalars, identifiers and the
//! fixed punctuation set the query and command grammars both need.

use serde_json::Value as Json;

use crate::{lexeme, literal, take_while0, take_while1, ParseError, Parser};

/// A bare identifier: `path.segments`, `variable_names`, kind names.
pub fn identifier() -> Parser<String> {
    lexeme(take_while1("an identifier", |c| {
        c.is_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']' || c == '*' || c == '-'
    }))
}

/// A double-quoted string literal with `\"` and `\\` escapes.
pub fn quoted_string() -> Parser<String> {
    lexeme(Parser::new(|input, offset| {
        let mut chars = input.char_indices();
        match chars.next() {
            Some((_, '"')) => {}
            _ => return Err(ParseError::new(offset, "expected opening '\"'")),
        }
        let mut out = String::new();
        let mut escaped = false;
        let mut end = None;
        for (idx, c) in chars {
            if escaped {
                match c {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                }
                escaped = false;
                continue;
            }
            if c == '\\' {
                escaped = true;
                continue;
            }
            if c == '"' {
                end = Some(idx + 1);
                break;
            }
            out.push(c);
        }
        match end {
            Some(end) => Ok((out, &input[end..])),
            None => Err(ParseError::new(offset, "unterminated string literal")),
        }
    }))
}

/// An integer or floating point numeric literal.
pub fn number_literal() -> Parser<f64> {
    lexeme(Parser::new(|input, offset| {
        let matched: String = input
            .chars()
            .enumerate()
            .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-'))
            .map(|(_, c)| c)
            .collect();
        if matched.is_empty() || matched == "-" {
            return Err(ParseError::new(offset, "expected a number"));
        }
        match matched.parse::<f64>() {
            Ok(n) => Ok((n, &input[matched.len()..])),
            Err(_) => Err(ParseError::new(offset, format!("invalid number literal: {}", matched))),
        }
    }))
}

/// A JSON scalar, array, or object, used as the right-hand side of a
/// predicate (`path = {"a": 1}`) and as the literal argument to `json`.
pub fn json_value() -> Parser<Json> {
    quoted_string()
        .map(Json::String)
        .or(literal("true").map(|_| Json::Bool(true)))
        .or(literal("false").map(|_| Json::Bool(false)))
        .or(literal("null").map(|_| Json::Null))
        .or(number_literal().map(|n| serde_json::json!(n)))
        .or(json_container())
}

fn json_container() -> Parser<Json> {
    // Parsed via serde_json directly on a balanced-bracket slice, since a
    // full recursive JSON grammar adds nothing over the format's own parser
    // once we can find where the value ends.
    Parser::new(|input, offset| {
        let trimmed = input.trim_start();
        let skipped = input.len() - trimmed.len();
        let first = trimmed.chars().next();
        let (open, close) = match first {
            Some('[') => ('[', ']'),
            Some('{') => ('{', '}'),
            _ => return Err(ParseError::new(offset, "expected '[' or '{'")),
        };
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;
        for (idx, c) in trimmed.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                c if c == open => depth += 1,
                c if c == close => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(idx + c.len_utf8());
                        break;
                    }
                }
                _ => {}
            }
        }
        match end {
            Some(end) => match serde_json::from_str::<Json>(&trimmed[..end]) {
                Ok(value) => Ok((value, &trimmed[end..])),
                Err(e) => Err(ParseError::new(offset + skipped, format!("invalid JSON: {}", e))),
            },
            None => Err(ParseError::new(offset + skipped, "unbalanced JSON literal")),
        }
    })
}

pub fn punct(symbol: &'static str) -> Parser<()> {
    lexeme(literal(symbol))
}

pub fn keyword(word: &'static str) -> Parser<()> {
    lexeme(literal(word))
}

pub fn ws_consumed() -> Parser<()> {
    crate::skip_ws()
}

#[test]
fn identifier_accepts_dotted_paths_and_brackets() {
    let (id, rest) = identifier().parse("reported.tags[0].name rest").unwrap();
    assert_eq!(id, "reported.tags[0].name");
    assert_eq!(rest.trim_start(), "rest");
}

#[test]
fn quoted_string_handles_escapes() {
    let (s, _) = quoted_string().parse(r#""hello \"world\"""#).unwrap();
    assert_eq!(s, "hello \"world\"");
}

#[test]
fn number_literal_parses_integers_and_floats() {
    assert_eq!(number_literal().parse("42 x").unwrap().0, 42.0);
    assert_eq!(number_literal().parse("3.14").unwrap().0, 3.14);
    assert_eq!(number_literal().parse("-5").unwrap().0, -5.0);
}

#[test]
fn json_value_parses_arrays_and_objects() {
    let (v, rest) = json_value().parse(r#"[1, 2, "x"] trailing"#).unwrap();
    assert_eq!(v, serde_json::json!([1.0, 2.0, "x"]));
    assert_eq!(rest.trim_start(), "trailing");

    let (v, _) = json_value().parse(r#"{"a": 1, "b": [true, false]}"#).unwrap();
    assert_eq!(v["a"], 1.0);
}
