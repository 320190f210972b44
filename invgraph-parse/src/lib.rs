//! Hand-rolled parser combinators shared by the query grammar and the
//! command-line grammar.
//!
//! No external combinator crate appears anywhere in this dependency graph
//! (recursive descent is hand-rolled, the way `graphql-parser` does it),
//! so this is native: a `Parser<T>` is a cloneable
//! function from remaining input to either a parsed value and the rest of
//! the input, or a `ParseError` carrying a byte offset.

use std::fmt;
use std::rc::Rc;

pub mod lexeme;

/// A parse failure. Always carries the byte offset it occurred at, per the
/// contract that the parser never silently drops input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        ParseError {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "parse error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<'a, T> = Result<(T, &'a str), ParseError>;

/// A reusable, cloneable parser. Wraps an `Rc` so combinators can be built
/// once and applied many times (the grammar in `invgraph-query::parser` is
/// built once at module init and reused per query).
#[derive(Clone)]
pub struct Parser<T> {
    run: Rc<dyn for<'a> Fn(&'a str, usize) -> ParseResult<'a, T>>,
}

impl<T: 'static> Parser<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a str, usize) -> ParseResult<'a, T> + 'static,
    {
        Parser { run: Rc::new(f) }
    }

    /// Parse starting at byte offset 0 of `input`.
    pub fn parse<'a>(&self, input: &'a str) -> ParseResult<'a, T> {
        (self.run)(input, 0)
    }

    fn run_at<'a>(&self, input: &'a str, offset: usize) -> ParseResult<'a, T> {
        (self.run)(input, offset)
    }

    /// Require the parser to consume the entire remaining input.
    pub fn parse_all<'a>(&self, input: &'a str) -> Result<T, ParseError> {
        let (value, rest) = self.parse(input)?;
        if rest.trim().is_empty() {
            Ok(value)
        } else {
            Err(ParseError::new(input.len() - rest.len(), format!("unexpected trailing input: {:?}", rest)))
        }
    }

    pub fn map<U: 'static, F>(&self, f: F) -> Parser<U>
    where
        F: Fn(T) -> U + 'static,
    {
        let this = self.clone();
        Parser::new(move |input, offset| {
            let (value, rest) = this.run_at(input, offset)?;
            Ok((f(value), rest))
        })
    }

    pub fn and_then<U: 'static, F>(&self, f: F) -> Parser<U>
    where
        F: Fn(T) -> Parser<U> + 'static,
    {
        let this = self.clone();
        Parser::new(move |input, offset| {
            let (value, rest) = this.run_at(input, offset)?;
            let consumed = input.len() - rest.len();
            f(value).run_at(rest, offset + consumed)
        })
    }

    /// Try this parser; if it fails without having the higher precedence,
    /// fall back to `other`.
    pub fn or(&self, other: Parser<T>) -> Parser<T> {
        let this = self.clone();
        Parser::new(move |input, offset| match this.run_at(input, offset) {
            Ok(result) => Ok(result),
            Err(_) => other.run_at(input, offset),
        })
    }

    pub fn then<U: 'static>(&self, other: Parser<U>) -> Parser<(T, U)> {
        let this = self.clone();
        Parser::new(move |input, offset| {
            let (a, rest) = this.run_at(input, offset)?;
            let consumed = input.len() - rest.len();
            let (b, rest2) = other.run_at(rest, offset + consumed)?;
            Ok(((a, b), rest2))
        })
    }

    /// `self` followed by `other`, keeping only `self`'s value.
    pub fn skip<U: 'static>(&self, other: Parser<U>) -> Parser<T> {
        self.then(other).map(|(a, _)| a)
    }

    pub fn optional(&self) -> Parser<Option<T>> {
        let this = self.clone();
        Parser::new(move |input, offset| match this.run_at(input, offset) {
            Ok((value, rest)) => Ok((Some(value), rest)),
            Err(_) => Ok((None, input)),
        })
    }

    pub fn many0(&self) -> Parser<Vec<T>> {
        let this = self.clone();
        Parser::new(move |input, offset| {
            let mut values = Vec::new();
            let mut rest = input;
            let mut cur_offset = offset;
            loop {
                match this.run_at(rest, cur_offset) {
                    Ok((value, next)) => {
                        if next.len() == rest.len() {
                            // Guard against a zero-width parser looping forever.
                            break;
                        }
                        cur_offset += rest.len() - next.len();
                        rest = next;
                        values.push(value);
                    }
                    Err(_) => break,
                }
            }
            Ok((values, rest))
        })
    }

    pub fn many1(&self) -> Parser<Vec<T>> {
        let this = self.clone();
        let many = self.many0();
        Parser::new(move |input, offset| {
            let (first, rest) = this.run_at(input, offset)?;
            let consumed = input.len() - rest.len();
            let (mut tail, rest2) = many.run_at(rest, offset + consumed)?;
            let mut values = vec![first];
            values.append(&mut tail);
            Ok((values, rest2))
        })
    }

    pub fn sep_by<U: 'static>(&self, separator: Parser<U>) -> Parser<Vec<T>> {
        let this = self.clone();
        let rest_items = separator.skip_first_keep(self.clone()).many0();
        Parser::new(move |input, offset| {
            match this.run_at(input, offset) {
                Err(_) => Ok((Vec::new(), input)),
                Ok((first, rest)) => {
                    let consumed = input.len() - rest.len();
                    let (mut tail, rest2) = rest_items.run_at(rest, offset + consumed)?;
                    let mut values = vec![first];
                    values.append(&mut tail);
                    Ok((values, rest2))
                }
            }
        })
    }

    /// `self` followed by `other`, keeping only `other`'s value. Public:
    /// the keyword/punctuation lexemes in `lexeme.rs` and the grammar
    /// productions in `invgraph-query`/`invgraph-cli` rely on this to chain
    /// past fixed tokens without carrying their `()` value around.
    pub fn skip_first_keep<U: 'static>(&self, other: Parser<U>) -> Parser<U> {
        let this = self.clone();
        Parser::new(move |input, offset| {
            let (_, rest) = this.run_at(input, offset)?;
            let consumed = input.len() - rest.len();
            other.run_at(rest, offset + consumed)
        })
    }
}

/// Matches an exact literal string (case-sensitive).
pub fn literal(lit: &'static str) -> Parser<()> {
    Parser::new(move |input, offset| {
        if input.starts_with(lit) {
            Ok(((), &input[lit.len()..]))
        } else {
            Err(ParseError::new(offset, format!("expected {:?}", lit)))
        }
    })
}

/// Matches any prefix satisfying `pred`, one or more characters.
pub fn take_while1(name: &'static str, pred: fn(char) -> bool) -> Parser<String> {
    Parser::new(move |input, offset| {
        let matched: String = input.chars().take_while(|c| pred(*c)).collect();
        if matched.is_empty() {
            Err(ParseError::new(offset, format!("expected {}", name)))
        } else {
            let rest = &input[matched.len()..];
            Ok((matched, rest))
        }
    })
}

pub fn take_while0(pred: fn(char) -> bool) -> Parser<String> {
    Parser::new(move |input, _offset| {
        let matched: String = input.chars().take_while(|c| pred(*c)).collect();
        let rest = &input[matched.len()..];
        Ok((matched, rest))
    })
}

/// Skips leading ASCII whitespace.
pub fn skip_ws() -> Parser<()> {
    take_while0(|c| c.is_whitespace()).map(|_| ())
}

/// Wraps a parser so it first skips leading whitespace, matching the
/// `lexeme` combinator used throughout `query_parser.py`.
pub fn lexeme<T: 'static>(p: Parser<T>) -> Parser<T> {
    skip_ws().skip_first_keep(p)
}

#[test]
fn literal_matches_and_reports_offset_on_failure() {
    let p = literal("foo");
    assert_eq!(p.parse("foobar").unwrap(), ((), "bar"));
    let err = p.parse("barfoo").unwrap_err();
    assert_eq!(err.offset, 0);
}

#[test]
fn many0_collects_repeated_matches_without_looping_forever() {
    let p = literal("a").many0();
    let (matches, rest) = p.parse("aaab").unwrap();
    assert_eq!(matches.len(), 3);
    assert_eq!(rest, "b");
}

#[test]
fn sep_by_splits_on_separator() {
    let item = take_while1("digits", |c| c.is_ascii_digit());
    let p = item.sep_by(literal(","));
    let (values, rest) = p.parse("1,22,333x").unwrap();
    assert_eq!(values, vec!["1", "22", "333"]);
    assert_eq!(rest, "x");
}

#[test]
fn or_falls_back_to_second_alternative() {
    let p = literal("a").or(literal("b"));
    assert!(p.parse("a").is_ok());
    assert!(p.parse("b").is_ok());
    assert!(p.parse("c").is_err());
}
