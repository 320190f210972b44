//! `@NAME@` placeholder substitution, ported in semantics from
//! `CLI.replacements`/`CLI.replace_placeholder` in
//! `original_source/ckcore/core/cli/cli.py`. Substitution is suppressed
//! when the first command of the first pipeline is `add_job`, so the job
//! definition itself receives raw placeholders to re-evaluate later.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::grammar::ParsedCommandLine;

const RECOGNIZED: &[&str] = &[
    "UTC", "NOW", "TODAY", "TOMORROW", "YESTERDAY", "YEAR", "MONTH", "DAY", "TIME", "HOUR", "MINUTE", "SECOND",
    "TZ_OFFSET", "TZ", "MONDAY", "TUESDAY", "WEDNESDAY", "THURSDAY", "FRIDAY", "SATURDAY", "SUNDAY",
];

fn weekday_offset(now: DateTime<Utc>, target: chrono::Weekday) -> DateTime<Utc> {
    let current = now.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut delta = wanted - current;
    if delta < 0 {
        delta += 7;
    }
    now + chrono::Duration::days(delta)
}

fn value_for(name: &str, now: DateTime<Utc>) -> Option<String> {
    use chrono::Weekday::*;
    Some(match name {
        "UTC" => "UTC".to_owned(),
        "NOW" => now.to_rfc3339(),
        "TODAY" => now.format("%Y-%m-%d").to_string(),
        "TOMORROW" => (now + chrono::Duration::days(1)).format("%Y-%m-%d").to_string(),
        "YESTERDAY" => (now - chrono::Duration::days(1)).format("%Y-%m-%d").to_string(),
        "YEAR" => now.year().to_string(),
        "MONTH" => format!("{:02}", now.month()),
        "DAY" => format!("{:02}", now.day()),
        "TIME" => now.format("%H:%M:%S").to_string(),
        "HOUR" => format!("{:02}", now.hour()),
        "MINUTE" => format!("{:02}", now.minute()),
        "SECOND" => format!("{:02}", now.second()),
        "TZ_OFFSET" => "+00:00".to_owned(),
        "TZ" => "UTC".to_owned(),
        "MONDAY" => weekday_offset(now, Mon).format("%Y-%m-%d").to_string(),
        "TUESDAY" => weekday_offset(now, Tue).format("%Y-%m-%d").to_string(),
        "WEDNESDAY" => weekday_offset(now, Wed).format("%Y-%m-%d").to_string(),
        "THURSDAY" => weekday_offset(now, Thu).format("%Y-%m-%d").to_string(),
        "FRIDAY" => weekday_offset(now, Fri).format("%Y-%m-%d").to_string(),
        "SATURDAY" => weekday_offset(now, Sat).format("%Y-%m-%d").to_string(),
        "SUNDAY" => weekday_offset(now, Sun).format("%Y-%m-%d").to_string(),
        _ => return None,
    })
}

/// Replace every recognized `@NAME@` token in `input`.
pub fn substitute(input: &str, now: DateTime<Utc>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('@') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        if let Some(end) = after.find('@') {
            let candidate = &after[..end];
            if RECOGNIZED.contains(&candidate) {
                out.push_str(&value_for(candidate, now).unwrap_or_default());
                rest = &after[end + 1..];
                continue;
            }
        }
        out.push('@');
        rest = after;
    }
    out.push_str(rest);
    out
}

/// `true` when the first command of the first pipeline is `add_job`: raw
/// placeholders must reach the job definition unsubstituted.
pub fn is_add_job_first(parsed: &ParsedCommandLine) -> bool {
    parsed
        .pipelines
        .first()
        .and_then(|p| p.commands.first())
        .map(|c| c.name == "add_job")
        .unwrap_or(false)
}

/// Substitute placeholders in a raw command line unless it starts with
/// `add_job`.
pub fn substitute_unless_add_job(input: &str, now: DateTime<Utc>) -> String {
    let parsed = crate::grammar::parse_command_line(input);
    if is_add_job_first(&parsed) {
        input.to_owned()
    } else {
        substitute(input, now)
    }
}

#[test]
fn substitutes_recognized_placeholders() {
    let now = DateTime::parse_from_rfc3339("2021-06-15T10:30:00Z").unwrap().with_timezone(&Utc);
    let out = substitute("year is @YEAR@ and month @MONTH@", now);
    assert_eq!(out, "year is 2021 and month 06");
}

#[test]
fn leaves_unknown_at_tokens_untouched() {
    let now = Utc::now();
    let out = substitute("user@EXAMPLE@ stays", now);
    assert_eq!(out, "user@EXAMPLE@ stays");
}

#[test]
fn suppresses_substitution_when_add_job_is_first() {
    let now = DateTime::parse_from_rfc3339("2021-06-15T10:30:00Z").unwrap().with_timezone(&Utc);
    let line = "add_job daily: echo @TODAY@";
    let out = substitute_unless_add_job(line, now);
    assert_eq!(out, line);
}
