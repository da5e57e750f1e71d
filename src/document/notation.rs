use crate::errors::OpError;
use bson::oid::ObjectId;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::iter::Peekable;
use std::str::Chars;

/// Rewrite relaxed shell notation into strict JSON.
///
/// Bare identifier keys are quoted and single-quoted strings become
/// double-quoted. The shell helpers `ObjectId(..)`, `new Date(..)`,
/// `ISODate(..)`, `NumberLong(..)` and `NumberInt(..)` become extended JSON,
/// as do `/pattern/flags` literals in value position. Everything else is
/// copied through unchanged, so strict JSON passes untouched.
///
/// # Errors
/// Returns `OpError::Parse` on an unterminated string or regex literal and on
/// a helper call with a malformed argument.
pub fn normalize_relaxed(input: &str) -> Result<String, OpError> {
    let mut out = String::with_capacity(input.len() + 16);
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => copy_double_quoted(&mut chars, &mut out)?,
            '\'' => convert_single_quoted(&mut chars, &mut out)?,
            '/' if in_value_position(&out) => convert_regex(&mut chars, &mut out)?,
            c if is_ident_start(c) => {
                let ident = read_ident(c, &mut chars);
                if ident == "new" && let Some(helper) = helper_after_new(&mut chars) {
                    write_helper(&helper, &mut chars, &mut out)?;
                } else if is_helper(&ident) && next_non_ws_is(&chars, '(') {
                    write_helper(&ident, &mut chars, &mut out)?;
                } else if next_non_ws_is(&chars, ':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
}

fn read_ident(first: char, chars: &mut Peekable<Chars<'_>>) -> String {
    let mut ident = String::from(first);
    while let Some(&n) = chars.peek() {
        if !is_ident_part(n) {
            break;
        }
        ident.push(n);
        chars.next();
    }
    ident
}

fn next_non_ws_is(chars: &Peekable<Chars<'_>>, wanted: char) -> bool {
    chars.clone().find(|c| !c.is_whitespace()) == Some(wanted)
}

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

/// A regex literal can only start where a value is expected.
fn in_value_position(out: &str) -> bool {
    matches!(out.trim_end().chars().last(), Some(':' | '[' | ','))
}

fn is_helper(name: &str) -> bool {
    matches!(name, "ObjectId" | "ISODate" | "NumberLong" | "NumberInt")
}

/// `new Date(..)`: consumes the constructor name when it follows `new`.
fn helper_after_new(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut ahead = chars.clone();
    skip_ws(&mut ahead);
    let first = ahead.next().filter(|c| is_ident_start(*c))?;
    let name = read_ident(first, &mut ahead);
    if name == "Date" && next_non_ws_is(&ahead, '(') {
        *chars = ahead;
        Some(name)
    } else {
        None
    }
}

enum CallArg {
    Text(String),
    Number(String),
}

impl CallArg {
    fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Number(s) => s,
        }
    }
}

fn read_call_arg(chars: &mut Peekable<Chars<'_>>) -> Result<Option<CallArg>, OpError> {
    skip_ws(chars);
    if chars.next() != Some('(') {
        return Err(OpError::Parse("expected '(' after shell helper".into()));
    }
    skip_ws(chars);
    let arg = match chars.peek().copied() {
        Some(')') => None,
        Some(q @ ('"' | '\'')) => {
            chars.next();
            Some(CallArg::Text(read_quoted(chars, q)?))
        }
        Some(_) => {
            let mut n = String::new();
            while let Some(&c) = chars.peek() {
                if !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')) {
                    break;
                }
                n.push(c);
                chars.next();
            }
            if n.is_empty() {
                return Err(OpError::Parse("shell helper argument must be a string or number".into()));
            }
            Some(CallArg::Number(n))
        }
        None => return Err(OpError::Parse("unterminated shell helper call".into())),
    };
    skip_ws(chars);
    match chars.next() {
        Some(')') => Ok(arg),
        _ => Err(OpError::Parse("expected ')' to close shell helper".into())),
    }
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, OpError> {
    let mut s = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(esc) => s.push(esc),
                None => break,
            },
            c if c == quote => return Ok(s),
            other => s.push(other),
        }
    }
    Err(OpError::Parse("unterminated string literal".into()))
}

fn write_helper(
    name: &str,
    chars: &mut Peekable<Chars<'_>>,
    out: &mut String,
) -> Result<(), OpError> {
    let arg = read_call_arg(chars)?;
    match name {
        "ObjectId" => {
            let oid = match &arg {
                Some(CallArg::Text(hex)) => ObjectId::parse_str(hex)
                    .map_err(|e| OpError::Parse(format!("invalid ObjectId '{hex}': {e}")))?,
                Some(CallArg::Number(_)) => {
                    return Err(OpError::Parse("ObjectId needs a hex string".into()));
                }
                None => ObjectId::new(),
            };
            out.push_str(&format!(r#"{{"$oid":"{}"}}"#, oid.to_hex()));
        }
        "Date" | "ISODate" => {
            let millis = match &arg {
                Some(CallArg::Text(s)) => date_millis(s)?,
                Some(CallArg::Number(n)) => n
                    .parse::<i64>()
                    .map_err(|_| OpError::Parse(format!("invalid date milliseconds '{n}'")))?,
                None => Utc::now().timestamp_millis(),
            };
            out.push_str(&format!(r#"{{"$date":{{"$numberLong":"{millis}"}}}}"#));
        }
        "NumberLong" => {
            let raw = arg.as_ref().map_or("0", CallArg::as_str);
            let n = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| OpError::Parse(format!("invalid NumberLong '{raw}'")))?;
            out.push_str(&format!(r#"{{"$numberLong":"{n}"}}"#));
        }
        _ => {
            let raw = arg.as_ref().map_or("0", CallArg::as_str);
            let n = raw
                .trim()
                .parse::<i32>()
                .map_err(|_| OpError::Parse(format!("invalid NumberInt '{raw}'")))?;
            out.push_str(&n.to_string());
        }
    }
    Ok(())
}

/// Dates without an offset are UTC; a bare day is midnight UTC.
fn date_millis(s: &str) -> Result<i64, OpError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| OpError::Parse(format!("invalid date '{s}'")))
}

fn convert_regex(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> Result<(), OpError> {
    let mut pattern = String::new();
    let mut in_class = false;
    loop {
        match chars.next() {
            Some('\\') => {
                pattern.push('\\');
                match chars.next() {
                    Some(esc) => pattern.push(esc),
                    None => return Err(OpError::Parse("unterminated regex literal".into())),
                }
            }
            Some('/') if !in_class => break,
            Some(c) => {
                match c {
                    '[' => in_class = true,
                    ']' => in_class = false,
                    _ => {}
                }
                pattern.push(c);
            }
            None => return Err(OpError::Parse("unterminated regex literal".into())),
        }
    }
    let mut flags: Vec<char> = Vec::new();
    while let Some(&f) = chars.peek() {
        if !f.is_ascii_alphabetic() {
            break;
        }
        if !matches!(f, 'i' | 'm' | 's' | 'x' | 'u') {
            return Err(OpError::Parse(format!("unsupported regex flag '{f}'")));
        }
        flags.push(f);
        chars.next();
    }
    flags.sort_unstable();
    flags.dedup();
    let options: String = flags.into_iter().collect();
    out.push_str(&format!(
        r#"{{"$regularExpression":{{"pattern":{},"options":"{options}"}}}}"#,
        serde_json::to_string(&pattern)?
    ));
    Ok(())
}

fn copy_double_quoted(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> Result<(), OpError> {
    out.push('"');
    while let Some(c) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some(esc) = chars.next() {
                    out.push(esc);
                }
            }
            '"' => return Ok(()),
            _ => {}
        }
    }
    Err(OpError::Parse("unterminated string literal".into()))
}

fn convert_single_quoted(
    chars: &mut Peekable<Chars<'_>>,
    out: &mut String,
) -> Result<(), OpError> {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(esc) => {
                    out.push('\\');
                    out.push(esc);
                }
                None => break,
            },
            '"' => out.push_str("\\\""),
            '\'' => {
                out.push('"');
                return Ok(());
            }
            other => out.push(other),
        }
    }
    Err(OpError::Parse("unterminated string literal".into()))
}
