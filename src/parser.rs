//! Token matcher.
//!
//! A [`CommandParser`] holds the compiled command patterns of a device and
//! classifies each framed inbound token as one of them, extracting the typed
//! value carried by a set command. Patterns are tried in the order they were
//! compiled (the device puts every request pattern before every set pattern);
//! the first pattern that matches the token end-to-end wins and a token that
//! matches none is a mismatch, signalled as `None`.

use crate::format::FormatSpec;
use crate::lexer::Item;
use crate::parameter::{ParamKind, Value};

/// Whether a pattern queries or assigns its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Req,
    Set,
}

/// A compiled pattern: lexed items, kind, and the owning parameter together
/// with its kind so extracted text converts without a store lookup.
#[derive(Debug, Clone)]
pub struct CommandPattern {
    pub items: Vec<Item>,
    pub kind: CommandKind,
    pub param: String,
    pub param_kind: ParamKind,
}

/// A classified token.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub param: String,
    /// Extracted placeholder value; present on set commands only.
    pub value: Option<Value>,
}

pub struct CommandParser {
    patterns: Vec<CommandPattern>,
}

impl CommandParser {
    pub fn new(patterns: Vec<CommandPattern>) -> Self {
        Self { patterns }
    }

    /// Match `token` against the patterns in order. `None` means no pattern
    /// matched end-to-end: the mismatch signal.
    pub fn parse(&self, token: &str) -> Option<Command> {
        for pattern in &self.patterns {
            if let Some(extracted) = match_pattern(pattern, token) {
                let value = match pattern.kind {
                    CommandKind::Set => extracted,
                    CommandKind::Req => None,
                };
                return Some(Command {
                    kind: pattern.kind,
                    param: pattern.param.clone(),
                    value,
                });
            }
        }
        None
    }
}

/// Walk the items over `token` with a single cursor. Returns the extracted
/// placeholder value on a full-token match, `None` on any miss. A conversion
/// failure inside a numeric placeholder is a miss like any other, so the
/// caller falls through to the next candidate.
fn match_pattern(pattern: &CommandPattern, token: &str) -> Option<Option<Value>> {
    let mut cursor = 0;
    let mut extracted = None;

    for (idx, item) in pattern.items.iter().enumerate() {
        match item {
            Item::Literal(lit) => {
                if !token[cursor..].starts_with(lit.as_str()) {
                    return None;
                }
                cursor += lit.len();
            }
            Item::Whitespace(_) => {
                let run = token[cursor..]
                    .bytes()
                    .take_while(u8::is_ascii_whitespace)
                    .count();
                if run == 0 {
                    return None;
                }
                cursor += run;
            }
            Item::NumberPlaceholder(spec) => {
                let len = spec.scan(&token[cursor..])?;
                let text = &token[cursor..cursor + len];
                extracted = Some(convert_number(spec, text, pattern.param_kind)?);
                cursor += len;
            }
            Item::StringPlaceholder(_) => {
                let end = string_capture_end(&pattern.items[idx + 1..], token, cursor);
                if end == cursor {
                    return None;
                }
                extracted = Some(Value::String(token[cursor..end].to_string()));
                cursor = end;
            }
        }
    }

    if cursor == token.len() {
        Some(extracted)
    } else {
        None
    }
}

/// A string placeholder consumes up to the start of the next literal or
/// whitespace item, or to end-of-token when it is the final item.
fn string_capture_end(rest: &[Item], token: &str, cursor: usize) -> usize {
    match rest.first() {
        Some(Item::Literal(lit)) => token[cursor..]
            .find(lit.as_str())
            .map(|off| cursor + off)
            .unwrap_or(token.len()),
        Some(Item::Whitespace(_)) => token[cursor..]
            .bytes()
            .position(|b| b.is_ascii_whitespace())
            .map(|off| cursor + off)
            .unwrap_or(token.len()),
        _ => token.len(),
    }
}

/// Convert extracted numeric text to the owning parameter's kind, honouring
/// the specifier's radix. `None` when the text does not fit the kind.
fn convert_number(spec: &FormatSpec, text: &str, kind: ParamKind) -> Option<Value> {
    let radix = spec.radix();
    match kind {
        ParamKind::Int => parse_int(text, radix).map(Value::Int),
        ParamKind::Int64 => parse_int(text, radix).map(Value::Int64),
        ParamKind::Int32 => parse_int(text, radix)
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int32),
        ParamKind::Float32 => parse_float(spec, text, radix).map(|v| Value::Float32(v as f32)),
        ParamKind::Float64 => parse_float(spec, text, radix).map(Value::Float64),
        ParamKind::Bool | ParamKind::String => None,
    }
}

fn parse_int(text: &str, radix: u32) -> Option<i64> {
    if radix == 10 {
        text.parse().ok()
    } else {
        i64::from_str_radix(text, radix).ok()
    }
}

fn parse_float(spec: &FormatSpec, text: &str, radix: u32) -> Option<f64> {
    if spec.is_float_class() {
        text.parse().ok()
    } else {
        parse_int(text, radix).map(|v| v as f64)
    }
}
