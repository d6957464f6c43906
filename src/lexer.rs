//! Pattern lexer.
//!
//! Turns a command pattern string such as `"VOLT %.3f"` into a flat sequence
//! of [`Item`]s. The lexer is the single source of the matching grammar: the
//! matcher walks the same items to classify inbound tokens and the output
//! constructor walks them to render replies. It is deterministic and total
//! on well-formed patterns; a `%` that does not begin a recognised specifier
//! simply joins the surrounding literal.

use crate::format::FormatSpec;

/// One lexical element of a pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Verbatim bytes that must appear in the token.
    Literal(String),
    /// A whitespace run; matching is lenient about the exact bytes.
    Whitespace(String),
    /// Numeric placeholder with its printf specifier.
    NumberPlaceholder(FormatSpec),
    /// String placeholder (`%s` family).
    StringPlaceholder(FormatSpec),
}

/// Tokenise `pattern`. Precedence at each position: whitespace run, numeric
/// specifier, `%s`, literal run.
pub fn lex(pattern: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut literal = String::new();
    let bytes = pattern.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let Some(c) = pattern[i..].chars().next() else {
            break;
        };
        if c.is_ascii_whitespace() {
            flush_literal(&mut items, &mut literal);
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            items.push(Item::Whitespace(pattern[start..i].to_string()));
        } else if c == '%' {
            if let Some((spec, consumed)) = FormatSpec::parse(&pattern[i..]) {
                flush_literal(&mut items, &mut literal);
                if spec.is_string() {
                    items.push(Item::StringPlaceholder(spec));
                } else {
                    items.push(Item::NumberPlaceholder(spec));
                }
                i += consumed;
            } else {
                literal.push('%');
                i += 1;
            }
        } else {
            literal.push(c);
            i += c.len_utf8();
        }
    }
    flush_literal(&mut items, &mut literal);
    items
}

fn flush_literal(items: &mut Vec<Item>, literal: &mut String) {
    if !literal.is_empty() {
        items.push(Item::Literal(std::mem::take(literal)));
    }
}
