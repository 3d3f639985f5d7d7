//! PARSE template engine.
//!
//! A template is split on whitespace into tokens:
//!
//! | Token | Effect |
//! |-------|--------|
//! | `n` / `=n` | move the cursor to absolute (1-based) column `n` |
//! | `+n` / `-n` | move the cursor relative to where it is |
//! | `'lit'` / `"lit"` | move the cursor past the next occurrence of `lit` |
//! | `name` | bind a piece of the source to `name` |
//! | `.` | like `name`, but the piece is discarded |
//!
//! A name followed by a positional or literal token takes the text from the
//! cursor up to that position.  A name followed by another name (or by the
//! end of the template) takes only the next whitespace-delimited word, so a
//! trailing name does *not* absorb the rest of the line.

use super::eval::{is_name, string_literal};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Abs(usize),
    Rel(i64),
    Literal(String),
    Target(Option<String>),
}

fn tokenize(template: &str) -> Result<Vec<Token>, String> {
    template
        .split_whitespace()
        .map(|t| {
            let digits = t.strip_prefix('=').unwrap_or(t);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                let n: usize = digits.parse().map_err(|_| format!("bad column `{t}`"))?;
                return Ok(Token::Abs(n));
            }
            if let Some(rest) = t.strip_prefix('+').or_else(|| t.strip_prefix('-')) {
                if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                    let n: i64 = t.parse().map_err(|_| format!("bad offset `{t}`"))?;
                    return Ok(Token::Rel(n));
                }
            }
            if let Some(lit) = string_literal(t) {
                return Ok(Token::Literal(lit));
            }
            if t == "." {
                return Ok(Token::Target(None));
            }
            if is_name(t) {
                return Ok(Token::Target(Some(t.to_ascii_uppercase())));
            }
            Err(format!("bad PARSE template token `{t}`"))
        })
        .collect()
}

/// Character index of `lit` in `chars` at or after `from`.
fn find_literal(chars: &[char], lit: &[char], from: usize) -> Option<usize> {
    if lit.is_empty() || from > chars.len() {
        return None;
    }
    chars[from..]
        .windows(lit.len())
        .position(|w| w == lit)
        .map(|i| from + i)
}

fn slice(chars: &[char], start: usize, end: usize) -> String {
    let end = end.min(chars.len());
    if start >= end {
        String::new()
    } else {
        chars[start..end].iter().collect()
    }
}

/// Move a cursor by a relative offset, clamping at both ends.
fn shift(pos: usize, d: i64) -> usize {
    let n = usize::try_from(d.unsigned_abs()).unwrap_or(usize::MAX);
    if d < 0 {
        pos.saturating_sub(n)
    } else {
        pos.saturating_add(n)
    }
}

/// Apply `template` to `source`, returning `(NAME, value)` bindings in
/// template order.  Names are uppercased; `.` placeholders are omitted.
pub fn parse_template(source: &str, template: &str) -> Result<Vec<(String, String)>, String> {
    let tokens = tokenize(template)?;
    let chars: Vec<char> = source.chars().collect();
    let mut bindings = Vec::new();
    let mut pos = 0usize;

    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::Abs(n) => pos = n.saturating_sub(1),
            Token::Rel(d) => pos = shift(pos, *d),
            Token::Literal(lit) => {
                let lit: Vec<char> = lit.chars().collect();
                pos = match find_literal(&chars, &lit, pos) {
                    Some(at) => at + lit.len(),
                    None => chars.len(),
                };
            }
            Token::Target(name) => {
                let value = match tokens.get(i + 1) {
                    Some(Token::Abs(n)) => slice(&chars, pos, n.saturating_sub(1)),
                    Some(Token::Rel(d)) => slice(&chars, pos, shift(pos, *d)),
                    Some(Token::Literal(lit)) => {
                        let lit: Vec<char> = lit.chars().collect();
                        let end = find_literal(&chars, &lit, pos).unwrap_or(chars.len());
                        slice(&chars, pos, end)
                    }
                    Some(Token::Target(_)) | None => {
                        let start = (pos..chars.len())
                            .find(|&j| !chars[j].is_whitespace())
                            .unwrap_or(chars.len());
                        let end = (start..chars.len())
                            .find(|&j| chars[j].is_whitespace())
                            .unwrap_or(chars.len());
                        pos = end;
                        slice(&chars, start, end)
                    }
                };
                if let Some(name) = name {
                    bindings.push((name.clone(), value));
                }
            }
        }
    }

    Ok(bindings)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
