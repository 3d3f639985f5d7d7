//! Script preprocessor and label indexer.
//!
//! Raw script text becomes an ordered list of logical lines with comments and
//! blank lines removed, plus a table mapping every label to its position in
//! that list.  Labels stay in the list as zero-width markers so that SIGNAL
//! targets keep stable indices.
//!
//! The block helpers at the bottom (`opens_block`, [`Program::matching_end`])
//! implement the depth-counted forward scan shared by DO, SELECT, PROCEDURE
//! and the block forms of IF/WHEN/ELSE/OTHERWISE.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::error::ScriptError;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*:$").expect("static regex"));

static THEN_DO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\sTHEN\s+DO$").expect("static regex"));

/// One logical script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number in the original source (for error messages).
    pub number: usize,
    /// Trimmed text with any inline `//` comment removed.
    pub text: String,
}

/// A preprocessed script: filtered lines plus the label table.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub lines: Vec<Line>,
    /// Uppercase label name → index into `lines`.
    pub labels: HashMap<String, usize>,
}

/// Preprocess `src` into a [`Program`].
///
/// - `//` starts a comment that runs to end of line (outside quotes).
/// - A line beginning with `/*` is a comment; if it does not also contain
///   `*/` every following line up to and including the one that does is
///   skipped too.
/// - `NAME:` on a line of its own is a label.  When a label name repeats,
///   the first occurrence wins.
pub fn preprocess(src: &str) -> Program {
    let mut program = Program::default();
    let mut in_block_comment = false;

    for (i, raw) in src.lines().enumerate() {
        if in_block_comment {
            if raw.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }

        let trimmed = raw.trim();
        if let Some(rest) = trimmed.strip_prefix("/*") {
            if !rest.contains("*/") {
                in_block_comment = true;
            }
            continue;
        }

        let text = strip_line_comment(trimmed).trim();
        if text.is_empty() {
            continue;
        }

        if let Some(name) = label_name(text) {
            program
                .labels
                .entry(name.to_ascii_uppercase())
                .or_insert(program.lines.len());
        }
        program.lines.push(Line { number: i + 1, text: text.to_owned() });
    }

    program
}

/// Return the label name if `text` is a label line (`NAME:`).
pub fn label_name(text: &str) -> Option<&str> {
    LABEL_RE
        .is_match(text)
        .then(|| &text[..text.len() - 1])
}

/// Cut `line` at the first `//` that is not inside a quoted string.
fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_slash = false;
    for (i, ch) in line.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '/' && prev_slash => return &line[..i - 1],
            None => {}
        }
        prev_slash = quote.is_none() && ch == '/';
    }
    line
}

/// Uppercased first whitespace-delimited word of `text`.
pub fn keyword(text: &str) -> String {
    text.split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

/// Text following the first word, trimmed.
pub fn after_keyword(text: &str) -> &str {
    let t = text.trim_start();
    match t.find(char::is_whitespace) {
        Some(i) => t[i..].trim(),
        None => "",
    }
}

/// `true` if `text` opens a block closed by a matching `END`.
pub fn opens_block(text: &str) -> bool {
    match keyword(text).as_str() {
        "DO" | "SELECT" | "PROCEDURE" => true,
        "IF" | "WHEN" => THEN_DO_RE.is_match(text),
        "ELSE" | "OTHERWISE" => after_keyword(text).eq_ignore_ascii_case("DO"),
        _ => false,
    }
}

/// `true` if `text` is an `END` line.
pub fn is_end(text: &str) -> bool {
    keyword(text) == "END"
}

impl Program {
    /// Index of the `END` matching the block opened at `open`.
    pub fn matching_end(&self, open: usize) -> Result<usize, ScriptError> {
        let mut depth = 1usize;
        for (i, line) in self.lines.iter().enumerate().skip(open + 1) {
            if opens_block(&line.text) {
                depth += 1;
            } else if is_end(&line.text) {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
        }
        Err(ScriptError::syntax(
            self.line_number(open),
            format!("no END for `{}`", self.lines[open].text),
        ))
    }

    /// Source line number for a line index (0 when out of range).
    pub fn line_number(&self, idx: usize) -> usize {
        self.lines.get(idx).map(|l| l.number).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
