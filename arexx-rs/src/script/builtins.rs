//! Built-in pure functions.
//!
//! Each function receives a slice of already-evaluated arguments and returns
//! `Result<Value, ScriptError>`.  Names are matched case-insensitively.  The
//! dispatcher is the last step of the interpreter's function resolution,
//! after user procedures and BBS functions.
//!
//! Positions and lengths follow the script language convention: character
//! positions are 1-based and `0` from a search means "not found".

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use rand::Rng;

use super::error::ScriptError;
use super::value::Value;

/// Longest string (in characters, or bytes for `COPIES`) a built-in will build.
pub const MAX_STRING_LEN: usize = 1 << 24;

/// Dispatch a built-in function call.
///
/// Returns `None` if `name` is not a built-in.
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    // Inner function returns Result<Option<Value>, _>:
    //   Ok(None)    → not a builtin
    //   Ok(Some(v)) → success
    //   Err(e)      → builtin call failed
    fn inner(name: &str, args: &[Value]) -> Result<Option<Value>, ScriptError> {
        Ok(Some(match name {
            // ── Case and length ──────────────────────────────────────────────
            "UPPER" => Value::Str(get_str(args, 0, name)?.to_uppercase()),
            "LOWER" => Value::Str(get_str(args, 0, name)?.to_lowercase()),
            "LENGTH" => Value::from(get_str(args, 0, name)?.chars().count()),

            // ── Substrings ───────────────────────────────────────────────────
            "SUBSTR" => {
                let chars: Vec<char> = get_str(args, 0, name)?.chars().collect();
                let start = get_pos(args, 1, name)?;
                let len = opt_count(args, 2, name)?.map(|n| within_limit(name, n)).transpose()?;
                let pad = opt_pad(args, 3);
                let mut out: String = chars.iter().skip(start - 1).take(len.unwrap_or(usize::MAX)).collect();
                if let Some(n) = len {
                    let have = out.chars().count();
                    out.extend(std::iter::repeat_n(pad, n.saturating_sub(have)));
                }
                Value::Str(out)
            }
            "LEFT" => {
                let s = get_str(args, 0, name)?;
                let n = within_limit(name, get_count(args, 1, name)?)?;
                let mut out: String = s.chars().take(n).collect();
                let have = out.chars().count();
                out.extend(std::iter::repeat_n(opt_pad(args, 2), n - have));
                Value::Str(out)
            }
            "RIGHT" => {
                let chars: Vec<char> = get_str(args, 0, name)?.chars().collect();
                let n = within_limit(name, get_count(args, 1, name)?)?;
                let tail = &chars[chars.len().saturating_sub(n)..];
                let mut out: String = std::iter::repeat_n(opt_pad(args, 2), n - tail.len()).collect();
                out.extend(tail);
                Value::Str(out)
            }
            "STRIP" => {
                let s = get_str(args, 0, name)?;
                let opt = opt_upper(args, 1).unwrap_or_else(|| "B".to_owned());
                let ch = args.get(2).and_then(|v| v.as_str().chars().next());
                let is_strip = |c: char| match ch {
                    Some(x) => c == x,
                    None => c.is_whitespace(),
                };
                Value::Str(match opt.chars().next() {
                    Some('L') => s.trim_start_matches(is_strip).to_owned(),
                    Some('T') => s.trim_end_matches(is_strip).to_owned(),
                    Some('B') => s.trim_matches(is_strip).to_owned(),
                    _ => return Err(ScriptError::bad_arg(name, format!("bad option `{opt}`"))),
                })
            }
            "TRIM" => Value::Str(get_str(args, 0, name)?.trim().to_owned()),
            "REVERSE" => Value::Str(get_str(args, 0, name)?.chars().rev().collect()),
            "COPIES" => {
                let s = get_str(args, 0, name)?;
                let n = get_count(args, 1, name)?;
                within_limit(name, s.len().saturating_mul(n))?;
                Value::Str(s.repeat(n))
            }

            // ── Searching ────────────────────────────────────────────────────
            "POS" => {
                let needle = get_str(args, 0, name)?;
                let hay = get_str(args, 1, name)?;
                let start = if args.len() > 2 { get_pos(args, 2, name)? } else { 1 };
                Value::from(find_from(&hay, &needle, start))
            }
            "INDEX" => {
                let hay = get_str(args, 0, name)?;
                let needle = get_str(args, 1, name)?;
                let start = if args.len() > 2 { get_pos(args, 2, name)? } else { 1 };
                Value::from(find_from(&hay, &needle, start))
            }
            "LASTPOS" => {
                let needle = get_str(args, 0, name)?;
                let hay = get_str(args, 1, name)?;
                Value::from(match hay.rfind(&needle) {
                    Some(b) if !needle.is_empty() => hay[..b].chars().count() + 1,
                    _ => 0,
                })
            }
            "COMPARE" => {
                let a: Vec<char> = get_str(args, 0, name)?.chars().collect();
                let b: Vec<char> = get_str(args, 1, name)?.chars().collect();
                let n = a.len().max(b.len());
                Value::from((0..n).find(|&i| a.get(i) != b.get(i)).map_or(0, |i| i + 1))
            }

            // ── Words ────────────────────────────────────────────────────────
            "WORDS" => Value::from(get_str(args, 0, name)?.split_whitespace().count()),
            "WORD" => {
                let s = get_str(args, 0, name)?;
                let n = get_pos(args, 1, name)?;
                Value::Str(s.split_whitespace().nth(n - 1).unwrap_or("").to_owned())
            }
            "SUBWORD" => {
                let s = get_str(args, 0, name)?;
                let n = get_pos(args, 1, name)?;
                let len = opt_count(args, 2, name)?.unwrap_or(usize::MAX);
                let words: Vec<&str> = s.split_whitespace().skip(n - 1).take(len).collect();
                Value::Str(words.join(" "))
            }

            // ── Type inspection ──────────────────────────────────────────────
            "DATATYPE" => {
                let v = args.first().cloned().unwrap_or_default();
                match opt_upper(args, 1) {
                    None => Value::from(if v.is_numeric() { "NUM" } else { "CHAR" }),
                    Some(t) => Value::Bool(datatype_matches(&v, &t)),
                }
            }

            // ── Base conversion ──────────────────────────────────────────────
            "D2X" => Value::Str(format!("{:X}", get_whole(args, 0, name)?)),
            "X2D" => Value::from(from_radix(&get_str(args, 0, name)?, 16, name)?),
            "D2B" => Value::Str(format!("{:b}", get_whole(args, 0, name)?)),
            "B2D" => Value::from(from_radix(&get_str(args, 0, name)?, 2, name)?),
            "D2C" => {
                let n = get_whole(args, 0, name)?;
                let c = u32::try_from(n)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ScriptError::bad_arg(name, format!("{n} is not a character code")))?;
                Value::Str(c.to_string())
            }
            "C2D" => {
                let s = get_str(args, 0, name)?;
                Value::from(s.chars().next().map_or(0, |c| c as i64))
            }

            // ── Arithmetic ───────────────────────────────────────────────────
            "ABS" => Value::Num(get_num(args, 0, name)?.abs()),
            "SIGN" => {
                let x = get_num(args, 0, name)?;
                Value::Num(if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 })
            }
            "TRUNC" => {
                let x = get_num(args, 0, name)?;
                // f64 carries no more than 17 significant decimal digits.
                let digits = opt_count(args, 1, name)?.unwrap_or(0).min(17) as i32;
                let scale = 10f64.powi(digits);
                let scaled = x * scale;
                Value::Num(if scaled.is_finite() { scaled.trunc() / scale } else { x })
            }
            "MIN" | "MAX" => {
                if args.is_empty() {
                    return Err(ScriptError::bad_arg(name, "at least one argument required"));
                }
                let mut best = get_num(args, 0, name)?;
                for i in 1..args.len() {
                    let x = get_num(args, i, name)?;
                    if (name == "MIN" && x < best) || (name == "MAX" && x > best) {
                        best = x;
                    }
                }
                Value::Num(best)
            }
            "RANDOM" => {
                let (lo, hi) = match args.len() {
                    0 => (0, 999),
                    1 => (0, get_whole(args, 0, name)?),
                    _ => (get_whole(args, 0, name)?, get_whole(args, 1, name)?),
                };
                if hi < lo {
                    return Err(ScriptError::bad_arg(name, format!("max {hi} is below min {lo}")));
                }
                Value::from(rand::thread_rng().gen_range(lo..=hi))
            }

            // ── Clock ────────────────────────────────────────────────────────
            "TIME" => time_fn(opt_upper(args, 0).as_deref(), Local::now().naive_local())?,
            "DATE" => date_fn(opt_upper(args, 0).as_deref(), Local::now().naive_local())?,

            _ => return Ok(None),
        }))
    }
    let upper = name.to_ascii_uppercase();
    inner(&upper, args).transpose()
}

/// Names of every built-in, for diagnostics and tests.
pub const BUILTIN_NAMES: &[&str] = &[
    "UPPER", "LOWER", "LENGTH", "SUBSTR", "LEFT", "RIGHT", "STRIP", "TRIM", "REVERSE",
    "COPIES", "POS", "INDEX", "LASTPOS", "COMPARE", "WORDS", "WORD", "SUBWORD", "DATATYPE",
    "D2X", "X2D", "D2B", "B2D", "D2C", "C2D", "ABS", "SIGN", "TRUNC", "MIN", "MAX", "RANDOM",
    "TIME", "DATE",
];

// ── Clock helpers ─────────────────────────────────────────────────────────────

/// `TIME([option])` against a fixed clock reading.
fn time_fn(opt: Option<&str>, now: NaiveDateTime) -> Result<Value, ScriptError> {
    Ok(match opt.and_then(|o| o.chars().next()) {
        None | Some('N') => Value::Str(now.format("%H:%M:%S").to_string()),
        Some('H') => Value::from(now.hour() as i64),
        Some('M') => Value::from(now.minute() as i64),
        Some('S') => Value::from(now.second() as i64),
        Some('C') => Value::Str(now.format("%-I:%M%P").to_string()),
        Some(_) => {
            return Err(ScriptError::bad_arg("TIME", format!("bad option `{}`", opt.unwrap_or(""))))
        }
    })
}

/// `DATE([option])` against a fixed clock reading.
fn date_fn(opt: Option<&str>, now: NaiveDateTime) -> Result<Value, ScriptError> {
    Ok(match opt.and_then(|o| o.chars().next()) {
        None | Some('N') => Value::Str(now.format("%-d %b %Y").to_string()),
        Some('S') => Value::Str(now.format("%Y%m%d").to_string()),
        Some('U') => Value::Str(now.format("%m/%d/%y").to_string()),
        Some('E') => Value::Str(now.format("%d/%m/%y").to_string()),
        Some('Y') => Value::from(now.year() as i64),
        Some('M') => Value::Str(now.format("%B").to_string()),
        Some('W') => Value::Str(now.format("%A").to_string()),
        Some('D') => Value::from(now.ordinal() as i64),
        Some(_) => {
            return Err(ScriptError::bad_arg("DATE", format!("bad option `{}`", opt.unwrap_or(""))))
        }
    })
}

// ── Misc helpers ──────────────────────────────────────────────────────────────

/// 1-based character position of `needle` in `hay` at or after `start`.
fn find_from(hay: &str, needle: &str, start: usize) -> usize {
    let skip: usize = hay.chars().take(start - 1).map(char::len_utf8).sum();
    if needle.is_empty() || skip > hay.len() {
        return 0;
    }
    match hay[skip..].find(needle) {
        Some(b) => hay[..skip + b].chars().count() + 1,
        None => 0,
    }
}

fn from_radix(s: &str, radix: u32, name: &str) -> Result<i64, ScriptError> {
    i64::from_str_radix(s.trim(), radix)
        .map_err(|_| ScriptError::bad_arg(name, format!("`{s}` is not valid base-{radix}")))
}

fn datatype_matches(v: &Value, t: &str) -> bool {
    let s = v.as_str();
    match t.chars().next() {
        Some('N') => v.is_numeric(),
        Some('W') => v.is_numeric() && v.as_number().fract() == 0.0,
        Some('A') => !s.is_empty() && s.chars().all(char::is_alphanumeric),
        Some('M') => !s.is_empty() && s.chars().all(char::is_alphabetic),
        Some('U') => !s.is_empty() && s.chars().all(|c| c.is_alphabetic() && c.is_uppercase()),
        Some('L') => !s.is_empty() && s.chars().all(|c| c.is_alphabetic() && c.is_lowercase()),
        Some('X') => !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit()),
        Some('B') => !s.is_empty() && s.chars().all(|c| c == '0' || c == '1'),
        _ => false,
    }
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn missing(name: &str, idx: usize) -> ScriptError {
    ScriptError::bad_arg(name, format!("argument {} missing", idx + 1))
}

fn get_str(args: &[Value], idx: usize, name: &str) -> Result<String, ScriptError> {
    args.get(idx).map(Value::as_str).ok_or_else(|| missing(name, idx))
}

fn get_num(args: &[Value], idx: usize, name: &str) -> Result<f64, ScriptError> {
    let v = args.get(idx).ok_or_else(|| missing(name, idx))?;
    let x = v.as_number();
    if !x.is_finite() {
        return Err(ScriptError::bad_arg(name, format!("`{v}` is not a number")));
    }
    Ok(x)
}

fn get_whole(args: &[Value], idx: usize, name: &str) -> Result<i64, ScriptError> {
    Ok(get_num(args, idx, name)?.trunc() as i64)
}

/// A non-negative count (length, repeat count).
fn get_count(args: &[Value], idx: usize, name: &str) -> Result<usize, ScriptError> {
    let n = get_whole(args, idx, name)?;
    usize::try_from(n).map_err(|_| ScriptError::bad_arg(name, format!("{n} is negative")))
}

fn within_limit(name: &str, n: usize) -> Result<usize, ScriptError> {
    if n > MAX_STRING_LEN {
        Err(ScriptError::bad_arg(name, format!("result length {n} exceeds {MAX_STRING_LEN}")))
    } else {
        Ok(n)
    }
}

/// A 1-based position (must be at least 1).
fn get_pos(args: &[Value], idx: usize, name: &str) -> Result<usize, ScriptError> {
    match get_count(args, idx, name)? {
        0 => Err(ScriptError::bad_arg(name, "position must be at least 1")),
        n => Ok(n),
    }
}

fn opt_count(args: &[Value], idx: usize, name: &str) -> Result<Option<usize>, ScriptError> {
    if idx < args.len() {
        get_count(args, idx, name).map(Some)
    } else {
        Ok(None)
    }
}

fn opt_pad(args: &[Value], idx: usize) -> char {
    args.get(idx)
        .and_then(|v| v.as_str().chars().next())
        .unwrap_or(' ')
}

fn opt_upper(args: &[Value], idx: usize) -> Option<String> {
    args.get(idx)
        .map(|v| v.as_str().trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
