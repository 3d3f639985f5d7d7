//! Runtime value type for the script language.
//!
//! Scripts are dynamically typed: a value is a string, a number or a boolean,
//! and every boundary that needs a particular shape (SAY output, numeric
//! comparison, concatenation) coerces explicitly through the helpers below.

use std::fmt;

/// A script runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Num(x) => {
                // Whole numbers print without a fractional part.
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{}", *x as i64)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Bool(b) => write!(f, "{}", if *b { "1" } else { "0" }),
        }
    }
}

impl Value {
    /// Truthiness used by operator-free conditions: empty strings, zero and
    /// NaN are false, everything else is true.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Num(x) => *x != 0.0 && !x.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    /// Numeric coercion.  Blank strings become `0`; anything that does not
    /// parse becomes NaN so that ordering comparisons against it are false.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Num(x) => *x,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Integer view of [`as_number`](Self::as_number), truncating toward zero.
    /// Returns `None` for NaN or infinite values.
    pub fn as_int(&self) -> Option<i64> {
        let x = self.as_number();
        x.is_finite().then(|| x.trunc() as i64)
    }

    /// Coerce to a string.
    pub fn as_str(&self) -> String {
        self.to_string()
    }

    /// `true` if this value reads as a number (a `Num`, or a string that
    /// parses as one).
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Num(x) => !x.is_nan(),
            Value::Bool(_) => false,
            Value::Str(s) => {
                let t = s.trim();
                !t.is_empty() && t.parse::<f64>().is_ok()
            }
        }
    }

    /// Loose equality: two strings compare as text, any other pairing
    /// compares numerically.
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => self.as_number() == rhs.as_number(),
        }
    }

    /// Numeric ordering.  `None` when either side is not a number.
    pub fn cmp_numeric(&self, rhs: &Value) -> Option<std::cmp::Ordering> {
        self.as_number().partial_cmp(&rhs.as_number())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Num(x)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Num(n as f64)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
