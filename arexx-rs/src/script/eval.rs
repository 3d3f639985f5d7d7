//! Expression and condition evaluation.
//!
//! There is no operator grammar.  An expression is classified by the first
//! matching form, in this order:
//!
//! 1. quoted string literal (`"..."` or `'...'`, doubled quote = escape)
//! 2. numeric literal
//! 3. a name bound in the current scope
//! 4. function call `NAME(args)` whose opening parenthesis is closed by the
//!    final character
//! 5. `||` concatenation (split outside quotes and parentheses)
//! 6. anything else evaluates to its own trimmed text
//!
//! Conditions split on the first comparison operator found by plain substring
//! search, in priority order `>= <= ~= \= != <> == = > <`.  Operators inside
//! quotes or parentheses are *not* skipped; existing scripts rely on the
//! resulting splits, so the search stays textual.

use std::sync::LazyLock;

use regex::Regex;

use super::error::ScriptError;
use super::value::Value;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)$").expect("static regex"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("static regex"));

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the evaluator.
///
/// The [`Interpreter`](super::interp::Interpreter) implements this trait to
/// give the evaluator access to the current variable table and to function
/// resolution (procedures, BBS functions, built-ins).
pub trait EvalContext {
    /// Look up a variable in the current scope.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Resolve and invoke a function with already-evaluated arguments.
    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError>;
}

// ── Comparison operators ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Ge,
    Le,
    Ne,
    Eq,
    Gt,
    Lt,
}

/// Operators in detection priority order.
const OPERATORS: &[(&str, CmpOp)] = &[
    (">=", CmpOp::Ge),
    ("<=", CmpOp::Le),
    ("~=", CmpOp::Ne),
    ("\\=", CmpOp::Ne),
    ("!=", CmpOp::Ne),
    ("<>", CmpOp::Ne),
    ("==", CmpOp::Eq),
    ("=", CmpOp::Eq),
    (">", CmpOp::Gt),
    ("<", CmpOp::Lt),
];

// ── Evaluation ────────────────────────────────────────────────────────────────

/// Evaluate an expression fragment.
pub fn evaluate(expr: &str, ctx: &mut dyn EvalContext) -> Result<Value, ScriptError> {
    let src = expr.trim();

    if let Some(s) = string_literal(src) {
        return Ok(Value::Str(s));
    }
    if NUMBER_RE.is_match(src) {
        return Ok(Value::Num(src.parse().unwrap_or(f64::NAN)));
    }
    if is_name(src) {
        if let Some(v) = ctx.get_var(src) {
            return Ok(v);
        }
    }
    if let Some((name, inner)) = split_call(src) {
        let mut args = Vec::new();
        for arg in split_args(inner) {
            args.push(evaluate(arg, ctx)?);
        }
        return ctx.call_fn(name, args);
    }

    let parts = split_concat(src);
    if parts.len() > 1 {
        let mut out = String::new();
        for part in parts {
            out.push_str(&evaluate(part, ctx)?.as_str());
        }
        return Ok(Value::Str(out));
    }

    Ok(Value::Str(src.to_owned()))
}

/// Evaluate a condition to a boolean.
pub fn evaluate_condition(expr: &str, ctx: &mut dyn EvalContext) -> Result<bool, ScriptError> {
    let src = expr.trim();
    let found = OPERATORS
        .iter()
        .find_map(|&(tok, op)| src.find(tok).map(|i| (i, tok.len(), op)));

    let Some((at, len, op)) = found else {
        return Ok(evaluate(src, ctx)?.as_bool());
    };

    let lhs = evaluate(&src[..at], ctx)?;
    let rhs = evaluate(&src[at + len..], ctx)?;
    let ord = lhs.cmp_numeric(&rhs);
    Ok(match op {
        CmpOp::Eq => lhs.loose_eq(&rhs),
        CmpOp::Ne => !lhs.loose_eq(&rhs),
        CmpOp::Gt => ord == Some(std::cmp::Ordering::Greater),
        CmpOp::Lt => ord == Some(std::cmp::Ordering::Less),
        CmpOp::Ge => matches!(ord, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
        CmpOp::Le => matches!(ord, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
    })
}

// ── Lexical helpers ───────────────────────────────────────────────────────────

/// `true` if `s` is a valid variable/function name.
pub fn is_name(s: &str) -> bool {
    NAME_RE.is_match(s)
}

/// Decode `s` if the whole of it is one quoted string literal.
pub fn string_literal(s: &str) -> Option<String> {
    let quote = s.chars().next().filter(|&c| c == '"' || c == '\'')?;
    if s.len() < 2 || !s.ends_with(quote) {
        return None;
    }
    let body = &s[1..s.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch == quote {
            // Inside a literal a quote must be doubled.
            if chars.next() != Some(quote) {
                return None;
            }
        }
        out.push(ch);
    }
    Some(out)
}

/// Split `NAME(inner)` into `(NAME, inner)` when the parenthesis following
/// the name is closed by the last character of `s`.
pub fn split_call(s: &str) -> Option<(&str, &str)> {
    let open = s.find('(')?;
    let name = s[..open].trim_end();
    if !is_name(name) || !s.ends_with(')') {
        return None;
    }
    let close = matching_paren(s, open)?;
    (close == s.len() - 1).then(|| (name, &s[open + 1..close]))
}

/// Byte index of the `)` matching the `(` at `open`, skipping quoted text.
fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, ch) in s[open..].char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(open + i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split on `sep` at nesting depth zero and outside quotes.
fn split_top_level<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut i = 0;
    let bytes = s.as_bytes();
    while i < s.len() {
        let ch = bytes[i] as char;
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if depth == 0 && bytes[i..].starts_with(sep.as_bytes()) => {
                    parts.push(&s[start..i]);
                    i += sep.len();
                    start = i;
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// Split a call's argument list on top-level commas.  An empty or blank
/// list yields no arguments.
pub fn split_args(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(inner, ",")
        .into_iter()
        .map(str::trim)
        .collect()
}

/// Split on top-level `||`.
pub fn split_concat(s: &str) -> Vec<&str> {
    split_top_level(s, "||")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct TestCtx {
        vars: HashMap<String, Value>,
        calls: Vec<(String, Vec<Value>)>,
    }

    impl TestCtx {
        fn new() -> Self {
            TestCtx { vars: HashMap::new(), calls: Vec::new() }
        }

        fn with(mut self, k: &str, v: Value) -> Self {
            self.vars.insert(k.to_ascii_uppercase(), v);
            self
        }
    }

    impl EvalContext for TestCtx {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.vars.get(&name.to_ascii_uppercase()).cloned()
        }

        fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
            self.calls.push((name.to_owned(), args.clone()));
            match name.to_ascii_uppercase().as_str() {
                "JOIN" => Ok(Value::Str(
                    args.iter().map(Value::as_str).collect::<Vec<_>>().join("+"),
                )),
                _ => Err(ScriptError::UnknownFunction(name.to_owned())),
            }
        }
    }

    fn eval(src: &str, ctx: &mut TestCtx) -> Value {
        evaluate(src, ctx).unwrap()
    }

    fn cond(src: &str, ctx: &mut TestCtx) -> bool {
        evaluate_condition(src, ctx).unwrap()
    }

    #[test]
    fn string_literals() {
        let mut ctx = TestCtx::new();
        assert_eq!(eval("\"Hello World\"", &mut ctx), Value::from("Hello World"));
        assert_eq!(eval("'single'", &mut ctx), Value::from("single"));
        assert_eq!(eval("\"say \"\"hi\"\"\"", &mut ctx), Value::from("say \"hi\""));
    }

    #[test]
    fn numeric_literals() {
        let mut ctx = TestCtx::new();
        assert_eq!(eval("42", &mut ctx), Value::Num(42.0));
        assert_eq!(eval(" -3.5 ", &mut ctx), Value::Num(-3.5));
    }

    #[test]
    fn bound_name_yields_value() {
        let mut ctx = TestCtx::new().with("x", Value::Num(5.0));
        assert_eq!(eval("X", &mut ctx), Value::Num(5.0));
        assert_eq!(eval("x", &mut ctx), Value::Num(5.0));
    }

    #[test]
    fn unbound_name_is_its_own_text() {
        let mut ctx = TestCtx::new();
        assert_eq!(eval("NOBODY", &mut ctx), Value::from("NOBODY"));
        assert_eq!(eval("  two words ", &mut ctx), Value::from("two words"));
    }

    #[test]
    fn function_call_evaluates_args_in_order() {
        let mut ctx = TestCtx::new().with("n", Value::from("Bob"));
        let v = eval("join(\"a, b\", N, 3)", &mut ctx);
        assert_eq!(v, Value::from("a, b+Bob+3"));
        assert_eq!(ctx.calls[0].1.len(), 3);
    }

    #[test]
    fn nested_call_arguments() {
        let mut ctx = TestCtx::new();
        let v = eval("JOIN(JOIN(1, 2), \"(x)\")", &mut ctx);
        assert_eq!(v, Value::from("1+2+(x)"));
    }

    #[test]
    fn empty_argument_list() {
        let mut ctx = TestCtx::new();
        assert_eq!(eval("JOIN()", &mut ctx), Value::from(""));
        assert!(ctx.calls[0].1.is_empty());
    }

    #[test]
    fn concatenation() {
        let mut ctx = TestCtx::new().with("name", Value::from("Bob"));
        assert_eq!(eval("\"Hello \" || NAME", &mut ctx), Value::from("Hello Bob"));
        assert_eq!(eval("1 || 2 || 3", &mut ctx), Value::from("123"));
    }

    #[test]
    fn concatenation_of_calls_is_not_one_call() {
        let mut ctx = TestCtx::new();
        assert_eq!(eval("JOIN(1) || JOIN(2)", &mut ctx), Value::from("12"));
    }

    #[test]
    fn concat_operator_inside_quotes_is_literal() {
        let mut ctx = TestCtx::new();
        assert_eq!(eval("\"a || b\"", &mut ctx), Value::from("a || b"));
    }

    #[test]
    fn unknown_function_propagates() {
        let mut ctx = TestCtx::new();
        assert_eq!(
            evaluate("NOPE(1)", &mut ctx),
            Err(ScriptError::UnknownFunction("NOPE".into()))
        );
    }

    #[test]
    fn numeric_ordering() {
        let mut ctx = TestCtx::new().with("x", Value::Num(10.0));
        assert!(cond("X > 5", &mut ctx));
        assert!(!cond("X < 5", &mut ctx));
        assert!(cond("X >= 10", &mut ctx));
        assert!(cond("X <= 10", &mut ctx));
        // "9" vs "10" must compare as numbers, not text
        assert!(cond("\"9\" < \"10\"", &mut ctx));
    }

    #[test]
    fn equality_is_loose() {
        let mut ctx = TestCtx::new().with("x", Value::from("5"));
        assert!(cond("X = 5", &mut ctx));
        assert!(cond("X == 5", &mut ctx));
        assert!(cond("X ~= 6", &mut ctx));
        assert!(cond("X != 6", &mut ctx));
        assert!(cond("X <> 6", &mut ctx));
        assert!(!cond("X \\= 5", &mut ctx));
    }

    #[test]
    fn string_equality() {
        let mut ctx = TestCtx::new().with("name", Value::from("sysop"));
        assert!(cond("NAME = \"sysop\"", &mut ctx));
        assert!(!cond("NAME = \"guest\"", &mut ctx));
    }

    #[test]
    fn ordering_against_text_is_false() {
        let mut ctx = TestCtx::new();
        assert!(!cond("\"abc\" > 1", &mut ctx));
        assert!(!cond("\"abc\" < 1", &mut ctx));
    }

    #[test]
    fn operator_free_condition_uses_truthiness() {
        let mut ctx = TestCtx::new().with("flag", Value::Num(0.0)).with("s", Value::from("x"));
        assert!(!cond("FLAG", &mut ctx));
        assert!(cond("S", &mut ctx));
        assert!(cond("1", &mut ctx));
        assert!(!cond("\"\"", &mut ctx));
    }

    #[test]
    fn operator_inside_quotes_still_splits() {
        // The search is textual: the `=` inside the first literal splits it,
        // so the comparison is between `"a` and `b" = X`.
        let mut ctx = TestCtx::new().with("x", Value::from("a=b"));
        assert!(!cond("\"a=b\" = X", &mut ctx));
        assert!(cond("X = \"a=b\"", &mut ctx));
        assert!(cond("\"<\" = \"<\"", &mut ctx));
    }

    #[test]
    fn call_splitting() {
        assert_eq!(split_call("F(1, 2)"), Some(("F", "1, 2")));
        assert_eq!(split_call("F (x)"), Some(("F", "x")));
        assert_eq!(split_call("F(1) || G(2)"), None);
        assert_eq!(split_call("(x)"), None);
        assert_eq!(split_call("F(\")\")"), Some(("F", "\")\"")));
    }

    #[test]
    fn argument_splitting() {
        assert_eq!(split_args(" a , 'b,c' , F(1,2) "), vec!["a", "'b,c'", "F(1,2)"]);
        assert!(split_args("  ").is_empty());
    }
}
