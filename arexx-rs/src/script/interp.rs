//! Script interpreter.
//!
//! The [`Interpreter`] walks the preprocessed line list by index.  Block
//! constructs (DO, SELECT, PROCEDURE, IF ... THEN DO) find their extent with
//! a depth-counted forward scan and run their bodies through the same line
//! walker, so a procedure body or loop body may contain anything top-level
//! code can.  It implements [`EvalContext`] so the evaluator can call back
//! into it for variable lookups and function calls.
//!
//! Non-error control flow travels as a [`ControlFlow`] return value:
//!
//! - `Break` / `Iterate` are consumed by the nearest loop,
//! - `Return` by the nearest procedure frame (or ends the run at top level),
//! - `Signal` by the innermost line walker whose range contains the label,
//! - `Exit` ends the run from any depth.
//!
//! A `Signal` or `Exit` leaving a procedure cannot travel through the
//! evaluator as a value; the procedure frame parks it in `escaped` and
//! unwinds with [`ScriptError::Unwound`].  The line walker running the
//! calling statement abandons the rest of that statement and resumes the
//! parked flow.  Each frame a SIGNAL leaves pops its own scope.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{
    builtins::call_builtin,
    error::ScriptError,
    eval::{evaluate, evaluate_condition, is_name, split_call, EvalContext},
    host::{BbsFunction, HostContext},
    parse::parse_template,
    scope::ScopeStack,
    source::{after_keyword, keyword, label_name, preprocess, Program},
    value::Value,
};

/// Procedure nesting ceiling used when no [`EngineConfig`] is given.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

static IF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^IF\s+(.+?)\s+THEN(?:\s+(.*))?$").expect("static regex")
});

static WHEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^WHEN\s+(.+?)(?:\s+THEN(?:\s+(.*))?)?$").expect("static regex")
});

static DO_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^([A-Za-z_][A-Za-z0-9_.]*)\s*=\s*(.+?)\s+TO\s+(.+?)(?:\s+BY\s+(.+))?$")
        .expect("static regex")
});

static PROCEDURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^PROCEDURE\s+([A-Za-z_][A-Za-z0-9_.]*)\s*(?:\((.*)\))?$")
        .expect("static regex")
});

static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_.]*)\s*=(.*)$").expect("static regex")
});

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_.]*)\s*(.*)$").expect("static regex")
});

static WITH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(.*)\s+WITH(?:\s+(.*))?$").expect("static regex")
});

// ── Configuration ─────────────────────────────────────────────────────────────

/// Per-run engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum procedure (and INTERPRET) nesting depth.
    pub recursion_limit: usize,
    /// Start every run with TRACE enabled.
    pub trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { recursion_limit: DEFAULT_RECURSION_LIMIT, trace: false }
    }
}

// ── ExecResult ────────────────────────────────────────────────────────────────

/// Outcome of one script run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    pub success: bool,
    /// Every line produced by `SAY`, in order.  Kept on failure.
    pub output: Vec<String>,
    pub error: Option<String>,
    /// Value of a top-level `RETURN expr` or `EXIT expr`.
    pub result: Option<String>,
}

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-error control-flow signals that unwind the line walker.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    Break,
    Iterate,
    Return(Option<Value>),
    /// Jump to the line after the label at this index.
    Signal(usize),
    Exit(Option<Value>),
}

/// What a loop does after one pass over its body.
enum LoopStep {
    Next,
    Stop,
    Leave(ControlFlow),
}

/// The form selected by the clause after `DO`.
#[derive(Debug, Clone, PartialEq)]
enum DoForm {
    Forever,
    While(String),
    Until(String),
    Count(String),
    Controlled { var: String, from: String, to: String, by: Option<String> },
}

// ── Procedure ─────────────────────────────────────────────────────────────────

/// A user-defined procedure, registered when its definition line is reached.
#[derive(Debug, Clone)]
struct Procedure {
    name: String,
    params: Vec<String>,
    /// Body line range (exclusive of the PROCEDURE and END lines).
    start: usize,
    end: usize,
}

// ── Interpreter ───────────────────────────────────────────────────────────────

/// The script interpreter.  One instance serves one run at a time; every
/// table is rebuilt at the start of [`execute`](Interpreter::execute).
pub struct Interpreter<H: HostContext> {
    host: H,
    config: EngineConfig,
    program: Arc<Program>,
    /// Cached `DO`/`SELECT`/... line index → matching `END` index.
    block_ends: HashMap<usize, usize>,
    scopes: ScopeStack,
    procedures: HashMap<String, Procedure>,
    /// Invocation arguments (`ARG1..ARGn`).
    args: Vec<String>,
    /// Current procedure/INTERPRET nesting.
    depth: usize,
    /// Deepest nesting reached during the last run.
    peak_depth: usize,
    /// SIGNAL/EXIT unwinding out of a procedure call.
    escaped: Option<ControlFlow>,
    output: Vec<String>,
    trace: bool,
    options: Vec<String>,
}

impl<H: HostContext> Interpreter<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, EngineConfig::default())
    }

    pub fn with_config(host: H, config: EngineConfig) -> Self {
        let trace = config.trace;
        Interpreter {
            host,
            config,
            program: Arc::new(Program::default()),
            block_ends: HashMap::new(),
            scopes: ScopeStack::new(),
            procedures: HashMap::new(),
            args: Vec::new(),
            depth: 0,
            peak_depth: 0,
            escaped: None,
            output: Vec::new(),
            trace,
            options: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Look up a variable in the current (after a run: root) scope.
    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.scopes.get(name)
    }

    /// `true` if a procedure with this name was registered in the last run.
    pub fn is_procedure(&self, name: &str) -> bool {
        self.procedures.contains_key(&name.to_ascii_uppercase())
    }

    /// Deepest procedure/INTERPRET nesting reached in the last run.
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    /// Flags collected from `OPTIONS` statements (uppercased).
    pub fn options(&self) -> &[String] {
        &self.options
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Run `src` with invocation arguments `argv`.  Never fails: errors are
    /// reported in the returned [`ExecResult`] together with any output
    /// produced before the failure.
    pub fn execute(&mut self, src: &str, argv: &[String]) -> ExecResult {
        self.reset(preprocess(src), argv);

        let outcome = self.run();
        let output = std::mem::take(&mut self.output);
        match outcome {
            Ok(value) => {
                log::debug!("script finished ({} lines of output)", output.len());
                ExecResult {
                    success: true,
                    output,
                    error: None,
                    result: value.map(|v| v.as_str()),
                }
            }
            Err(e) => {
                log::debug!("script failed: {e}");
                ExecResult { success: false, output, error: Some(e.to_string()), result: None }
            }
        }
    }

    fn reset(&mut self, program: Program, argv: &[String]) {
        self.program = Arc::new(program);
        self.block_ends.clear();
        self.scopes = ScopeStack::new();
        self.procedures.clear();
        self.args = argv.to_vec();
        self.depth = 0;
        self.peak_depth = 0;
        self.escaped = None;
        self.output.clear();
        self.trace = self.config.trace;
        self.options.clear();

        for (i, arg) in argv.iter().enumerate() {
            self.scopes.set(&format!("ARG{}", i + 1), Value::Str(arg.clone()));
        }
        self.scopes.set("ARGCOUNT", Value::from(argv.len()));
    }

    fn run(&mut self) -> Result<Option<Value>, ScriptError> {
        let end = self.program.len();
        match self.exec_range(0, end)? {
            None => Ok(None),
            Some(ControlFlow::Return(v) | ControlFlow::Exit(v)) => Ok(v),
            Some(ControlFlow::Break) => Err(ScriptError::Flow("BREAK")),
            Some(ControlFlow::Iterate) => Err(ScriptError::Flow("ITERATE")),
            // The top-level range contains every label.
            Some(ControlFlow::Signal(_)) => Ok(None),
        }
    }

    /// Execute lines `start..end`.
    fn exec_range(&mut self, start: usize, end: usize) -> Result<Option<ControlFlow>, ScriptError> {
        let mut pc = start;
        while pc < end {
            let (next, flow) = match self.exec_line(pc) {
                Ok(step) => step,
                Err(ScriptError::Unwound) => {
                    let parked = self.escaped.take().ok_or(ScriptError::Unwound)?;
                    (pc + 1, Some(parked))
                }
                Err(e) => return Err(e),
            };
            match flow {
                None => pc = next,
                Some(ControlFlow::Signal(label)) if (start..end).contains(&label) => pc = label + 1,
                Some(cf) => return Ok(Some(cf)),
            }
        }
        Ok(None)
    }

    /// Execute the line at `pc`; returns the index of the next line to run.
    fn exec_line(&mut self, pc: usize) -> Result<(usize, Option<ControlFlow>), ScriptError> {
        let program = Arc::clone(&self.program);
        let line = &program.lines[pc];
        if self.trace {
            log::debug!(target: "arexx::trace", "{:>4} *-* {}", line.number, line.text);
        }
        if label_name(&line.text).is_some() {
            return Ok((pc + 1, None));
        }

        match keyword(&line.text).as_str() {
            "DO" => self.exec_do(pc),
            "SELECT" => self.exec_select(pc),
            "PROCEDURE" => self.define_procedure(pc),
            "IF" => self.exec_if(pc),
            "END" => Err(ScriptError::syntax(line.number, "END without matching DO, SELECT or PROCEDURE")),
            "ELSE" => Err(ScriptError::syntax(line.number, "ELSE without IF")),
            "WHEN" | "OTHERWISE" => {
                Err(ScriptError::syntax(line.number, format!("{} outside SELECT", keyword(&line.text))))
            }
            _ => Ok((pc + 1, self.exec_statement(&line.text, line.number)?)),
        }
    }

    fn block_end(&mut self, open: usize) -> Result<usize, ScriptError> {
        if let Some(&end) = self.block_ends.get(&open) {
            return Ok(end);
        }
        let end = self.program.matching_end(open)?;
        self.block_ends.insert(open, end);
        Ok(end)
    }

    // ── Simple statements ─────────────────────────────────────────────────────

    /// Execute one single-line statement.
    fn exec_statement(&mut self, text: &str, line: usize) -> Result<Option<ControlFlow>, ScriptError> {
        let text = text.trim();
        if text.is_empty() || text.starts_with("/*") || text.starts_with("//") || label_name(text).is_some() {
            return Ok(None);
        }
        let rest = after_keyword(text);

        match keyword(text).as_str() {
            "BREAK" | "LEAVE" => return Ok(Some(ControlFlow::Break)),
            "ITERATE" | "CONTINUE" => return Ok(Some(ControlFlow::Iterate)),
            "NOP" => return Ok(None),
            "RETURN" => return Ok(Some(ControlFlow::Return(self.eval_optional(rest)?))),
            "EXIT" => return Ok(Some(ControlFlow::Exit(self.eval_optional(rest)?))),
            "SIGNAL" => return self.exec_signal(rest, line).map(Some),
            "ARG" => return self.exec_arg(rest, line).map(|()| None),
            "INTERPRET" => return self.exec_interpret(rest, line),
            "OPTIONS" => {
                self.options.extend(rest.split_whitespace().map(str::to_ascii_uppercase));
                return Ok(None);
            }
            "TRACE" => {
                self.set_trace(rest);
                return Ok(None);
            }
            "PARSE" => return self.exec_parse(rest, line).map(|()| None),
            _ => {}
        }

        if let Some(caps) = ASSIGN_RE.captures(text) {
            let expr = caps.get(2).map_or("", |m| m.as_str());
            if !expr.starts_with('=') {
                let value = self.eval_optional(expr)?.unwrap_or_default();
                self.scopes.set(&caps[1], value);
                return Ok(None);
            }
        }

        match keyword(text).as_str() {
            "SAY" => {
                let s = self.eval_optional(rest)?.map(|v| v.as_str()).unwrap_or_default();
                self.host.emit(&s);
                self.output.push(s);
                Ok(None)
            }
            "CALL" => self.exec_call(rest, line).map(|()| None),
            "IF" => self.exec_inline_if(text, line),
            kw @ ("DO" | "SELECT" | "PROCEDURE" | "END" | "ELSE" | "WHEN" | "OTHERWISE") => {
                Err(ScriptError::syntax(line, format!("{kw} must begin its own line")))
            }
            _ if split_call(text).is_some() => {
                evaluate(text, self)?;
                Ok(None)
            }
            _ => Err(ScriptError::syntax(line, format!("unrecognised statement `{text}`"))),
        }
    }

    /// Evaluate `expr`, or `None` when it is blank.
    fn eval_optional(&mut self, expr: &str) -> Result<Option<Value>, ScriptError> {
        if expr.trim().is_empty() {
            Ok(None)
        } else {
            evaluate(expr, self).map(Some)
        }
    }

    fn exec_signal(&mut self, rest: &str, line: usize) -> Result<ControlFlow, ScriptError> {
        let label = rest.trim().to_ascii_uppercase();
        if label.is_empty() {
            return Err(ScriptError::syntax(line, "SIGNAL requires a label"));
        }
        match self.program.labels.get(&label) {
            Some(&idx) => Ok(ControlFlow::Signal(idx)),
            None => Err(ScriptError::UnknownLabel(label)),
        }
    }

    fn exec_arg(&mut self, rest: &str, line: usize) -> Result<(), ScriptError> {
        let names = rest
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty());
        for (i, name) in names.enumerate() {
            if !is_name(name) {
                return Err(ScriptError::syntax(line, format!("ARG: `{name}` is not a variable name")));
            }
            let value = self.args.get(i).cloned().unwrap_or_default();
            self.scopes.set(name, Value::Str(value));
        }
        Ok(())
    }

    fn exec_interpret(&mut self, rest: &str, line: usize) -> Result<Option<ControlFlow>, ScriptError> {
        let code = evaluate(rest, self)?.as_str();
        self.enter()?;
        let result = self.exec_statement(&code, line);
        self.leave();
        result
    }

    fn set_trace(&mut self, mode: &str) {
        let mode = mode.trim().to_ascii_uppercase();
        self.trace = !matches!(mode.as_str(), "" | "O" | "OFF");
        log::debug!(target: "arexx::trace", "TRACE {mode}");
    }

    fn exec_parse(&mut self, rest: &str, line: usize) -> Result<(), ScriptError> {
        let mut rest = rest;
        let upper = keyword(rest) == "UPPER";
        if upper {
            rest = after_keyword(rest);
        }

        let (source, template) = match keyword(rest).as_str() {
            "VAR" => {
                let tail = after_keyword(rest);
                let name = tail.split_whitespace().next().unwrap_or("");
                if !is_name(name) {
                    return Err(ScriptError::syntax(line, "PARSE VAR requires a variable name"));
                }
                let source = self.scopes.get(name).map(Value::as_str).unwrap_or_default();
                (source, after_keyword(tail).to_owned())
            }
            "VALUE" => {
                let tail = after_keyword(rest);
                let caps = WITH_RE
                    .captures(tail)
                    .ok_or_else(|| ScriptError::syntax(line, "PARSE VALUE requires WITH"))?;
                let template = caps.get(2).map_or("", |m| m.as_str()).to_owned();
                let expr = caps[1].to_owned();
                (evaluate(&expr, self)?.as_str(), template)
            }
            "ARG" => (self.args.join(" "), after_keyword(rest).to_owned()),
            _ => return Err(ScriptError::syntax(line, "PARSE expects VAR, VALUE or ARG")),
        };

        let source = if upper { source.to_uppercase() } else { source };
        let bindings = parse_template(&source, &template).map_err(|m| ScriptError::syntax(line, m))?;
        for (name, value) in bindings {
            self.scopes.set(&name, Value::Str(value));
        }
        Ok(())
    }

    fn exec_call(&mut self, rest: &str, line: usize) -> Result<(), ScriptError> {
        let caps = CALL_RE
            .captures(rest)
            .ok_or_else(|| ScriptError::syntax(line, "CALL requires a name"))?;
        let name = caps[1].to_owned();
        let tail = caps.get(2).map_or("", |m| m.as_str());
        let arg_text = match split_call(rest) {
            Some((_, inner)) => inner,
            None => tail,
        };

        let mut args = Vec::new();
        for arg in super::eval::split_args(arg_text) {
            args.push(evaluate(arg, self)?);
        }
        match self.call_function(&name, args)? {
            Some(v) => self.scopes.set("RESULT", v),
            None => {
                self.scopes.unset("RESULT");
            }
        }
        Ok(())
    }

    /// `IF cond THEN stmt` used where only one statement is allowed.
    fn exec_inline_if(&mut self, text: &str, line: usize) -> Result<Option<ControlFlow>, ScriptError> {
        let (cond, then) = split_if(text, line)?;
        if then.eq_ignore_ascii_case("DO") {
            return Err(ScriptError::syntax(line, "IF ... THEN DO must begin its own line"));
        }
        if evaluate_condition(&cond, self)? {
            self.exec_statement(&then, line)
        } else {
            Ok(None)
        }
    }

    // ── IF ────────────────────────────────────────────────────────────────────

    fn exec_if(&mut self, pc: usize) -> Result<(usize, Option<ControlFlow>), ScriptError> {
        let program = Arc::clone(&self.program);
        let line = program.lines[pc].number;
        let (cond, then) = split_if(&program.lines[pc].text, line)?;
        let taken = evaluate_condition(&cond, self)?;

        let mut flow = None;
        let after = if then.eq_ignore_ascii_case("DO") {
            let end = self.block_end(pc)?;
            if taken {
                flow = self.exec_range(pc + 1, end)?;
            }
            end + 1
        } else {
            if taken {
                flow = self.exec_statement(&then, line)?;
            }
            pc + 1
        };

        let Some(else_line) = program.lines.get(after).filter(|l| keyword(&l.text) == "ELSE") else {
            return Ok((after, flow));
        };
        let otherwise = after_keyword(&else_line.text);
        if otherwise.eq_ignore_ascii_case("DO") {
            let end = self.block_end(after)?;
            if !taken {
                flow = self.exec_range(after + 1, end)?;
            }
            Ok((end + 1, flow))
        } else {
            if !taken {
                flow = self.exec_statement(otherwise, else_line.number)?;
            }
            Ok((after + 1, flow))
        }
    }

    // ── DO ────────────────────────────────────────────────────────────────────

    fn exec_do(&mut self, pc: usize) -> Result<(usize, Option<ControlFlow>), ScriptError> {
        let program = Arc::clone(&self.program);
        let line = program.lines[pc].number;
        let end = self.block_end(pc)?;
        let form = parse_do_clause(after_keyword(&program.lines[pc].text), line)?;
        let body = (pc + 1, end);

        let flow = match form {
            DoForm::Forever => loop {
                match self.run_body(body)? {
                    LoopStep::Next => {}
                    LoopStep::Stop => break None,
                    LoopStep::Leave(cf) => break Some(cf),
                }
            },
            DoForm::While(cond) => loop {
                if !evaluate_condition(&cond, self)? {
                    break None;
                }
                match self.run_body(body)? {
                    LoopStep::Next => {}
                    LoopStep::Stop => break None,
                    LoopStep::Leave(cf) => break Some(cf),
                }
            },
            DoForm::Until(cond) => loop {
                match self.run_body(body)? {
                    LoopStep::Next => {}
                    LoopStep::Stop => break None,
                    LoopStep::Leave(cf) => break Some(cf),
                }
                if evaluate_condition(&cond, self)? {
                    break None;
                }
            },
            DoForm::Count(expr) => {
                let n = evaluate(&expr, self)?.as_number();
                if n.is_nan() {
                    return Err(ScriptError::syntax(line, format!("malformed DO clause `{expr}`")));
                }
                let mut flow = None;
                for _ in 0..(n.max(0.0) as u64) {
                    match self.run_body(body)? {
                        LoopStep::Next => {}
                        LoopStep::Stop => break,
                        LoopStep::Leave(cf) => {
                            flow = Some(cf);
                            break;
                        }
                    }
                }
                flow
            }
            DoForm::Controlled { var, from, to, by } => {
                self.exec_controlled(&var, &from, &to, by.as_deref(), body, line)?
            }
        };
        Ok((end + 1, flow))
    }

    /// `DO var = from TO to [BY step]`.  The variable is assigned at the top
    /// of each pass and keeps the value of the last pass afterwards.
    fn exec_controlled(
        &mut self,
        var: &str,
        from: &str,
        to: &str,
        by: Option<&str>,
        body: (usize, usize),
        line: usize,
    ) -> Result<Option<ControlFlow>, ScriptError> {
        let start = evaluate(from, self)?.as_number();
        let limit = evaluate(to, self)?.as_number();
        let step = match by {
            Some(expr) => evaluate(expr, self)?.as_number(),
            None => 1.0,
        };
        if start.is_nan() || limit.is_nan() || step.is_nan() {
            return Err(ScriptError::syntax(line, "DO bounds must be numeric"));
        }
        if step == 0.0 {
            return Err(ScriptError::syntax(line, "DO step must not be zero"));
        }

        let mut i = start;
        while (step > 0.0 && i <= limit) || (step < 0.0 && i >= limit) {
            self.scopes.set(var, Value::Num(i));
            match self.run_body(body)? {
                LoopStep::Next => {}
                LoopStep::Stop => break,
                LoopStep::Leave(cf) => return Ok(Some(cf)),
            }
            i += step;
        }
        Ok(None)
    }

    fn run_body(&mut self, (start, end): (usize, usize)) -> Result<LoopStep, ScriptError> {
        Ok(match self.exec_range(start, end)? {
            None | Some(ControlFlow::Iterate) => LoopStep::Next,
            Some(ControlFlow::Break) => LoopStep::Stop,
            Some(cf) => LoopStep::Leave(cf),
        })
    }

    // ── SELECT ────────────────────────────────────────────────────────────────

    fn exec_select(&mut self, pc: usize) -> Result<(usize, Option<ControlFlow>), ScriptError> {
        let program = Arc::clone(&self.program);
        let end = self.block_end(pc)?;

        // WHEN/OTHERWISE lines at nesting depth zero.
        let mut clauses = Vec::new();
        let mut depth = 0usize;
        for i in pc + 1..end {
            let text = &program.lines[i].text;
            let kw = keyword(text);
            if depth == 0 && (kw == "WHEN" || kw == "OTHERWISE") {
                clauses.push(i);
            } else if depth == 0 && clauses.is_empty() {
                return Err(ScriptError::syntax(program.lines[i].number, "expected WHEN or OTHERWISE"));
            }
            if super::source::opens_block(text) {
                depth += 1;
            } else if super::source::is_end(text) {
                depth = depth.saturating_sub(1);
            }
        }

        let mut otherwise = None;
        for (k, &ci) in clauses.iter().enumerate() {
            let branch_end = clauses.get(k + 1).copied().unwrap_or(end);
            let clause = &program.lines[ci];
            if keyword(&clause.text) == "OTHERWISE" {
                otherwise.get_or_insert((ci, branch_end));
                continue;
            }
            let caps = WHEN_RE
                .captures(&clause.text)
                .ok_or_else(|| ScriptError::syntax(clause.number, "malformed WHEN clause"))?;
            if evaluate_condition(&caps[1], self)? {
                let inline = caps.get(2).map_or("", |m| m.as_str()).trim();
                let flow = self.exec_branch(ci, inline, branch_end)?;
                return Ok((end + 1, flow));
            }
        }

        let flow = match otherwise {
            Some((ci, branch_end)) => {
                let inline = after_keyword(&program.lines[ci].text);
                self.exec_branch(ci, inline, branch_end)?
            }
            None => None,
        };
        Ok((end + 1, flow))
    }

    /// Run a WHEN/OTHERWISE branch: its inline statement (or `DO` block),
    /// then the lines up to the next clause.
    fn exec_branch(
        &mut self,
        clause: usize,
        inline: &str,
        branch_end: usize,
    ) -> Result<Option<ControlFlow>, ScriptError> {
        let mut next = clause + 1;
        if inline.eq_ignore_ascii_case("DO") {
            let end = self.block_end(clause)?;
            if let Some(cf) = self.exec_range(clause + 1, end)? {
                return Ok(Some(cf));
            }
            next = end + 1;
        } else if !inline.is_empty() {
            let line = self.program.line_number(clause);
            if let Some(cf) = self.exec_statement(inline, line)? {
                return Ok(Some(cf));
            }
        }
        self.exec_range(next, branch_end)
    }

    // ── Procedures ────────────────────────────────────────────────────────────

    fn define_procedure(&mut self, pc: usize) -> Result<(usize, Option<ControlFlow>), ScriptError> {
        let program = Arc::clone(&self.program);
        let line = &program.lines[pc];
        let caps = PROCEDURE_RE
            .captures(&line.text)
            .ok_or_else(|| ScriptError::syntax(line.number, "malformed PROCEDURE definition"))?;

        let mut params = Vec::new();
        for p in super::eval::split_args(caps.get(2).map_or("", |m| m.as_str())) {
            if !is_name(p) {
                return Err(ScriptError::syntax(line.number, format!("bad parameter name `{p}`")));
            }
            params.push(p.to_ascii_uppercase());
        }

        let end = self.block_end(pc)?;
        let name = caps[1].to_ascii_uppercase();
        log::trace!(target: "arexx::proc", "registered {name}({})", params.join(", "));
        self.procedures.insert(
            name.clone(),
            Procedure { name, params, start: pc + 1, end },
        );
        Ok((end + 1, None))
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        if self.depth >= self.config.recursion_limit {
            log::debug!("recursion limit {} reached", self.config.recursion_limit);
            return Err(ScriptError::RecursionLimit { limit: self.config.recursion_limit });
        }
        self.depth += 1;
        self.peak_depth = self.peak_depth.max(self.depth);
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn invoke_procedure(&mut self, proc: &Procedure, args: Vec<Value>) -> Result<Option<Value>, ScriptError> {
        self.enter()?;
        log::trace!(target: "arexx::proc", "enter {} (depth {})", proc.name, self.depth);
        self.scopes.push_scope(&proc.params, args);
        let result = self.exec_range(proc.start, proc.end);
        self.scopes.pop_scope();
        self.leave();
        log::trace!(target: "arexx::proc", "leave {}", proc.name);

        match result? {
            None => Ok(None),
            Some(ControlFlow::Return(v)) => Ok(v),
            Some(ControlFlow::Break) => Err(ScriptError::Flow("BREAK")),
            Some(ControlFlow::Iterate) => Err(ScriptError::Flow("ITERATE")),
            Some(cf @ (ControlFlow::Signal(_) | ControlFlow::Exit(_))) => {
                self.escaped = Some(cf);
                Err(ScriptError::Unwound)
            }
        }
    }

    // ── Function resolution ───────────────────────────────────────────────────

    /// Resolve `name`: user procedure, then BBS function, then built-in.
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, ScriptError> {
        let upper = name.to_ascii_uppercase();

        if let Some(proc) = self.procedures.get(&upper).cloned() {
            return self.invoke_procedure(&proc, args);
        }

        if let Ok(func) = upper.parse::<BbsFunction>() {
            if !func.accepts(args.len()) {
                let (min, max) = func.arity();
                return Err(ScriptError::bad_arg(
                    func.name(),
                    format!("expects {min}..={max} arguments, got {}", args.len()),
                ));
            }
            return self
                .host
                .call_bbs(func, &args)
                .map(Some)
                .map_err(|e| ScriptError::Host { function: func.name().to_owned(), message: e.0 });
        }

        if let Some(result) = call_builtin(&upper, &args) {
            return result.map(Some);
        }

        log::debug!("unknown function {upper}");
        Err(ScriptError::UnknownFunction(upper))
    }
}

// ── Clause parsing ────────────────────────────────────────────────────────────

/// Split `IF cond THEN stmt` into `(cond, stmt)`.
fn split_if(text: &str, line: usize) -> Result<(String, String), ScriptError> {
    let caps = IF_RE
        .captures(text)
        .ok_or_else(|| ScriptError::syntax(line, "malformed IF: expected IF cond THEN statement"))?;
    let then = caps.get(2).map_or("", |m| m.as_str()).trim();
    if then.is_empty() {
        return Err(ScriptError::syntax(line, "THEN requires a statement"));
    }
    Ok((caps[1].to_owned(), then.to_owned()))
}

fn parse_do_clause(clause: &str, line: usize) -> Result<DoForm, ScriptError> {
    let clause = clause.trim();
    if clause.is_empty() || clause.eq_ignore_ascii_case("FOREVER") {
        return Ok(DoForm::Forever);
    }
    match keyword(clause).as_str() {
        "WHILE" => return Ok(DoForm::While(after_keyword(clause).to_owned())),
        "UNTIL" => return Ok(DoForm::Until(after_keyword(clause).to_owned())),
        _ => {}
    }
    if let Some(caps) = DO_TO_RE.captures(clause) {
        return Ok(DoForm::Controlled {
            var: caps[1].to_owned(),
            from: caps[2].to_owned(),
            to: caps[3].to_owned(),
            by: caps.get(4).map(|m| m.as_str().to_owned()),
        });
    }
    if ASSIGN_RE.is_match(clause) {
        return Err(ScriptError::syntax(line, format!("malformed DO clause `{clause}`: missing TO")));
    }
    Ok(DoForm::Count(clause.to_owned()))
}

// ── EvalContext impl ──────────────────────────────────────────────────────────

impl<H: HostContext> EvalContext for Interpreter<H> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.scopes.get(name).cloned()
    }

    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        Ok(self.call_function(name, args)?.unwrap_or_default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
