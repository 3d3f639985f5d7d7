//! Error kinds raised while running a script.
//!
//! Ordinary control flow (BREAK, ITERATE, RETURN, SIGNAL, EXIT) never travels
//! through this type; see [`ControlFlow`](super::interp::ControlFlow).

use thiserror::Error;

/// A failure that terminates a script run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// A malformed construct: bad DO/PROCEDURE/PARSE/IF clause, unmatched
    /// END, unrecognised statement.
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A call to a name that is not a registered procedure, a BBS function,
    /// or a built-in.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// SIGNAL to a label that does not exist anywhere in the script.
    #[error("label `{0}` not found")]
    UnknownLabel(String),

    /// Procedure nesting exceeded the configured ceiling.
    #[error("recursion limit of {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// BREAK/LEAVE or ITERATE/CONTINUE with no enclosing loop.
    #[error("{0} outside of a loop")]
    Flow(&'static str),

    /// A built-in or BBS function rejected its arguments.
    #[error("{function}: {message}")]
    BadArgument { function: String, message: String },

    /// A host-provided BBS function failed.
    #[error("{function} failed: {message}")]
    Host { function: String, message: String },

    /// A SIGNAL or EXIT left a procedure that was called from inside a
    /// statement.  The line walker turns it back into control flow, so it
    /// never reaches an [`ExecResult`](super::ExecResult).
    #[error("SIGNAL or EXIT escaped its statement")]
    Unwound,
}

impl ScriptError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Syntax { line, message: message.into() }
    }

    pub(crate) fn bad_arg(function: &str, message: impl Into<String>) -> Self {
        ScriptError::BadArgument {
            function: function.to_owned(),
            message: message.into(),
        }
    }
}

/// Error returned by a [`HostContext`](super::host::HostContext) BBS function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        HostError(message.into())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
