//! The ARexx-style scripting engine.
//!
//! This module implements a line-walking interpreter for BBS automation
//! scripts, covering:
//!
//! - Preprocessing: comments, labels, source line numbers ([`source`])
//! - Case-insensitive variables in isolated procedure scopes ([`scope`])
//! - Literal / variable / call / `||` expressions and textual conditions
//! - Control flow: `IF` … `ELSE`, `DO` (count, `TO`/`BY`, `WHILE`, `UNTIL`,
//!   `FOREVER`), `SELECT`/`WHEN`/`OTHERWISE`, `SIGNAL`, `BREAK`/`ITERATE`
//! - User-defined procedures with a recursion ceiling
//! - `PARSE` templates ([`parse`])
//! - ~30 built-in functions plus the host's BBS functions ([`host`])
//!
//! # Quick start
//!
//! ```rust
//! use arexx::bbs::LocalBbs;
//! use arexx::script::Interpreter;
//!
//! let mut interp = Interpreter::new(LocalBbs::default());
//! let result = interp.execute("X = 6\nSAY 'x = ' || X", &[]);
//! assert!(result.success);
//! assert_eq!(result.output, vec!["x = 6"]);
//! ```

pub mod builtins;
pub mod error;
pub mod eval;
pub mod host;
pub mod interp;
pub mod parse;
pub mod scope;
pub mod source;
pub mod value;

// Re-exports for convenience.
pub use error::{HostError, ScriptError};
pub use eval::EvalContext;
pub use host::{BbsFunction, HostContext, SessionInfo, UserInfo};
pub use interp::{EngineConfig, ExecResult, Interpreter};
pub use value::Value;
