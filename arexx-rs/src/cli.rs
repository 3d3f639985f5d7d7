//! Command-line argument parsing.
//!
//! Usage:
//!   arexx [-d] [-f<config>] [-s<dir>] [-u<user>] [-i<line>]... <script> [args...]
//!   arexx [-d] [-f<config>] [-s<dir>] [-u<user>] [-i<line>]... -e<trigger> [args...]

use std::path::PathBuf;

use crate::trigger::Trigger;

pub const USAGE: &str = "\
Usage: arexx [-d] [-f<config>] [-s<dir>] [-u<user>] [-i<line>]... <script> [args...]
       arexx [-d] [-f<config>] [-s<dir>] [-u<user>] [-i<line>]... -e<trigger> [args...]";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Config file override (`-f<file>`).
    pub config: Option<PathBuf>,
    /// Script repository override (`-s<dir>`).
    pub script_dir: Option<PathBuf>,
    /// Run as this user (`-u<name>`).
    pub user: Option<String>,
    /// Lines queued for GETINPUT (`-i<line>`, repeatable).
    pub input: Vec<String>,
    /// What to run.
    pub action: Action,
    /// Arguments passed to the script(s) as `ARG1..ARGn`.
    pub script_args: Vec<String>,
}

/// What the binary should do.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum Action {
    /// Nothing to run; print usage.
    #[default]
    Usage,
    /// Run one script: a file path, or a name in the script repository.
    Run(String),
    /// Run every script registered for a trigger (`-e<trigger>`).
    Fire(Trigger),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
///
/// Flag processing stops at the script name (or `--`); everything after it
/// is passed to the script untouched.
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            break;
        }

        // Non-flag argument: the script, unless a trigger was already chosen.
        if !arg.starts_with('-') || arg == "-" {
            break;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            let flag = chars[j];
            match flag {
                'd' => args.debug = true,

                // Flags taking a value: -X<value> or -X <value>
                'f' | 's' | 'u' | 'i' | 'e' => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{flag} requires an argument"));
                    };
                    match flag {
                        'f' => args.config = Some(PathBuf::from(value)),
                        's' => args.script_dir = Some(PathBuf::from(value)),
                        'u' => args.user = Some(value),
                        'i' => args.input.push(value),
                        _ => args.action = Action::Fire(value.parse()?),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut rest = argv[i.min(argv.len())..].iter().cloned();
    if args.action == Action::Usage {
        if let Some(script) = rest.next() {
            args.action = Action::Run(script);
        }
    }
    args.script_args = rest.collect();

    Ok(args)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
