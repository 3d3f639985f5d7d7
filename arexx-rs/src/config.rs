//! `arexx.conf` configuration file parser.
//!
//! The file is a list of settings, one per line:
//!
//! | Line | Action |
//! |------|--------|
//! | `<name> = <value>` | set a key (value may be double-quoted) |
//! | Lines starting with `;` or `#` | comment, ignored |
//! | Blank lines | ignored |
//!
//! Recognised keys:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `recursion_limit` | procedure nesting ceiling (default 100) |
//! | `trace` | start every run with TRACE on (`on`/`off`, `1`/`0`, …) |
//! | `script_dir` | root of the script repository |
//! | `sandbox_dir` | directory READFILE/WRITEFILE are confined to |
//! | `username`, `sec_level`, `user_id` | the user scripts run as |
//! | `conference`, `message_base` | starting session position |
//!
//! Unknown keys and bad values are reported as [`ConfigError`]s but do not
//! stop the rest of the file from loading.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::script::{EngineConfig, SessionInfo, UserInfo};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "ARXBBS_CONFIG";

/// File name searched for in the config directories.
pub const CONFIG_FILE_NAME: &str = "arexx.conf";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Parsed configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub engine: EngineConfig,
    pub script_dir: Option<PathBuf>,
    pub sandbox_dir: Option<PathBuf>,
    pub user: UserInfo,
    pub session: SessionInfo,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config string.
    ///
    /// Returns the config and a list of any errors; lines with errors leave
    /// the corresponding setting at its default.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError { line: lineno, message: format!("expected `name = value`, got `{line}`") });
                continue;
            };
            if let Err(message) = config.apply(key.trim(), &unquote(value.trim())) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        log::debug!("loading config from {}", path.display());
        Ok(Self::load_str(&s))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "recursion_limit" => {
                let n: usize = parse_num(key, value)?;
                if n == 0 {
                    return Err("recursion_limit must be at least 1".into());
                }
                self.engine.recursion_limit = n;
            }
            "trace" => self.engine.trace = parse_bool(value)?,
            "script_dir" => self.script_dir = Some(PathBuf::from(value)),
            "sandbox_dir" => self.sandbox_dir = Some(PathBuf::from(value)),
            "username" => {
                if value.is_empty() {
                    return Err("username cannot be empty".into());
                }
                self.user.username = value.to_owned();
            }
            "sec_level" => self.user.sec_level = parse_num(key, value)?,
            "user_id" => self.user.id = parse_num(key, value)?,
            "conference" => self.session.conference = parse_num(key, value)?,
            "message_base" => self.session.message_base = parse_num(key, value)?,
            _ => return Err(format!("unknown setting '{key}'")),
        }
        Ok(())
    }
}

// ── Value parsing ─────────────────────────────────────────────────────────────

/// Strip one pair of surrounding double quotes, honouring `\"` escapes.
fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return s.to_owned();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{key}: expected a number, got '{value}'"))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "yes" | "true" => Ok(true),
        "0" | "off" | "no" | "false" => Ok(false),
        _ => Err(format!("trace: expected on/off, got '{value}'")),
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Priority: `-f <file>` flag → `ARXBBS_CONFIG` env var → the platform config
/// directory (`~/.config/arexx/arexx.conf` on Linux) → `./arexx.conf`.  An
/// explicit or env-provided path is returned even if it does not exist so
/// that the caller can report it.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dirs) = ProjectDirs::from("", "", "arexx") {
        candidates.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    candidates.push(PathBuf::from(CONFIG_FILE_NAME));
    search(explicit, std::env::var_os(CONFIG_ENV), &candidates)
}

fn search(explicit: Option<&Path>, env: Option<OsString>, candidates: &[PathBuf]) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(p));
    }
    candidates.iter().find(|p| p.exists()).cloned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        let (cfg, errs) = Config::load_str("");
        assert!(errs.is_empty());
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.engine.recursion_limit, 100);
    }

    #[test]
    fn all_keys() {
        let src = "\
; board settings
recursion_limit = 25
trace = on
script_dir = /srv/bbs/scripts
sandbox_dir = /srv/bbs/files
username = \"The Sysop\"
sec_level = 255
user_id = 1
conference = 3
message_base = 2
";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.engine.recursion_limit, 25);
        assert!(cfg.engine.trace);
        assert_eq!(cfg.script_dir, Some(PathBuf::from("/srv/bbs/scripts")));
        assert_eq!(cfg.sandbox_dir, Some(PathBuf::from("/srv/bbs/files")));
        assert_eq!(cfg.user.username, "The Sysop");
        assert_eq!(cfg.user.sec_level, 255);
        assert_eq!(cfg.user.id, 1);
        assert_eq!(cfg.session.conference, 3);
        assert_eq!(cfg.session.message_base, 2);
    }

    #[test]
    fn comments_and_blank_lines() {
        let (cfg, errs) = Config::load_str("# hash\n\n; semi\nsec_level=20\n");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.user.sec_level, 20);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let (cfg, errs) = Config::load_str("TRACE = yes");
        assert!(errs.is_empty(), "{errs:?}");
        assert!(cfg.engine.trace);
    }

    #[test]
    fn errors_are_collected_with_line_numbers() {
        let src = "sec_level = high\nbogus = 1\nno equals here\nuser_id = 7";
        let (cfg, errs) = Config::load_str(src);
        assert_eq!(errs.len(), 3);
        assert_eq!(errs[0].line, 1);
        assert_eq!(errs[1].to_string(), "line 2: unknown setting 'bogus'");
        assert_eq!(errs[2].line, 3);
        // Good lines still apply.
        assert_eq!(cfg.user.id, 7);
        assert_eq!(cfg.user.sec_level, 10);
    }

    #[test]
    fn zero_recursion_limit_rejected() {
        let (cfg, errs) = Config::load_str("recursion_limit = 0");
        assert_eq!(errs.len(), 1);
        assert_eq!(cfg.engine.recursion_limit, 100);
    }

    #[test]
    fn unquote_escapes() {
        assert_eq!(unquote(r#""say \"hi\"""#), r#"say "hi""#);
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn load_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "username = alice\n").unwrap();
        let (cfg, errs) = Config::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.user.username, "alice");
        assert!(Config::load_file(&dir.path().join("missing.conf")).is_err());
    }

    #[test]
    fn search_priority() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.conf");
        std::fs::write(&present, "").unwrap();
        let absent = dir.path().join("absent.conf");
        let candidates = vec![absent.clone(), present.clone()];

        let explicit = PathBuf::from("given.conf");
        assert_eq!(
            search(Some(&explicit), Some("env.conf".into()), &candidates),
            Some(explicit)
        );
        assert_eq!(
            search(None, Some("env.conf".into()), &candidates),
            Some(PathBuf::from("env.conf"))
        );
        assert_eq!(search(None, Some("".into()), &candidates), Some(present));
        assert_eq!(search(None, None, &[absent]), None);
    }
}
