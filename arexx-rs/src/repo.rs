//! Script repositories.
//!
//! Whatever runs scripts is handed a [`ScriptRepository`] explicitly; there
//! is no process-wide registry.  Two implementations are provided:
//!
//! - [`DirRepository`] reads `<root>/<name>.rexx` and lists the scripts for a
//!   trigger from `<root>/<trigger>/*.rexx`.
//! - [`MemoryRepository`] keeps scripts in a map, for embedding and tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::trigger::Trigger;

/// Script file extension.
pub const SCRIPT_EXT: &str = "rexx";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("script `{0}` not found")]
    NotFound(String),
    #[error("invalid script name `{0}`")]
    InvalidName(String),
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Source of script text, looked up by name or by trigger.
pub trait ScriptRepository: Send + Sync {
    /// Load the source of the script called `name`.
    fn load(&self, name: &str) -> Result<String, RepoError>;

    /// Names of every script registered for `trigger`, in run order.  Each
    /// name can be passed to [`load`](ScriptRepository::load).
    fn scripts_for(&self, trigger: Trigger) -> Result<Vec<String>, RepoError>;
}

/// Split `name` into path components, rejecting anything that could leave
/// the repository root.
fn name_components(name: &str) -> Result<Vec<&str>, RepoError> {
    let parts: Vec<&str> = name.split('/').collect();
    let ok = parts.iter().all(|p| {
        !p.is_empty()
            && *p != "."
            && *p != ".."
            && p.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    });
    if ok {
        Ok(parts)
    } else {
        Err(RepoError::InvalidName(name.to_owned()))
    }
}

// ── DirRepository ─────────────────────────────────────────────────────────────

/// Scripts stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct DirRepository {
    root: PathBuf,
}

impl DirRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirRepository { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, RepoError> {
        let name = name.strip_suffix(".rexx").unwrap_or(name);
        let parts = name_components(name)?;
        let mut path = self.root.clone();
        if let Some((file, dirs)) = parts.split_last() {
            path.extend(dirs);
            path.push(format!("{file}.{SCRIPT_EXT}"));
        }
        Ok(path)
    }
}

impl ScriptRepository for DirRepository {
    fn load(&self, name: &str) -> Result<String, RepoError> {
        let path = self.path_for(name)?;
        log::debug!("loading script {}", path.display());
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RepoError::NotFound(name.to_owned()),
            _ => RepoError::Io { path, source: e },
        })
    }

    fn scripts_for(&self, trigger: Trigger) -> Result<Vec<String>, RepoError> {
        let dir = self.root.join(trigger.name());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RepoError::Io { path: dir, source: e }),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| RepoError::Io { path: dir.clone(), source: e })?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(format!("{}/{stem}", trigger.name()));
            }
        }
        names.sort();
        log::debug!("{} script(s) for trigger {trigger}", names.len());
        Ok(names)
    }
}

// ── MemoryRepository ──────────────────────────────────────────────────────────

/// Scripts held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    scripts: HashMap<String, String>,
    bindings: HashMap<Trigger, Vec<String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a script.
    pub fn insert(&mut self, name: impl Into<String>, src: impl Into<String>) {
        self.scripts.insert(name.into(), src.into());
    }

    /// Register `name` to run on `trigger`, after any already registered.
    pub fn bind(&mut self, trigger: Trigger, name: impl Into<String>) {
        self.bindings.entry(trigger).or_default().push(name.into());
    }
}

impl ScriptRepository for MemoryRepository {
    fn load(&self, name: &str) -> Result<String, RepoError> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(name.to_owned()))
    }

    fn scripts_for(&self, trigger: Trigger) -> Result<Vec<String>, RepoError> {
        Ok(self.bindings.get(&trigger).cloned().unwrap_or_default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn dir_load_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "hello.rexx", "SAY 'hi'");
        let repo = DirRepository::new(dir.path());
        assert_eq!(repo.load("hello").unwrap(), "SAY 'hi'");
        assert_eq!(repo.load("hello.rexx").unwrap(), "SAY 'hi'");
    }

    #[test]
    fn dir_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let repo = DirRepository::new(dir.path());
        assert!(matches!(repo.load("nope"), Err(RepoError::NotFound(n)) if n == "nope"));
    }

    #[test]
    fn dir_rejects_escaping_names() {
        let repo = DirRepository::new("/srv/scripts");
        for bad in ["../etc/passwd", "/abs", "a//b", "", "sp ace", "./x"] {
            assert!(
                matches!(repo.load(bad), Err(RepoError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn dir_scripts_for_trigger_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "login/20-news.rexx", "SAY news");
        write(dir.path(), "login/10-welcome.rexx", "SAY welcome");
        write(dir.path(), "login/readme.txt", "not a script");
        write(dir.path(), "logoff/bye.rexx", "SAY bye");
        let repo = DirRepository::new(dir.path());

        let names = repo.scripts_for(Trigger::Login).unwrap();
        assert_eq!(names, vec!["login/10-welcome", "login/20-news"]);
        assert_eq!(repo.load(&names[0]).unwrap(), "SAY welcome");
    }

    #[test]
    fn dir_trigger_without_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = DirRepository::new(dir.path());
        assert!(repo.scripts_for(Trigger::Timer).unwrap().is_empty());
    }

    #[test]
    fn memory_repository() {
        let mut repo = MemoryRepository::new();
        repo.insert("greet", "SAY hello");
        repo.bind(Trigger::Login, "greet");
        repo.bind(Trigger::Login, "other");
        assert_eq!(repo.load("greet").unwrap(), "SAY hello");
        assert_eq!(repo.scripts_for(Trigger::Login).unwrap(), vec!["greet", "other"]);
        assert!(repo.scripts_for(Trigger::Logoff).unwrap().is_empty());
        assert!(matches!(repo.load("other"), Err(RepoError::NotFound(_))));
    }
}
