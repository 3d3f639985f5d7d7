//! A self-contained BBS host.
//!
//! [`LocalBbs`] implements the whole [`BbsFunction`] catalogue over an
//! in-memory board ([`BbsState`]: conferences, messages, per-user fields,
//! file areas, queued input, event log).  Several sessions may share one
//! board through [`LocalBbs::session_for`]; the state sits behind an
//! `Arc<Mutex<_>>` so sessions can run on different threads.
//!
//! READFILE and WRITEFILE are confined to an optional sandbox directory.
//! Without one, file access fails.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

use crate::script::{BbsFunction, HostContext, HostError, SessionInfo, UserInfo, Value};

// ── Board state ───────────────────────────────────────────────────────────────

/// A posted message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: usize,
    pub conference: i64,
    pub message_base: i64,
    pub from: String,
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
    pub posted: DateTime<Local>,
}

/// A file area: a name and the files listed in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileArea {
    pub name: String,
    pub files: Vec<String>,
}

/// Everything sessions on one board share.
#[derive(Debug, Clone)]
pub struct BbsState {
    /// Conference number → name.
    pub conferences: BTreeMap<i64, String>,
    pub messages: Vec<Message>,
    /// `(user id, FIELD)` → value.
    pub user_fields: HashMap<(i64, String), String>,
    /// Area number → area.
    pub file_areas: BTreeMap<i64, FileArea>,
    /// Lines handed out by GETINPUT, oldest first.
    pub input: VecDeque<String>,
    /// Every LOGEVENT message, as `user: text`.
    pub events: Vec<String>,
}

impl Default for BbsState {
    fn default() -> Self {
        BbsState {
            conferences: BTreeMap::from([(1, "Main".to_owned())]),
            messages: Vec::new(),
            user_fields: HashMap::new(),
            file_areas: BTreeMap::from([(1, FileArea { name: "Uploads".to_owned(), files: Vec::new() })]),
            input: VecDeque::new(),
            events: Vec::new(),
        }
    }
}

// ── LocalBbs ──────────────────────────────────────────────────────────────────

/// One user's session on a shared in-memory board.
#[derive(Debug, Clone, Default)]
pub struct LocalBbs {
    user: UserInfo,
    session: SessionInfo,
    state: Arc<Mutex<BbsState>>,
    sandbox: Option<PathBuf>,
    /// Every line sent to this session (SAY and BBSWRITE), in order.
    sent: Vec<String>,
}

impl LocalBbs {
    pub fn new(user: UserInfo, session: SessionInfo) -> Self {
        LocalBbs { user, session, ..Default::default() }
    }

    /// Confine READFILE/WRITEFILE to `dir`.
    pub fn with_sandbox(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sandbox = Some(dir.into());
        self
    }

    /// Replace the board state this session works on.
    pub fn with_state(mut self, state: BbsState) -> Self {
        self.state = Arc::new(Mutex::new(state));
        self
    }

    /// A new session for `user` on the same board, with the same sandbox.
    pub fn session_for(&self, user: UserInfo) -> Self {
        LocalBbs {
            user,
            session: self.session,
            state: Arc::clone(&self.state),
            sandbox: self.sandbox.clone(),
            sent: Vec::new(),
        }
    }

    /// Lock the shared board state.
    ///
    /// A panic in another session cannot leave the state half-updated in a
    /// way later sessions care about, so a poisoned lock is recovered.
    pub fn state(&self) -> MutexGuard<'_, BbsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a line for GETINPUT.
    pub fn queue_input(&self, line: impl Into<String>) {
        self.state().input.push_back(line.into());
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    /// Resolve a script-supplied path inside the sandbox.
    fn sandbox_path(&self, rel: &str) -> Result<PathBuf, HostError> {
        let root = self
            .sandbox
            .as_ref()
            .ok_or_else(|| HostError::new("file access is disabled"))?;
        let rel_path = Path::new(rel);
        let clean = !rel.is_empty()
            && rel_path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !clean {
            log::warn!(target: "arexx::bbs", "{}: rejected path {rel:?}", self.user.username);
            return Err(HostError::new(format!("path `{rel}` is outside the sandbox")));
        }
        Ok(root.join(rel_path))
    }

    fn post_message(&mut self, args: &[Value]) -> Result<Value, HostError> {
        let subject = str_arg(BbsFunction::PostMessage, args, 0)?;
        let body = str_arg(BbsFunction::PostMessage, args, 1)?;
        let mut state = self.state();
        let id = state.messages.len() + 1;
        state.messages.push(Message {
            id,
            conference: self.session.conference,
            message_base: self.session.message_base,
            from: self.user.username.clone(),
            to: args.get(2).map(Value::as_str).filter(|s| !s.is_empty()),
            subject,
            body,
            posted: Local::now(),
        });
        log::debug!(target: "arexx::bbs", "message #{id} posted by {}", self.user.username);
        Ok(Value::from(id))
    }
}

fn arg(func: BbsFunction, args: &[Value], i: usize) -> Result<&Value, HostError> {
    args.get(i)
        .ok_or_else(|| HostError::new(format!("{}: argument {} missing", func.name(), i + 1)))
}

fn str_arg(func: BbsFunction, args: &[Value], i: usize) -> Result<String, HostError> {
    arg(func, args, i).map(Value::as_str)
}

fn int_arg(func: BbsFunction, args: &[Value], i: usize) -> Result<i64, HostError> {
    let v = arg(func, args, i)?;
    v.as_int()
        .ok_or_else(|| HostError::new(format!("{}: `{v}` is not a number", func.name())))
}

impl HostContext for LocalBbs {
    fn user(&self) -> &UserInfo {
        &self.user
    }

    fn session(&self) -> &SessionInfo {
        &self.session
    }

    fn emit(&mut self, line: &str) {
        self.sent.push(line.to_owned());
    }

    fn call_bbs(&mut self, func: BbsFunction, args: &[Value]) -> Result<Value, HostError> {
        Ok(match func {
            BbsFunction::GetUserName => Value::Str(self.user.username.clone()),
            BbsFunction::GetSecLevel => Value::from(self.user.sec_level),
            BbsFunction::GetUserId => Value::from(self.user.id),
            BbsFunction::GetConf => Value::from(self.session.conference),
            BbsFunction::GetMsgBase => Value::from(self.session.message_base),
            BbsFunction::JoinConf => {
                let conf = int_arg(func, args, 0)?;
                if !self.state().conferences.contains_key(&conf) {
                    log::warn!(target: "arexx::bbs", "{}: no conference {conf}", self.user.username);
                    return Ok(Value::Bool(false));
                }
                self.session.conference = conf;
                self.session.message_base = 1;
                Value::Bool(true)
            }
            BbsFunction::GetInput => {
                if let Some(prompt) = args.first() {
                    self.emit(&prompt.as_str());
                }
                Value::Str(self.state().input.pop_front().unwrap_or_default())
            }
            BbsFunction::BbsWrite => {
                self.emit(&str_arg(func, args, 0)?);
                Value::default()
            }
            BbsFunction::PostMessage => self.post_message(args)?,
            BbsFunction::GetMsgCount => {
                let conf = match args.first() {
                    Some(_) => int_arg(func, args, 0)?,
                    None => self.session.conference,
                };
                let n = self.state().messages.iter().filter(|m| m.conference == conf).count();
                Value::from(n)
            }
            BbsFunction::GetUserField => {
                let key = (self.user.id, str_arg(func, args, 0)?.to_ascii_uppercase());
                Value::Str(self.state().user_fields.get(&key).cloned().unwrap_or_default())
            }
            BbsFunction::SetUserField => {
                let key = (self.user.id, str_arg(func, args, 0)?.to_ascii_uppercase());
                let value = str_arg(func, args, 1)?;
                self.state().user_fields.insert(key, value);
                Value::default()
            }
            BbsFunction::GetFileCount => {
                let area = int_arg(func, args, 0)?;
                let n = self.state().file_areas.get(&area).map_or(0, |a| a.files.len());
                Value::from(n)
            }
            BbsFunction::GetFileArea => {
                let area = int_arg(func, args, 0)?;
                Value::Str(self.state().file_areas.get(&area).map(|a| a.name.clone()).unwrap_or_default())
            }
            BbsFunction::ReadFile => {
                let rel = str_arg(func, args, 0)?;
                let path = self.sandbox_path(&rel)?;
                let text = std::fs::read_to_string(&path).map_err(|e| HostError::new(format!("{rel}: {e}")))?;
                Value::Str(text)
            }
            BbsFunction::WriteFile => {
                let rel = str_arg(func, args, 0)?;
                let text = str_arg(func, args, 1)?;
                let path = self.sandbox_path(&rel)?;
                std::fs::write(&path, &text).map_err(|e| HostError::new(format!("{rel}: {e}")))?;
                Value::from(text.len())
            }
            BbsFunction::LogEvent => {
                let text = str_arg(func, args, 0)?;
                log::info!(target: "arexx::bbs", "{}: {text}", self.user.username);
                self.state().events.push(format!("{}: {text}", self.user.username));
                Value::default()
            }
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
