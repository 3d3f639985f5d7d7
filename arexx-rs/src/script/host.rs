//! Host context ABI.
//!
//! The engine never touches sessions, sockets or storage directly.  Every
//! run is bound to one [`HostContext`] that supplies the current user and
//! session, an output sink, and the fixed catalogue of BBS functions in
//! [`BbsFunction`].  The engine only knows each function's name and arity;
//! what it does is entirely up to the host.

use std::str::FromStr;

use super::error::HostError;
use super::value::Value;

// ── User / session ────────────────────────────────────────────────────────────

/// The logged-in user a script runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub sec_level: i64,
    pub id: i64,
}

impl Default for UserInfo {
    fn default() -> Self {
        UserInfo { username: "GUEST".to_owned(), sec_level: 10, id: 0 }
    }
}

/// Where in the board the session currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub conference: i64,
    pub message_base: i64,
}

// ── HostContext ───────────────────────────────────────────────────────────────

/// Facilities a script run borrows from its surroundings.
pub trait HostContext {
    fn user(&self) -> &UserInfo;

    fn session(&self) -> &SessionInfo;

    /// Output sink; receives every line produced by `SAY`.
    fn emit(&mut self, line: &str);

    /// Invoke a BBS function.  Arguments have already been arity-checked
    /// against [`BbsFunction::arity`].
    fn call_bbs(&mut self, func: BbsFunction, args: &[Value]) -> Result<Value, HostError>;
}

// ── BbsFunction ───────────────────────────────────────────────────────────────

/// The fixed catalogue of host-provided BBS functions.
///
/// Discriminants are dense so that `func as usize` indexes
/// [`BbsFunction::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum BbsFunction {
    GetUserName   =  0,
    GetSecLevel   =  1,
    GetUserId     =  2,
    GetConf       =  3,
    GetMsgBase    =  4,
    JoinConf      =  5,
    GetInput      =  6,
    BbsWrite      =  7,
    PostMessage   =  8,
    GetMsgCount   =  9,
    GetUserField  = 10,
    SetUserField  = 11,
    GetFileCount  = 12,
    GetFileArea   = 13,
    ReadFile      = 14,
    WriteFile     = 15,
    LogEvent      = 16,
}

impl BbsFunction {
    /// Every function, in discriminant order.
    pub const ALL: &'static [BbsFunction] = &[
        BbsFunction::GetUserName,
        BbsFunction::GetSecLevel,
        BbsFunction::GetUserId,
        BbsFunction::GetConf,
        BbsFunction::GetMsgBase,
        BbsFunction::JoinConf,
        BbsFunction::GetInput,
        BbsFunction::BbsWrite,
        BbsFunction::PostMessage,
        BbsFunction::GetMsgCount,
        BbsFunction::GetUserField,
        BbsFunction::SetUserField,
        BbsFunction::GetFileCount,
        BbsFunction::GetFileArea,
        BbsFunction::ReadFile,
        BbsFunction::WriteFile,
        BbsFunction::LogEvent,
    ];

    /// Total number of catalogue entries.
    pub const COUNT: usize = 17;

    /// The uppercase name scripts use to call this function.
    pub fn name(self) -> &'static str {
        match self {
            BbsFunction::GetUserName  => "GETUSERNAME",
            BbsFunction::GetSecLevel  => "GETSECLEVEL",
            BbsFunction::GetUserId    => "GETUSERID",
            BbsFunction::GetConf      => "GETCONF",
            BbsFunction::GetMsgBase   => "GETMSGBASE",
            BbsFunction::JoinConf     => "JOINCONF",
            BbsFunction::GetInput     => "GETINPUT",
            BbsFunction::BbsWrite     => "BBSWRITE",
            BbsFunction::PostMessage  => "POSTMESSAGE",
            BbsFunction::GetMsgCount  => "GETMSGCOUNT",
            BbsFunction::GetUserField => "GETUSERFIELD",
            BbsFunction::SetUserField => "SETUSERFIELD",
            BbsFunction::GetFileCount => "GETFILECOUNT",
            BbsFunction::GetFileArea  => "GETFILEAREA",
            BbsFunction::ReadFile     => "READFILE",
            BbsFunction::WriteFile    => "WRITEFILE",
            BbsFunction::LogEvent     => "LOGEVENT",
        }
    }

    /// Accepted argument count as `(min, max)`.
    pub fn arity(self) -> (usize, usize) {
        match self {
            BbsFunction::GetUserName
            | BbsFunction::GetSecLevel
            | BbsFunction::GetUserId
            | BbsFunction::GetConf
            | BbsFunction::GetMsgBase => (0, 0),
            BbsFunction::GetMsgCount => (0, 1),
            BbsFunction::GetInput => (0, 1),
            BbsFunction::JoinConf
            | BbsFunction::BbsWrite
            | BbsFunction::GetUserField
            | BbsFunction::GetFileCount
            | BbsFunction::GetFileArea
            | BbsFunction::ReadFile
            | BbsFunction::LogEvent => (1, 1),
            BbsFunction::SetUserField | BbsFunction::WriteFile => (2, 2),
            // subject, body [, recipient]
            BbsFunction::PostMessage => (2, 3),
        }
    }

    /// `true` if `n` arguments are acceptable.
    pub fn accepts(self, n: usize) -> bool {
        let (min, max) = self.arity();
        (min..=max).contains(&n)
    }
}

impl FromStr for BbsFunction {
    type Err = String;

    /// Case-insensitive parse.
    fn from_str(s: &str) -> Result<Self, String> {
        let upper = s.to_ascii_uppercase();
        BbsFunction::ALL
            .iter()
            .copied()
            .find(|f| f.name() == upper)
            .ok_or_else(|| format!("unknown BBS function {:?}", s))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
