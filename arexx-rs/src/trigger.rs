//! Trigger event types.
//!
//! A trigger is the board event that causes scripts to run.  Each variant
//! has an explicit discriminant so that `trigger as usize` is a stable index
//! into [`Trigger::ALL`].

use std::fmt;
use std::str::FromStr;

// ── Trigger ───────────────────────────────────────────────────────────────────

/// An event the board can fire scripts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Trigger {
    Login       = 0,
    Logoff      = 1,
    MessagePost = 2,
    FileUpload  = 3,
    Timer       = 4,
    Manual      = 5,
}

impl Trigger {
    /// Every trigger, in discriminant order.
    pub const ALL: &'static [Trigger] = &[
        Trigger::Login,
        Trigger::Logoff,
        Trigger::MessagePost,
        Trigger::FileUpload,
        Trigger::Timer,
        Trigger::Manual,
    ];

    /// Total number of triggers.
    pub const COUNT: usize = 6;

    /// Canonical lowercase name; also the repository sub-directory that
    /// holds the trigger's scripts.
    pub fn name(self) -> &'static str {
        match self {
            Trigger::Login       => "login",
            Trigger::Logoff      => "logoff",
            Trigger::MessagePost => "message_post",
            Trigger::FileUpload  => "file_upload",
            Trigger::Timer       => "timer",
            Trigger::Manual      => "manual",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Trigger {
    type Err = String;

    /// Case-insensitive parse.  `-` and `_` are ignored, so `message-post`,
    /// `MESSAGE_POST` and `messagepost` all name the same trigger; `logout`
    /// and `upload` are accepted as aliases.
    fn from_str(s: &str) -> Result<Self, String> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "logout" => return Ok(Trigger::Logoff),
            "upload" => return Ok(Trigger::FileUpload),
            _ => {}
        }
        Trigger::ALL
            .iter()
            .copied()
            .find(|t| t.name().replace('_', "") == key)
            .ok_or_else(|| format!("invalid trigger {:?}", s))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
