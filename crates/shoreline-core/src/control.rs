//! The control-key sum type.
//!
//! The wire form stays a plain string in `Msg::key` (so old and new clients
//! interoperate); this type exists so the dispatch in the router is decoded
//! once, as a match on a closed enum, instead of repeated string comparisons
//! scattered across the handler and the match predicate.

use std::fmt;

/// Keys that bypass period filtering in the match predicate (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKey {
    Register,
    Pause,
    Reset,
    Delete,
    Error,
}

impl ControlKey {
    pub const REGISTER: &'static str = "__register__";
    pub const PAUSE: &'static str = "__pause__";
    pub const RESET: &'static str = "__reset__";
    pub const DELETE: &'static str = "__delete__";
    pub const ERROR: &'static str = "__error__";

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            Self::REGISTER => Some(ControlKey::Register),
            Self::PAUSE => Some(ControlKey::Pause),
            Self::RESET => Some(ControlKey::Reset),
            Self::DELETE => Some(ControlKey::Delete),
            Self::ERROR => Some(ControlKey::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKey::Register => Self::REGISTER,
            ControlKey::Pause => Self::PAUSE,
            ControlKey::Reset => Self::RESET,
            ControlKey::Delete => Self::DELETE,
            ControlKey::Error => Self::ERROR,
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `__set_*__` keys that mutate session/subject state rather than
/// merely bypassing period filtering. Kept separate from [`ControlKey`]
/// because these are *not* in the match predicate's control set — a
/// `__set_period__` message is still filtered by period like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetKey {
    Period,
    Group,
    Page,
    Config,
}

impl SetKey {
    pub const SET_PERIOD: &'static str = "__set_period__";
    pub const SET_GROUP: &'static str = "__set_group__";
    pub const SET_PAGE: &'static str = "__set_page__";
    pub const SET_CONFIG: &'static str = "__set_config__";

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            Self::SET_PERIOD => Some(SetKey::Period),
            Self::SET_GROUP => Some(SetKey::Group),
            Self::SET_PAGE => Some(SetKey::Page),
            Self::SET_CONFIG => Some(SetKey::Config),
            _ => None,
        }
    }
}
