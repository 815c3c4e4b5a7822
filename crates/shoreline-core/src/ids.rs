//! Session and session-object identifiers.
//!
//! These are value types: two `SessionId`s with the same fields address the
//! same session, by definition (spec invariant: at most one `Session` per
//! `(instance, id)` ever exists concurrently — enforced by the router, not
//! by this type).

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// `(instance, id)` — the key under which a session is namespaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub instance: String,
    pub id: i64,
}

impl SessionId {
    pub fn new(instance: impl Into<String>, id: i64) -> Self {
        Self {
            instance: instance.into(),
            id,
        }
    }

    /// The Redis key for this session's message log: `session:<instance>:<id>`.
    pub fn log_key(&self) -> String {
        format!("session:{}:{}", self.instance, self.id)
    }

    /// The Redis key for this session's tracked session-object keys.
    pub fn objects_key(&self) -> String {
        format!("session_objs:{}:{}", self.instance, self.id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.instance, self.id)
    }
}

/// Which per-subject piece of session state a [`SessionObjectId`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Period,
    Group,
    Page,
    Config,
}

impl ObjectType {
    pub fn as_prefix(&self) -> &'static str {
        match self {
            ObjectType::Period => "period",
            ObjectType::Group => "group",
            ObjectType::Page => "page",
            ObjectType::Config => "config",
        }
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "period" => Ok(ObjectType::Period),
            "group" => Ok(ObjectType::Group),
            "page" => Ok(ObjectType::Page),
            "config" => Ok(ObjectType::Config),
            other => Err(Error::InvalidObjectKey(other.to_string())),
        }
    }
}

/// Addresses a single per-subject session object: `<type>:<instance>:<id>:<subject>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionObjectId {
    pub object_type: ObjectType,
    pub session: SessionId,
    pub subject: String,
}

impl SessionObjectId {
    pub fn new(object_type: ObjectType, session: SessionId, subject: impl Into<String>) -> Self {
        Self {
            object_type,
            session,
            subject: subject.into(),
        }
    }

    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.object_type.as_prefix(),
            self.session.instance,
            self.session.id,
            self.subject
        )
    }

    /// Parse a tracked key of the form `<type>:<instance>:<id>:<subject>`
    /// as stored in the `session_objs:<instance>:<id>` set.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut parts = raw.splitn(4, ':');
        let (object_type, instance, id, subject) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        );
        let (object_type, instance, id, subject) = match (object_type, instance, id, subject) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => return Err(Error::InvalidObjectKey(raw.to_string())),
        };
        let object_type: ObjectType = object_type.parse()?;
        let id: i64 = id
            .parse()
            .map_err(|_| Error::InvalidObjectKey(raw.to_string()))?;
        Ok(SessionObjectId::new(
            object_type,
            SessionId::new(instance, id),
            subject,
        ))
    }
}

impl fmt::Display for SessionObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_object_key() {
        let id = SessionObjectId::new(ObjectType::Period, SessionId::new("x", 7), "alice");
        assert_eq!(id.key(), "period:x:7:alice");
        assert_eq!(SessionObjectId::parse(&id.key()).unwrap(), id);
    }

    #[test]
    fn rejects_unknown_object_type() {
        assert!(SessionObjectId::parse("bogus:x:7:alice").is_err());
    }
}
