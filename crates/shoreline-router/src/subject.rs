//! A participant role within a session.

/// A participant role in a session, identified by name.
///
/// Admin/listener subjects are sentinels: `period = group = -1`, which
/// makes the match predicate's period filter vacuously true (they see
/// every period) and keeps them out of the persisted subject set — they
/// are created directly by the Accept Layer, never through the router's
/// `request_subject` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub period: i64,
    pub group: i64,
}

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            period: 0,
            group: 0,
        }
    }

    pub fn sentinel(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            period: -1,
            group: -1,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.name == "admin" || self.name == "listener"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_has_wildcard_period_and_group() {
        let admin = Subject::sentinel("admin");
        assert_eq!(admin.period, -1);
        assert_eq!(admin.group, -1);
        assert!(admin.is_sentinel());
    }

    #[test]
    fn regular_subject_starts_at_period_zero() {
        let s = Subject::new("alice");
        assert_eq!(s.period, 0);
        assert_eq!(s.group, 0);
        assert!(!s.is_sentinel());
    }
}
