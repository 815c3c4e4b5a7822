//! The wire record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::ControlKey;
use crate::error::Error;

/// A single routed message.
///
/// Carries identity, routing keys, payload, and timestamps. Never mutated
/// after routing except for the handful of server-owned fields the router
/// stamps during `handle_message` (`time`, and `period`/`group` on the
/// `__set_period__`/`__set_group__` control paths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Msg {
    pub instance: String,
    pub session: i64,
    pub nonce: String,
    pub sender: String,
    pub period: i64,
    pub group: i64,
    #[serde(default)]
    pub state_update: bool,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub client_time: u64,
    pub key: String,
    pub value: Value,
}

impl Msg {
    /// Whether this message's key is one of the control keys that bypass
    /// period filtering (spec.md §4.3).
    pub fn is_control(&self) -> bool {
        ControlKey::parse(&self.key).is_some()
    }

    /// The `IdenticalTo` comparison from spec.md §4.3: every scalar field
    /// except `value` (and anything transport-specific, which this type
    /// never carries in the first place).
    pub fn identical_to(&self, other: &Msg) -> bool {
        self.instance == other.instance
            && self.session == other.session
            && self.nonce == other.nonce
            && self.sender == other.sender
            && self.period == other.period
            && self.group == other.group
            && self.state_update == other.state_update
            && self.time == other.time
            && self.client_time == other.client_time
            && self.key == other.key
    }

    /// Deserialize `self.value` as a typed payload, e.g. `Msg::parse_value::<SetPeriod>()`.
    pub fn parse_value<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        serde_json::from_value(self.value.clone()).map_err(|e| Error::MalformedValue {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    /// Build the `__register__` message synthesized on first reference to a
    /// subject (spec.md §4.2 `Subject(name)`).
    pub fn register(instance: &str, session: i64, nonce: &str, subject_name: &str, time: i64) -> Msg {
        Msg {
            instance: instance.to_string(),
            session,
            nonce: nonce.to_string(),
            sender: subject_name.to_string(),
            period: 0,
            group: 0,
            state_update: false,
            time,
            client_time: 0,
            key: ControlKey::Register.as_str().to_string(),
            value: serde_json::json!({ "user_id": subject_name }),
        }
    }

    /// Build the server-synthesized `__error__` message (spec.md §4.1.1).
    pub fn server_error(instance: &str, session: i64, nonce: &str, time: i64, reason: &str) -> Msg {
        Msg {
            instance: instance.to_string(),
            session,
            nonce: nonce.to_string(),
            sender: "server".to_string(),
            period: 0,
            group: 0,
            state_update: false,
            time,
            client_time: 0,
            key: ControlKey::Error.as_str().to_string(),
            value: serde_json::json!(reason),
        }
    }
}

/// Typed payload of a `__set_period__` message.
#[derive(Debug, Clone, Deserialize)]
pub struct SetPeriod {
    pub period: i64,
}

/// Typed payload of a `__set_group__` message.
#[derive(Debug, Clone, Deserialize)]
pub struct SetGroup {
    pub group: i64,
}

/// Typed payload of a `__set_page__` message.
#[derive(Debug, Clone, Deserialize)]
pub struct SetPage {
    pub page: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Msg {
        Msg {
            instance: "x".into(),
            session: 7,
            nonce: "n1".into(),
            sender: "alice".into(),
            period: 1,
            group: 0,
            state_update: true,
            time: 100,
            client_time: 5,
            key: "score".into(),
            value: serde_json::json!(1),
        }
    }

    #[test]
    fn identical_to_ignores_value() {
        let mut a = sample();
        let mut b = sample();
        a.value = serde_json::json!(1);
        b.value = serde_json::json!(2);
        assert!(a.identical_to(&b));
    }

    #[test]
    fn identical_to_respects_scalar_fields() {
        let a = sample();
        let mut b = sample();
        b.period = 2;
        assert!(!a.identical_to(&b));
    }

    #[test]
    fn round_trips_through_json() {
        let msg = sample();
        let encoded = serde_json::to_vec(&msg).unwrap();
        let decoded: Msg = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn parses_set_period_payload() {
        let mut msg = sample();
        msg.key = "__set_period__".into();
        msg.value = serde_json::json!({ "period": 3 });
        let parsed: SetPeriod = msg.parse_value().unwrap();
        assert_eq!(parsed.period, 3);
    }

    #[test]
    fn is_control_matches_only_control_keys() {
        let mut msg = sample();
        assert!(!msg.is_control());
        msg.key = "__register__".into();
        assert!(msg.is_control());
    }
}
