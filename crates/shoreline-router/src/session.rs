//! In-memory per-session state.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use shoreline_core::{codec, Msg, SessionId};
use shoreline_store::SessionStore;

use crate::error::Result;
use crate::subject::Subject;

/// `key → sender → most recent state-update Msg`, the table the match
/// predicate consults for replay deduplication (spec.md §4.3 `IdenticalTo`).
pub type StateIndex = HashMap<String, HashMap<String, Msg>>;

/// One registered listener's outbound mailbox, plus the bits of it the
/// match predicate and the removal path need.
pub struct ListenerHandle {
    /// Opaque identity, used to remove a listener by identity rather than
    /// by subject name — the subject-name slot may have already been
    /// overwritten by a reconnect (spec.md §4.1 `removeListeners`).
    pub id: u64,
    pub tx: mpsc::Sender<Bytes>,
}

/// All in-memory state for one `(instance, id)` session.
///
/// Every field here is mutated only from the router's event loop task,
/// with one exception: `last_state_update` is also *read* by a listener's
/// Sync routine running on its own accept task, so it alone is wrapped in
/// a lock (spec.md §5).
pub struct Session {
    pub instance: String,
    pub id: i64,
    pub nonce: String,
    pub listeners: HashMap<String, ListenerHandle>,
    pub subjects: HashMap<String, Subject>,
    last_state_update: Arc<RwLock<StateIndex>>,
    pub last_cfg: Option<Msg>,
}

impl Session {
    pub fn new(instance: impl Into<String>, id: i64) -> Self {
        Self {
            instance: instance.into(),
            id,
            nonce: Uuid::new_v4().to_string(),
            listeners: HashMap::new(),
            subjects: HashMap::new(),
            last_state_update: Arc::new(RwLock::new(HashMap::new())),
            last_cfg: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.instance.clone(), self.id)
    }

    /// A cloneable handle onto this session's state-update index, handed to
    /// accept tasks so `Sync` can evaluate the match predicate without
    /// routing every historical message through the router loop (spec.md
    /// §5: the one field read cross-task, guarded by its own lock).
    pub fn state_index(&self) -> Arc<RwLock<StateIndex>> {
        self.last_state_update.clone()
    }

    /// The most recent state-update message observed for `(key, sender)`
    /// in the current nonce epoch, if any. Used by the shared match
    /// predicate; takes the read side of the lock.
    pub fn last_state_update_for(&self, key: &str, sender: &str) -> Option<Msg> {
        self.last_state_update
            .read()
            .get(key)
            .and_then(|by_sender| by_sender.get(sender))
            .cloned()
    }

    /// Record `msg` as the latest state-update for its `(key, sender)`.
    /// Takes the write side of the lock; called from the router loop
    /// before dispatch so that the match predicate (evaluated inside
    /// `receive`, a few lines later) already sees the new value.
    pub fn record_state_update(&self, msg: &Msg) {
        self.last_state_update
            .write()
            .entry(msg.key.clone())
            .or_default()
            .insert(msg.sender.clone(), msg.clone());
    }

    /// Look up a subject, lazily creating it and synthesizing its
    /// `__register__` message on first reference (spec.md §4.2). Returns
    /// the subject's current state.
    ///
    /// Guarantees at-most-one `Subject` per `(session, name)`: callers
    /// only ever reach this through the router's `request_subject`
    /// channel, which serializes concurrent requests for the same name.
    pub async fn subject(&mut self, store: &SessionStore, name: &str, now_ns: i64) -> Result<Subject> {
        if let Some(existing) = self.subjects.get(name) {
            return Ok(existing.clone());
        }

        let subject = Subject::new(name);
        self.subjects.insert(name.to_string(), subject.clone());

        let register = Msg::register(&self.instance, self.id, &self.nonce, name, now_ns);
        self.receive(store, &register).await?;

        Ok(subject)
    }

    /// Persist (unless control-only) and fan out to every listener whose
    /// match predicate accepts this message (spec.md §4.2 `Receive`).
    pub async fn receive(&self, store: &SessionStore, msg: &Msg) -> Result<()> {
        use shoreline_core::control::ControlKey;
        let skip_persist = matches!(
            ControlKey::parse(&msg.key),
            Some(ControlKey::Reset) | Some(ControlKey::Delete)
        );
        if !skip_persist {
            store.save_message(msg).await?;
        }

        let bytes = Bytes::from(codec::encode(msg)?);

        for (subject_name, listener) in self.listeners.iter() {
            // Resolved fresh on every dispatch, never cached at connect
            // time: a `__set_period__` must be visible to an
            // already-registered listener for that subject immediately,
            // the same way the subject's period and a listener's view of
            // it are the same value, not a copy taken once (spec.md §4.3,
            // §8).
            let period = self
                .subjects
                .get(subject_name)
                .map(|subject| subject.period)
                .unwrap_or(-1);
            if crate::listener::matches(&self.last_state_update, msg, period) {
                if listener.tx.send(bytes.clone()).await.is_err() {
                    warn!(
                        session = %self.session_id(),
                        "listener mailbox closed while delivering {}",
                        msg.key
                    );
                }
            }
        }

        Ok(())
    }

    /// Rotate the nonce and clear subjects/state-update history. Returns
    /// the previous `last_cfg`, if any, so the caller (the router, which
    /// owns re-dispatch) can replay it under the new nonce — `last_cfg`
    /// itself is left untouched here; the replay path will set it again.
    pub fn begin_reset(&mut self) -> Option<Msg> {
        self.nonce = Uuid::new_v4().to_string();
        self.subjects.clear();
        *self.last_state_update.write() = HashMap::new();
        self.last_cfg.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoreline_store::MemoryStore;
    use std::sync::Arc;

    fn new_store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn subject_is_created_lazily_and_only_once() {
        let store = new_store();
        let mut session = Session::new("x", 7);

        let first = session.subject(&store, "alice", 0).await.unwrap();
        let second = session.subject(&store, "alice", 0).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(session.subjects.len(), 1);
    }

    #[tokio::test]
    async fn subject_creation_persists_a_register_message() {
        let store = new_store();
        let mut session = Session::new("x", 7);
        session.subject(&store, "alice", 42).await.unwrap();

        let log = store.session_ids().await.unwrap();
        assert_eq!(log, vec![session.session_id()]);
    }

    #[tokio::test]
    async fn record_state_update_is_visible_to_last_state_update_for() {
        let session = Session::new("x", 7);
        let msg = Msg {
            instance: "x".into(),
            session: 7,
            nonce: session.nonce.clone(),
            sender: "alice".into(),
            period: 1,
            group: 0,
            state_update: true,
            time: 1,
            client_time: 0,
            key: "score".into(),
            value: serde_json::json!(2),
        };
        session.record_state_update(&msg);

        let latest = session.last_state_update_for("score", "alice").unwrap();
        assert!(latest.identical_to(&msg));
    }

    #[tokio::test]
    async fn begin_reset_rotates_nonce_and_clears_subjects() {
        let store = new_store();
        let mut session = Session::new("x", 7);
        session.subject(&store, "alice", 0).await.unwrap();
        let old_nonce = session.nonce.clone();

        session.begin_reset();

        assert_ne!(session.nonce, old_nonce);
        assert!(session.subjects.is_empty());
        assert!(session.last_state_update_for("score", "alice").is_none());
    }

    #[tokio::test]
    async fn a_later_set_period_is_visible_to_an_already_registered_listener() {
        let store = new_store();
        let mut session = Session::new("x", 7);
        session.subject(&store, "alice", 0).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        session
            .listeners
            .insert("alice".to_string(), ListenerHandle { id: 1, tx });

        // alice's period advances to 5 without her listener reconnecting —
        // e.g. via a `__set_period__` that mutates `session.subjects["alice"]`
        // directly, the way the router's dispatch does.
        session.subjects.get_mut("alice").unwrap().period = 5;

        let earlier_period_chat = Msg {
            instance: "x".into(),
            session: 7,
            nonce: session.nonce.clone(),
            sender: "bob".into(),
            period: 2,
            group: 0,
            state_update: false,
            time: 0,
            client_time: 0,
            key: "chat".into(),
            value: serde_json::json!(null),
        };
        session.receive(&store, &earlier_period_chat).await.unwrap();
        assert!(
            rx.try_recv().is_err(),
            "a listener whose subject period advanced to 5 must no longer see period-2 traffic"
        );

        let current_period_chat = Msg {
            period: 5,
            ..earlier_period_chat
        };
        session.receive(&store, &current_period_chat).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
