//! The higher-level session persistence operations built on top of [`Store`]
//! (spec.md §6.1/§6.2): the message log, session-object blobs, and the
//! `sessions` set that boot-time recovery walks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use shoreline_core::{ids::ObjectType, Msg, SessionId, SessionObjectId};

use crate::error::{Error, Result};
use crate::store::Store;

/// Messages are fetched from the store in blocks of this size, to cap peak
/// memory usage when a session's log has grown large (spec.md §4.3.2).
const REPLAY_BLOCK_SIZE: i64 = 1000;

/// Session-scoped persistence, layered over the narrow [`Store`] capability.
pub struct SessionStore {
    store: Arc<dyn Store>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// All sessions known to the store (the `sessions` set), for boot-time
    /// recovery.
    pub async fn session_ids(&self) -> Result<Vec<SessionId>> {
        let members = self.store.smembers("sessions").await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            // members are `session:<instance>:<id>` strings
            let mut parts = member.splitn(3, ':');
            let (tag, instance, id) = (parts.next(), parts.next(), parts.next());
            match (tag, instance, id) {
                (Some("session"), Some(instance), Some(id)) => match id.parse::<i64>() {
                    Ok(id) => ids.push(SessionId::new(instance, id)),
                    Err(_) => warn!("ignoring malformed session member: {member}"),
                },
                _ => warn!("ignoring malformed session member: {member}"),
            }
        }
        Ok(ids)
    }

    /// Every session-object key tracked for a session (spec.md §6.1
    /// `session_objs:<instance>:<id>`), used by boot-time recovery to
    /// reconstruct in-memory subjects.
    pub async fn session_object_ids(&self, session: &SessionId) -> Result<Vec<SessionObjectId>> {
        let members = self.store.smembers(&session.objects_key()).await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match SessionObjectId::parse(&member) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("ignoring malformed session object key {member}: {e}"),
            }
        }
        Ok(ids)
    }

    pub async fn get_period(&self, id: &SessionObjectId) -> Result<i64> {
        let bytes = self
            .store
            .get(&id.key())
            .await?
            .ok_or_else(|| Error::Missing(id.key()))?;
        parse_decimal(&id.key(), &bytes)
    }

    pub async fn get_group(&self, id: &SessionObjectId) -> Result<i64> {
        self.get_period(id).await
    }

    pub async fn get_config(&self, id: &SessionObjectId) -> Result<Msg> {
        let bytes = self
            .store
            .get(&id.key())
            .await?
            .ok_or_else(|| Error::Missing(id.key()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode {
            key: id.key(),
            reason: e.to_string(),
        })
    }

    /// Write a session-object blob and track its key under
    /// `session_objs:<instance>:<id>` so boot-time recovery can find it.
    pub async fn set_session_object(&self, id: &SessionObjectId, data: Vec<u8>) -> Result<()> {
        self.store.set(&id.key(), data).await?;
        self.store.sadd(&id.session.objects_key(), &id.key()).await?;
        Ok(())
    }

    pub async fn set_period(&self, session: &SessionId, subject: &str, period: i64) -> Result<()> {
        let id = SessionObjectId::new(ObjectType::Period, session.clone(), subject);
        self.set_session_object(&id, period.to_string().into_bytes()).await
    }

    pub async fn set_group(&self, session: &SessionId, subject: &str, group: i64) -> Result<()> {
        let id = SessionObjectId::new(ObjectType::Group, session.clone(), subject);
        self.set_session_object(&id, group.to_string().into_bytes()).await
    }

    pub async fn set_page(&self, session: &SessionId, subject: &str, page: &str) -> Result<()> {
        let id = SessionObjectId::new(ObjectType::Page, session.clone(), subject);
        self.set_session_object(&id, page.as_bytes().to_vec()).await
    }

    pub async fn set_config(&self, session: &SessionId, subject: &str, msg: &Msg) -> Result<()> {
        let id = SessionObjectId::new(ObjectType::Config, session.clone(), subject);
        let bytes = serde_json::to_vec(msg).map_err(|e| Error::Decode {
            key: id.key(),
            reason: e.to_string(),
        })?;
        self.set_session_object(&id, bytes).await
    }

    /// Append a message to a session's log and register the session in the
    /// global `sessions` set (spec.md §6.1 `SaveMessage`).
    pub async fn save_message(&self, msg: &Msg) -> Result<()> {
        let session = SessionId::new(msg.instance.clone(), msg.session);
        let key = session.log_key();
        self.store.sadd("sessions", &key).await?;
        let bytes = serde_json::to_vec(msg).map_err(|e| Error::Decode {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.store.rpush(&key, bytes).await?;
        Ok(())
    }

    /// Stream a session's persisted message log in insertion order, fetched
    /// in fixed-size blocks to bound peak memory (spec.md §4.3.2). The
    /// blocking Redis reads happen on the accept task that calls this, never
    /// on the router's own event loop.
    pub fn messages(&self, session: &SessionId) -> ReceiverStream<Msg> {
        let (tx, rx) = mpsc::channel(REPLAY_BLOCK_SIZE as usize);
        let store = self.store.clone();
        let key = session.log_key();

        tokio::spawn(async move {
            let len = match store.llen(&key).await {
                Ok(len) => len,
                Err(e) => {
                    warn!("failed to read log length for {key}: {e}");
                    return;
                }
            };

            let mut offset = 0i64;
            while offset < len {
                let limit = (offset + REPLAY_BLOCK_SIZE).min(len) - 1;
                let block = match store.lrange(&key, offset, limit).await {
                    Ok(block) => block,
                    Err(e) => {
                        warn!("failed to read message block for {key}: {e}");
                        return;
                    }
                };
                for raw in block {
                    match serde_json::from_slice::<Msg>(&raw) {
                        Ok(msg) => {
                            if tx.send(msg).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("dropping malformed persisted message in {key}: {e}"),
                    }
                }
                offset += REPLAY_BLOCK_SIZE;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Delete a session's log, every tracked session-object blob, and its
    /// membership in the global `sessions` set (spec.md §4.2 `Reset`).
    ///
    /// Explicitly tracked-key deletion rather than a `KEYS` pattern scan
    /// (Open Question 4, resolved in favor of the cheaper variant: pattern
    /// scans are expensive against a large store and the `session_objs`
    /// set already gives us the exact key list).
    pub async fn delete_session(&self, session: &SessionId) -> Result<()> {
        let log_key = session.log_key();
        self.store.del(&log_key).await?;
        self.store.srem("sessions", &log_key).await?;

        let objects_key = session.objects_key();
        let object_keys = self.store.smembers(&objects_key).await?;
        for key in object_keys {
            self.store.del(&key).await?;
        }
        self.store.del(&objects_key).await?;
        Ok(())
    }
}

fn parse_decimal(key: &str, bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::Decode {
            key: key.to_string(),
            reason: "not a decimal integer".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use futures_util::StreamExt as _;

    fn new_store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn save_message_registers_session_and_appends_log() {
        let store = new_store();
        let msg = Msg::register("x", 7, "n1", "alice", 0);
        store.save_message(&msg).await.unwrap();

        let ids = store.session_ids().await.unwrap();
        assert_eq!(ids, vec![SessionId::new("x", 7)]);

        let replayed: Vec<Msg> = store.messages(&SessionId::new("x", 7)).collect().await;
        assert_eq!(replayed.len(), 1);
        assert!(replayed[0].identical_to(&msg));
    }

    #[tokio::test]
    async fn delete_session_clears_log_and_objects() {
        let store = new_store();
        let session = SessionId::new("x", 7);
        let msg = Msg::register("x", 7, "n1", "alice", 0);
        store.save_message(&msg).await.unwrap();
        store.set_period(&session, "alice", 3).await.unwrap();

        store.delete_session(&session).await.unwrap();

        assert_eq!(store.session_ids().await.unwrap(), Vec::new());
        let replayed: Vec<Msg> = store.messages(&session).collect().await;
        assert!(replayed.is_empty());
    }

    #[tokio::test]
    async fn session_object_ids_round_trip_through_boot_recovery() {
        let store = new_store();
        let session = SessionId::new("x", 7);
        store.set_period(&session, "alice", 3).await.unwrap();
        store.set_group(&session, "alice", 1).await.unwrap();

        let ids = store.session_object_ids(&session).await.unwrap();
        assert_eq!(ids.len(), 2);

        for id in &ids {
            match id.object_type {
                ObjectType::Period => assert_eq!(store.get_period(id).await.unwrap(), 3),
                ObjectType::Group => assert_eq!(store.get_group(id).await.unwrap(), 1),
                other => panic!("unexpected object type {other:?}"),
            }
        }
    }
}
