//! The single-writer event loop (spec.md §4.1) and the cheap, cloneable
//! [`RouterHandle`] every listener/accept task uses to reach it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use shoreline_core::ids::ObjectType;
use shoreline_core::{time, SessionId};
use shoreline_store::SessionStore;

use crate::error::{Result, RouterError};
use crate::message::{ControlKey, Msg, SetGroup, SetKey, SetPage, SetPeriod};
use crate::session::{ListenerHandle, Session, StateIndex};
use crate::subject::Subject;

const CHANNEL_CAPACITY: usize = 256;

pub struct NewListener {
    pub session: SessionId,
    pub subject_name: String,
    pub id: u64,
    pub tx: mpsc::Sender<Bytes>,
    ack: oneshot::Sender<()>,
}

pub struct RemoveListener {
    session: SessionId,
    subject_name: String,
    id: u64,
}

pub struct SubjectRequest {
    session: SessionId,
    name: String,
    response: oneshot::Sender<Subject>,
}

pub struct SessionHandleRequest {
    session: SessionId,
    response: oneshot::Sender<Arc<RwLock<StateIndex>>>,
}

/// A cheap, `Clone`-able handle to the router, given to every accept and
/// listener task so they never touch the router's private session maps
/// directly (spec.md §5: those maps are router-task-owned).
#[derive(Clone)]
pub struct RouterHandle {
    messages: mpsc::Sender<Msg>,
    new_listeners: mpsc::Sender<NewListener>,
    remove_listeners: mpsc::Sender<RemoveListener>,
    request_subject: mpsc::Sender<SubjectRequest>,
    request_session_handle: mpsc::Sender<SessionHandleRequest>,
    next_listener_id: Arc<AtomicU64>,
    /// Direct persistence access for Sync, which reads the store from its
    /// own accept task rather than routing replay through the event loop
    /// (spec.md §5: "Sync blocks on persistence reads ... on the accept
    /// task").
    pub store: Arc<SessionStore>,
}

impl RouterHandle {
    pub fn next_listener_id(&self) -> u64 {
        self.next_listener_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send_message(&self, msg: Msg) -> Result<()> {
        self.messages.send(msg).await.map_err(|_| RouterError::Shutdown)
    }

    /// `requestSubject`: looks up or lazily constructs the session, then
    /// looks up or lazily creates the named subject. Never call this for
    /// the `admin`/`listener` sentinel names — those bypass this channel
    /// entirely (spec.md §6.2); use [`RouterHandle::request_session_handle`]
    /// instead.
    pub async fn request_subject(&self, session: SessionId, name: String) -> Result<Subject> {
        let (response, rx) = oneshot::channel();
        self.request_subject
            .send(SubjectRequest { session, name, response })
            .await
            .map_err(|_| RouterError::Shutdown)?;
        rx.await.map_err(|_| RouterError::Shutdown)
    }

    /// Fetches the session's state-index handle without touching its
    /// subject map — the path sentinel (`admin`/`listener`) connections use
    /// to run Sync without being registered as a tracked Subject.
    pub async fn request_session_handle(&self, session: SessionId) -> Result<Arc<RwLock<StateIndex>>> {
        let (response, rx) = oneshot::channel();
        self.request_session_handle
            .send(SessionHandleRequest { session, response })
            .await
            .map_err(|_| RouterError::Shutdown)?;
        rx.await.map_err(|_| RouterError::Shutdown)
    }

    /// `newListeners`: registers under `session.listeners[subject_name]`,
    /// overwriting any prior listener there (a reconnect supersedes).
    pub async fn new_listener(
        &self,
        session: SessionId,
        subject_name: String,
        id: u64,
        tx: mpsc::Sender<Bytes>,
    ) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();
        self.new_listeners
            .send(NewListener { session, subject_name, id, tx, ack })
            .await
            .map_err(|_| RouterError::Shutdown)?;
        ack_rx.await.map_err(|_| RouterError::Shutdown)
    }

    /// `removeListeners`: best-effort, fire-and-forget — by the time this
    /// is called the connection is already gone, there is nothing useful
    /// to do with a failure here besides drop it.
    pub async fn remove_listener(&self, session: SessionId, subject_name: String, id: u64) {
        let _ = self
            .remove_listeners
            .send(RemoveListener { session, subject_name, id })
            .await;
    }
}

/// Owns every session/subject/listener map. Reachable only from its own
/// task; every other task talks to it through a [`RouterHandle`].
pub struct Router {
    sessions: HashMap<SessionId, Session>,
    store: Arc<SessionStore>,
    messages_rx: mpsc::Receiver<Msg>,
    new_listeners_rx: mpsc::Receiver<NewListener>,
    remove_listeners_rx: mpsc::Receiver<RemoveListener>,
    request_subject_rx: mpsc::Receiver<SubjectRequest>,
    request_session_handle_rx: mpsc::Receiver<SessionHandleRequest>,
}

impl Router {
    /// Boot-time recovery (spec.md §6.1): walk the persisted `sessions` set
    /// and, for each, its `session_objs:...` set, reconstructing in-memory
    /// subjects and `last_cfg` even though nobody is currently connected.
    pub async fn new(store: Arc<SessionStore>) -> Result<(Router, RouterHandle)> {
        let mut sessions = HashMap::new();

        for session_id in store.session_ids().await? {
            let mut session = Session::new(session_id.instance.clone(), session_id.id);

            for object_id in store.session_object_ids(&session_id).await? {
                match object_id.object_type {
                    ObjectType::Period => {
                        let period = store.get_period(&object_id).await?;
                        session
                            .subjects
                            .entry(object_id.subject.clone())
                            .or_insert_with(|| Subject::new(object_id.subject.clone()))
                            .period = period;
                    }
                    ObjectType::Group => {
                        let group = store.get_group(&object_id).await?;
                        session
                            .subjects
                            .entry(object_id.subject.clone())
                            .or_insert_with(|| Subject::new(object_id.subject.clone()))
                            .group = group;
                    }
                    ObjectType::Page => {
                        // not reflected into in-memory subject state, only
                        // ever read back out through the store directly.
                    }
                    ObjectType::Config => {
                        session.last_cfg = Some(store.get_config(&object_id).await?);
                    }
                }
            }

            info!(session = %session_id, "recovered session from persisted state");
            sessions.insert(session_id, session);
        }

        let (messages_tx, messages_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (new_listeners_tx, new_listeners_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (remove_listeners_tx, remove_listeners_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (request_subject_tx, request_subject_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (request_session_handle_tx, request_session_handle_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let router = Router {
            sessions,
            store: store.clone(),
            messages_rx,
            new_listeners_rx,
            remove_listeners_rx,
            request_subject_rx,
            request_session_handle_rx,
        };

        let handle = RouterHandle {
            messages: messages_tx,
            new_listeners: new_listeners_tx,
            remove_listeners: remove_listeners_tx,
            request_subject: request_subject_tx,
            request_session_handle: request_session_handle_tx,
            next_listener_id: Arc::new(AtomicU64::new(1)),
            store,
        };

        Ok((router, handle))
    }

    /// The event loop. Runs for the process lifetime; only returns (with
    /// `Err`) when a persistence write for a message's required save fails,
    /// which §7 treats as fatal — the caller is expected to log and exit.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                msg = self.messages_rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg).await?,
                        None => return Ok(()),
                    }
                }
                req = self.new_listeners_rx.recv() => {
                    match req {
                        Some(req) => self.handle_new_listener(req),
                        None => return Ok(()),
                    }
                }
                req = self.remove_listeners_rx.recv() => {
                    match req {
                        Some(req) => self.handle_remove_listener(req),
                        None => return Ok(()),
                    }
                }
                req = self.request_subject_rx.recv() => {
                    match req {
                        Some(req) => self.handle_subject_request(req).await,
                        None => return Ok(()),
                    }
                }
                req = self.request_session_handle_rx.recv() => {
                    match req {
                        Some(req) => self.handle_session_handle_request(req),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn handle_new_listener(&mut self, req: NewListener) {
        let session = self
            .sessions
            .entry(req.session.clone())
            .or_insert_with(|| Session::new(req.session.instance.clone(), req.session.id));
        session
            .listeners
            .insert(req.subject_name, ListenerHandle { id: req.id, tx: req.tx });
        let _ = req.ack.send(());
    }

    fn handle_remove_listener(&mut self, req: RemoveListener) {
        if let Some(session) = self.sessions.get_mut(&req.session) {
            let still_current = session
                .listeners
                .get(&req.subject_name)
                .map(|existing| existing.id == req.id)
                .unwrap_or(false);
            if still_current {
                session.listeners.remove(&req.subject_name);
            }
        }
    }

    async fn handle_subject_request(&mut self, req: SubjectRequest) {
        let session = self
            .sessions
            .entry(req.session.clone())
            .or_insert_with(|| Session::new(req.session.instance.clone(), req.session.id));

        match session.subject(&self.store, &req.name, time::now_ns()).await {
            Ok(subject) => {
                let _ = req.response.send(subject);
            }
            Err(e) => {
                error!(session = %req.session, subject = %req.name, "failed to create subject: {e}");
            }
        }
    }

    fn handle_session_handle_request(&mut self, req: SessionHandleRequest) {
        let session = self
            .sessions
            .entry(req.session.clone())
            .or_insert_with(|| Session::new(req.session.instance.clone(), req.session.id));
        let _ = req.response.send(session.state_index());
    }

    /// spec.md §4.1.1.
    async fn handle_message(&mut self, mut msg: Msg) -> Result<()> {
        msg.time = time::now_ns();
        let session_id = SessionId::new(msg.instance.clone(), msg.session);

        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session::new(msg.instance.clone(), msg.session));

        let session = self.sessions.get_mut(&session_id).expect("session just inserted");
        if msg.nonce != session.nonce {
            debug!(session = %session_id, "dropping message with stale nonce");
            return Ok(());
        }
        if msg.state_update {
            session.record_state_update(&msg);
        }

        if let Some(key) = ControlKey::parse(&msg.key) {
            match key {
                ControlKey::Reset => {
                    self.reset_session(&session_id).await?;
                }
                ControlKey::Delete => {
                    self.reset_session(&session_id).await?;
                    if let Some(session) = self.sessions.remove(&session_id) {
                        session.receive(&self.store, &msg).await?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        } else if let Some(set_key) = SetKey::parse(&msg.key) {
            let session = self.sessions.get_mut(&session_id).expect("session present");
            if let Err(e) = apply_set(session, &self.store, &session_id, set_key, &mut msg).await {
                warn!(session = %session_id, "transient persistence error applying {}: {e}", msg.key);
                let err_msg =
                    Msg::server_error(&msg.instance, msg.session, &msg.nonce, msg.time, &e.to_string());
                let session = self.sessions.get(&session_id).expect("session present");
                session.receive(&self.store, &err_msg).await?;
                return Ok(());
            }
        }

        let session = self.sessions.get(&session_id).expect("session present");
        session.receive(&self.store, &msg).await?;
        Ok(())
    }

    /// `Session.Reset`: rotates the nonce, clears subjects and state-update
    /// history, deletes the persisted session, and — if a config had been
    /// set — replays it under the new nonce so fresh state is reconstructed
    /// and persisted (spec.md §4.2).
    async fn reset_session(&mut self, session_id: &SessionId) -> Result<()> {
        let old_cfg = {
            let session = self.sessions.get_mut(session_id).expect("session present");
            session.begin_reset()
        };

        if let Err(e) = self.store.delete_session(session_id).await {
            warn!(session = %session_id, "failed to delete persisted session during reset: {e}");
        }

        if let Some(mut cfg) = old_cfg {
            let new_nonce = self
                .sessions
                .get(session_id)
                .expect("session present")
                .nonce
                .clone();
            cfg.nonce = new_nonce;
            // Recursion bottoms out immediately: the replayed message is a
            // `__set_config__`, never another `__reset__`/`__delete__`.
            Box::pin(self.handle_message(cfg)).await?;
        }

        Ok(())
    }
}

/// The `__set_*__` dispatch table (spec.md §4.1.1 step 5), pulled out as a
/// free function so it only needs disjoint borrows of `Session` and
/// `SessionStore` rather than all of `Router`.
async fn apply_set(
    session: &mut Session,
    store: &SessionStore,
    session_id: &SessionId,
    set_key: SetKey,
    msg: &mut Msg,
) -> Result<()> {
    match set_key {
        SetKey::Period => {
            let payload: SetPeriod = msg.parse_value()?;
            session
                .subjects
                .entry(msg.sender.clone())
                .or_insert_with(|| Subject::new(msg.sender.clone()))
                .period = payload.period;
            msg.period = payload.period;
            store.set_period(session_id, &msg.sender, payload.period).await?;
        }
        SetKey::Group => {
            let payload: SetGroup = msg.parse_value()?;
            session
                .subjects
                .entry(msg.sender.clone())
                .or_insert_with(|| Subject::new(msg.sender.clone()))
                .group = payload.group;
            msg.group = payload.group;
            store.set_group(session_id, &msg.sender, payload.group).await?;
        }
        SetKey::Page => {
            let payload: SetPage = msg.parse_value()?;
            store.set_page(session_id, &msg.sender, &payload.page).await?;
        }
        SetKey::Config => {
            session.last_cfg = Some(msg.clone());
            store.set_config(session_id, &msg.sender, msg).await?;
        }
    }
    Ok(())
}
