//! Connection bootstrap: parse the request path, resolve the subject,
//! register the listener, run Sync, then hand off to the send/receive
//! loops (spec.md §4.3, §6.2).

use tracing::{info, warn};

use shoreline_core::SessionId;
use shoreline_transport::{Accepted, TransportReceiver, TransportSender};

use crate::error::{Result, RouterError};
use crate::listener::{receive_loop, send_loop, sync};
use crate::router::RouterHandle;
use crate::subject::Subject;

/// Capacity of a listener's outbound mailbox (spec.md §5: "on the order of
/// 100-1000").
const LISTENER_QUEUE_CAPACITY: usize = 512;

/// `/<instance>/<session-id>/<subject-name>` or `/<session-id>/<subject-name>`
/// (instance defaults to empty).
struct Route {
    instance: String,
    session_id: i64,
    subject_name: String,
}

fn parse_path(path: &str) -> Result<Route> {
    let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
    let (instance, session_id, subject_name) = match parts.as_slice() {
        [instance, session_id, subject_name] => (*instance, *session_id, *subject_name),
        [session_id, subject_name] => ("", *session_id, *subject_name),
        _ => return Err(RouterError::MalformedPath(path.to_string())),
    };

    let session_id: i64 = session_id
        .parse()
        .map_err(|_| RouterError::MalformedPath(path.to_string()))?;

    Ok(Route {
        instance: instance.to_string(),
        session_id,
        subject_name: subject_name.to_string(),
    })
}

fn is_sentinel(name: &str) -> bool {
    name == "admin" || name == "listener"
}

/// Drives one accepted connection end to end: resolves routing, registers
/// the listener, replays history, then runs the send/receive loops until
/// the connection closes.
pub async fn run_connection<S, R>(accepted: Accepted<S, R>, router: RouterHandle)
where
    S: TransportSender + 'static,
    R: TransportReceiver + 'static,
{
    let Accepted { sender, receiver, addr, path } = accepted;

    let route = match parse_path(&path) {
        Ok(route) => route,
        Err(e) => {
            warn!(%addr, path = %path, "malformed connection path, closing: {e}");
            return;
        }
    };

    let session_id = SessionId::new(route.instance, route.session_id);

    let (subject, state_index) = if is_sentinel(&route.subject_name) {
        match router.request_session_handle(session_id.clone()).await {
            Ok(state_index) => (Subject::sentinel(route.subject_name.clone()), state_index),
            Err(e) => {
                warn!(%addr, session = %session_id, "failed to resolve session handle: {e}");
                return;
            }
        }
    } else {
        match router.request_subject(session_id.clone(), route.subject_name.clone()).await {
            Ok(subject) => match router.request_session_handle(session_id.clone()).await {
                Ok(state_index) => (subject, state_index),
                Err(e) => {
                    warn!(%addr, session = %session_id, "failed to resolve session handle: {e}");
                    return;
                }
            },
            Err(e) => {
                warn!(%addr, session = %session_id, subject = %route.subject_name, "failed to resolve subject: {e}");
                return;
            }
        }
    };

    let listener_id = router.next_listener_id();
    let (tx, rx) = tokio::sync::mpsc::channel(LISTENER_QUEUE_CAPACITY);

    if let Err(e) = router
        .new_listener(session_id.clone(), route.subject_name.clone(), listener_id, tx)
        .await
    {
        warn!(%addr, session = %session_id, "failed to register listener: {e}");
        return;
    }

    info!(%addr, session = %session_id, subject = %route.subject_name, "listener registered, starting sync");

    if let Err(e) = sync(&sender, &router.store, &session_id, &state_index, subject.period).await {
        warn!(%addr, session = %session_id, "sync failed: {e}");
        router
            .remove_listener(session_id, route.subject_name, listener_id)
            .await;
        return;
    }

    let send_task = tokio::spawn(send_loop(sender, rx));
    receive_loop(receiver, router, session_id, route.subject_name, listener_id).await;
    send_task.abort();
}
