//! Per-connection listener activities: the match predicate, history replay
//! (`sync`), and the receive/send loops (spec.md §4.3).

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use shoreline_core::{codec, SessionId};
use shoreline_store::SessionStore;

use crate::error::Result;
use crate::message::Msg;
use crate::router::RouterHandle;
use crate::session::StateIndex;

/// The predicate shared by `sync` and live fan-out in `Session::receive`.
///
/// Group filtering is deliberately not implemented: the predicate never
/// compares `msg.group` against the listener's subject group, reproducing
/// the router's existing behavior rather than the stricter one its header
/// comment once implied.
pub fn matches(state_index: &RwLock<StateIndex>, msg: &Msg, period: i64) -> bool {
    if msg.is_control() {
        return true;
    }

    let same_period = msg.period >= period || msg.period == 0;
    if !same_period {
        return false;
    }

    if !msg.state_update {
        return true;
    }

    state_index
        .read()
        .get(&msg.key)
        .and_then(|by_sender| by_sender.get(&msg.sender))
        .map(|latest| latest.identical_to(msg))
        .unwrap_or(false)
}

/// Replay a session's persisted history to a freshly registered listener,
/// filtered by [`matches`], before live traffic is allowed to flow.
pub async fn sync<S: shoreline_transport::TransportSender>(
    sender: &S,
    store: &SessionStore,
    session: &SessionId,
    state_index: &RwLock<StateIndex>,
    period: i64,
) -> Result<()> {
    let mut history = store.messages(session);
    while let Some(msg) = history.next().await {
        if matches(state_index, &msg, period) {
            let bytes = Bytes::from(codec::encode(&msg)?);
            sender.send(bytes).await?;
        }
    }
    Ok(())
}

/// Drain inbound frames, decode each into a [`Msg`], and post it to the
/// router's `messages` channel. Terminates on decode error, read error, or
/// EOF, then requests this listener's own removal.
pub async fn receive_loop<R: shoreline_transport::TransportReceiver>(
    mut receiver: R,
    router: RouterHandle,
    session: SessionId,
    subject_name: String,
    listener_id: u64,
) {
    use shoreline_transport::TransportEvent;

    loop {
        match receiver.recv().await {
            Some(TransportEvent::Data(bytes)) => match codec::decode(&bytes) {
                Ok(msg) => {
                    if router.send_message(msg).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(session = %session, subject = %subject_name, "decode error, closing listener: {e}");
                    break;
                }
            },
            Some(TransportEvent::Disconnected { reason }) => {
                debug!(session = %session, subject = %subject_name, ?reason, "listener disconnected");
                break;
            }
            Some(TransportEvent::Error(reason)) => {
                warn!(session = %session, subject = %subject_name, "transport error, closing listener: {reason}");
                break;
            }
            None => break,
        }
    }

    router.remove_listener(session, subject_name, listener_id).await;
}

/// Drain this listener's outbound queue and write each frame to the
/// connection. Terminates when the queue is closed or a write fails.
pub async fn send_loop<S: shoreline_transport::TransportSender>(
    sender: S,
    mut queue: mpsc::Receiver<Bytes>,
) {
    while let Some(bytes) = queue.recv().await {
        if sender.send(bytes).await.is_err() {
            break;
        }
    }
}
