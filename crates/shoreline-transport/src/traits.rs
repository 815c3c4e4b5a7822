//! Transport trait definitions.
//!
//! Per spec.md §1 the WebSocket transport is treated as "a reliable,
//! ordered, framed bidirectional channel of opaque byte payloads" — these
//! traits are the narrow surface the router needs from it, nothing more.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::Result;

/// Events that can occur on an accepted connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Disconnected { reason: Option<String> },
    Data(Bytes),
    Error(String),
}

#[async_trait]
pub trait TransportSender: Send + Sync {
    async fn send(&self, data: Bytes) -> Result<()>;
    fn is_connected(&self) -> bool;
}

#[async_trait]
pub trait TransportReceiver: Send {
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// A freshly accepted connection, before the Accept Layer has parsed its
/// request path into (instance, session, subject).
pub struct Accepted<S, R> {
    pub sender: S,
    pub receiver: R,
    pub addr: SocketAddr,
    /// The raw HTTP request path the client connected with, e.g.
    /// `/exp1/7/alice`. Opaque to the transport — routing lives upstream.
    pub path: String,
}

#[async_trait]
pub trait TransportServer: Send + Sync {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    async fn accept(&mut self) -> Result<Accepted<Self::Sender, Self::Receiver>>;
    fn local_addr(&self) -> Result<SocketAddr>;
}
