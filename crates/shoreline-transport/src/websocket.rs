//! WebSocket server transport, backed by `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    handshake::server::{Request as HsRequest, Response as HsResponse},
    protocol::Message as WsMessage,
};
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{Accepted, TransportEvent, TransportReceiver, TransportSender, TransportServer};

/// Sends frames to one accepted WebSocket connection.
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(WsMessage::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }
}

/// Receives frames from one accepted WebSocket connection.
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Listens for inbound WebSocket connections on a bound TCP socket.
pub struct WebSocketServer {
    listener: tokio::net::TcpListener,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!("listening on {}", addr);
        Ok(Self { listener })
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<Accepted<Self::Sender, Self::Receiver>> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("accepted TCP connection from {}", addr);

        // The accept handshake is the only place the original HTTP request
        // path is available; capture it here so the caller can route on it.
        let path = Arc::new(Mutex::new(String::new()));
        let path_cell = path.clone();
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            move |req: &HsRequest, response: HsResponse| {
                *path_cell.lock() = req.uri().path().to_string();
                Ok(response)
            },
        )
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let path = path.lock().clone();
        info!("websocket client connected from {} on {}", addr, path);

        let (write, read) = ws_stream.split();

        let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(256);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(256);

        let connected = Arc::new(Mutex::new(true));
        let connected_write = connected.clone();
        let connected_read = connected.clone();

        tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = send_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("websocket write error: {}", e);
                    break;
                }
            }
            *connected_write.lock() = false;
        });

        let event_tx_clone = event_tx.clone();
        tokio::spawn(async move {
            let mut read = read;
            while let Some(result) = read.next().await {
                match result {
                    Ok(WsMessage::Binary(data)) => {
                        let _ = event_tx_clone.send(TransportEvent::Data(Bytes::from(data))).await;
                    }
                    Ok(WsMessage::Text(text)) => {
                        let _ = event_tx_clone
                            .send(TransportEvent::Data(Bytes::from(text.into_bytes())))
                            .await;
                    }
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = event_tx_clone.send(TransportEvent::Disconnected { reason }).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx_clone
                            .send(TransportEvent::Disconnected {
                                reason: Some(e.to_string()),
                            })
                            .await;
                        break;
                    }
                }
            }
            *connected_read.lock() = false;
        });

        Ok(Accepted {
            sender: WebSocketSender {
                tx: send_tx,
                connected,
            },
            receiver: WebSocketReceiver { rx: event_rx },
            addr,
            path,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}
