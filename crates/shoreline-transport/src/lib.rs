//! Shoreline Transport
//!
//! The WebSocket server transport. Treated by the rest of the workspace as
//! a reliable, ordered, framed byte channel (spec.md §1) — this crate's job
//! is to make that true over `tokio-tungstenite`, nothing more.

pub mod error;
pub mod traits;
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Accepted, TransportEvent, TransportReceiver, TransportSender, TransportServer};
pub use websocket::{WebSocketReceiver, WebSocketSender, WebSocketServer};
