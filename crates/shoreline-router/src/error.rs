//! Router error taxonomy.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("persistence error: {0}")]
    Store(#[from] shoreline_store::Error),

    #[error("message error: {0}")]
    Core(#[from] shoreline_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] shoreline_transport::TransportError),

    #[error("malformed connection path: {0}")]
    MalformedPath(String),

    #[error("router task is no longer running")]
    Shutdown,
}
