//! Error types for shoreline-core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed control value for key {key}: {reason}")]
    MalformedValue { key: String, reason: String },

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid session object key: {0}")]
    InvalidObjectKey(String),
}
