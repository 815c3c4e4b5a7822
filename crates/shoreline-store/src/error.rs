//! Persistence error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("decode error for key {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("missing value for key {0}")]
    Missing(String),
}
