//! Shoreline Store
//!
//! The persistence layer described in spec.md §6.1: a narrow [`Store`]
//! capability trait with exactly the ten Redis-shaped operations the
//! original schema needs, a [`RedisStore`] implementation, a
//! [`MemoryStore`] fake for tests, and [`SessionStore`], the higher-level
//! session/message/object operations built on top of either.

pub mod error;
pub mod memory_store;
pub mod redis_store;
pub mod session_store;
pub mod store;

pub use error::{Error, Result};
pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use session_store::SessionStore;
pub use store::Store;
