//! The narrow persistence capability (spec.md §6.1).
//!
//! Exactly the ten operations the original Redis schema needs: string
//! get/set/del/keys, a set, and an ordered list. Kept deliberately thin so
//! an in-memory fake can stand in for tests (Design Note: "interface over
//! the key/value store").

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Store: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    async fn sadd(&self, set: &str, member: &str) -> Result<()>;
    async fn srem(&self, set: &str, member: &str) -> Result<()>;
    async fn smembers(&self, set: &str) -> Result<Vec<String>>;

    async fn rpush(&self, list: &str, value: Vec<u8>) -> Result<()>;
    async fn llen(&self, list: &str) -> Result<i64>;
    async fn lrange(&self, list: &str, lo: i64, hi: i64) -> Result<Vec<Vec<u8>>>;
}
