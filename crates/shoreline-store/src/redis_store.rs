//! The real, Redis-backed [`Store`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;
use crate::store::Store;

/// A `Store` backed by Redis via a `ConnectionManager`, which transparently
/// reconnects on connection loss rather than surfacing every transient
/// network blip as an error to callers.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(host: &str, db: i64) -> Result<Self> {
        let url = format!("redis://{host}/{db}");
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd(set, member).await?;
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem(set, member).await?;
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(set).await?;
        Ok(members)
    }

    async fn rpush(&self, list: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush(list, value).await?;
        Ok(())
    }

    async fn llen(&self, list: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(list).await?;
        Ok(len)
    }

    async fn lrange(&self, list: &str, lo: i64, hi: i64) -> Result<Vec<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let values: Vec<Vec<u8>> = conn.lrange(list, lo as isize, hi as isize).await?;
        Ok(values)
    }
}
