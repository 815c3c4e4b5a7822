//! An in-process fake [`Store`], for unit and integration tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::error::Result;
use crate::store::Store;

#[derive(Default)]
pub struct MemoryStore {
    strings: DashMap<String, Vec<u8>>,
    sets: DashMap<String, HashSet<String>>,
    lists: DashMap<String, Mutex<Vec<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.strings.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.strings.get(key).map(|v| v.clone()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.strings.remove(key);
        self.sets.remove(key);
        self.lists.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        // Only the trailing-wildcard form is ever used by this codebase
        // (e.g. "session:x:*"); that's all this fake needs to support.
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .strings
            .iter()
            .map(|e| e.key().clone())
            .chain(self.lists.iter().map(|e| e.key().clone()))
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<()> {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<()> {
        if let Some(mut members) = self.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .get(set)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn rpush(&self, list: &str, value: Vec<u8>) -> Result<()> {
        self.lists
            .entry(list.to_string())
            .or_default()
            .lock()
            .push(value);
        Ok(())
    }

    async fn llen(&self, list: &str) -> Result<i64> {
        Ok(self
            .lists
            .get(list)
            .map(|l| l.lock().len() as i64)
            .unwrap_or(0))
    }

    async fn lrange(&self, list: &str, lo: i64, hi: i64) -> Result<Vec<Vec<u8>>> {
        let Some(entry) = self.lists.get(list) else {
            return Ok(Vec::new());
        };
        let items = entry.lock();
        let len = items.len() as i64;
        if len == 0 || lo > hi {
            return Ok(Vec::new());
        }
        let lo = lo.clamp(0, len - 1) as usize;
        let hi = hi.clamp(0, len - 1) as usize;
        Ok(items[lo..=hi].to_vec())
    }
}
