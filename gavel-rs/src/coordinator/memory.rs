use super::{Coordinator, CoordinatorError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process coordinator. Exact for a single replica: all operations run
/// under one mutex, which gives the same atomicity the networked service
/// provides through scripted eval. Expired entries are dropped lazily on
/// access.
#[derive(Default)]
pub struct MemoryCoordinator {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinatorError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).map(|entry| entry.live(now)).unwrap_or(false) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry { value: value.to_owned(), expires_at: now + ttl },
        );
        Ok(true)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinatorError> {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_owned(),
            Entry { value: value.to_owned(), expires_at: Instant::now() + ttl },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete_if_equals(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, CoordinatorError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.live(now) && entry.value == expected => {
                entries.remove(key);
                Ok(true)
            }
            Some(entry) if !entry.live(now) => {
                entries.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}
