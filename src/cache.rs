use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::flag::Flag;

struct CacheEntry {
    flag: Flag,
    expires_at: Instant,
}

/// Per-slug flag cache with a fixed time-to-live.
///
/// Expired entries are dropped lazily when a lookup observes them; there is no
/// background sweep. A zero TTL turns every insert into a no-op.
pub struct MemoryCache {
    flags: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            flags: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn get(&self, slug: &str) -> Option<Flag> {
        {
            let flags = self.flags.read().await;
            match flags.get(slug) {
                None => return None,
                Some(entry) if Instant::now() < entry.expires_at => {
                    return Some(entry.flag.clone());
                }
                Some(_) => {}
            }
        }

        // Another task may have refreshed the entry between the two locks.
        let mut flags = self.flags.write().await;
        let now = Instant::now();
        match flags.get(slug) {
            Some(entry) if now < entry.expires_at => Some(entry.flag.clone()),
            Some(_) => {
                flags.remove(slug);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, flag: Flag) {
        if !self.is_enabled() {
            return;
        }

        let expires_at = Instant::now() + self.ttl;
        let mut flags = self.flags.write().await;
        flags.insert(flag.slug.clone(), CacheEntry { flag, expires_at });
    }

    pub async fn insert_all(&self, flags: &[Flag]) {
        if !self.is_enabled() {
            return;
        }

        let expires_at = Instant::now() + self.ttl;
        let mut map = self.flags.write().await;
        for flag in flags {
            map.insert(
                flag.slug.clone(),
                CacheEntry {
                    flag: flag.clone(),
                    expires_at,
                },
            );
        }
    }

    /// Number of stored entries, expired ones included until a lookup evicts them.
    pub async fn len(&self) -> usize {
        self.flags.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
