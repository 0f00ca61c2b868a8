//! Shared TLS session resumption cache.
//!
//! # Responsibilities
//! - Store server session state keyed by session ID / ticket
//! - Bound total memory to a fixed byte budget
//! - Evict least-recently-used entries when the budget is exceeded
//!
//! # Design Decisions
//! - One owned instance per process, handed to rustls via `Arc`
//! - Entry size is `key.len() + value.len()`
//! - Lookups refresh recency (resumption keeps hot sessions alive)

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustls::server::StoresServerSessions;

use crate::observability::metrics;

struct Slot {
    value: Vec<u8>,
    stamp: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Vec<u8>, Slot>,
    /// Recency index: stamp -> key. Lowest stamp is least recently used.
    order: BTreeMap<u64, Vec<u8>>,
    used_bytes: usize,
    next_stamp: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.stamp);
        self.used_bytes -= key.len() + slot.value.len();
        Some(slot.value)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(slot) = self.entries.remove(&key) {
            self.used_bytes -= key.len() + slot.value.len();
        }
        true
    }
}

/// Size-bounded LRU store for TLS server sessions.
pub struct SessionCache {
    capacity_bytes: usize,
    inner: Mutex<Inner>,
}

impl SessionCache {
    /// Create an empty cache holding at most `capacity_bytes` of keys and values.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().used_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionCache")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("used_bytes", &inner.used_bytes)
            .field("entries", &inner.entries.len())
            .finish()
    }
}

impl StoresServerSessions for SessionCache {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        let size = key.len() + value.len();
        if size > self.capacity_bytes {
            return false;
        }

        let mut inner = self.lock();
        inner.remove(&key);
        while inner.used_bytes + size > self.capacity_bytes {
            if !inner.evict_oldest() {
                break;
            }
        }

        let stamp = inner.bump();
        inner.order.insert(stamp, key.clone());
        inner.entries.insert(key, Slot { value, stamp });
        inner.used_bytes += size;
        metrics::record_session_cache(inner.used_bytes);
        true
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let stamp = inner.bump();
        let inner = &mut *inner;
        let slot = inner.entries.get_mut(key)?;
        inner.order.remove(&slot.stamp);
        slot.stamp = stamp;
        inner.order.insert(stamp, key.to_vec());
        Some(slot.value.clone())
    }

    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let value = inner.remove(key);
        metrics::record_session_cache(inner.used_bytes);
        value
    }

    fn can_cache(&self) -> bool {
        true
    }
}
