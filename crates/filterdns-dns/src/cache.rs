//! DNS response cache with TTL-based expiration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use parking_lot::RwLock;
use tracing::trace;

use filterdns_core::defaults;

use crate::message::min_answer_ttl;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: String,
    qtype: u16,
}

struct CacheEntry {
    response: Vec<u8>,
    expires_at: Instant,
}

/// Bounded cache from `(lowercased name, qtype)` to wire-format responses.
///
/// The effective TTL is the default clamped down to the smallest answer RR
/// TTL; responses landing under the floor are not stored at all. When the
/// cache is full, the entry closest to expiry makes room. Reads hand out a
/// deep copy whose transaction ID the caller must patch before sending.
pub struct DnsCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    default_ttl: Duration,
    min_ttl: Duration,
    capacity: usize,
}

impl DnsCache {
    pub fn new() -> Self {
        Self::with_limits(
            Duration::from_secs(defaults::CACHE_DEFAULT_TTL_SECS),
            Duration::from_secs(defaults::CACHE_MIN_TTL_SECS),
            defaults::CACHE_CAPACITY,
        )
    }

    pub fn with_limits(default_ttl: Duration, min_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            min_ttl,
            capacity,
        }
    }

    /// Cached response for `(name, qtype)`, or `None` on miss or expiry.
    pub fn get(&self, name: &str, qtype: u16) -> Option<Vec<u8>> {
        self.get_at(name, qtype, Instant::now())
    }

    /// Store a wire-format response under `(name, qtype)`.
    ///
    /// Responses that do not parse, and responses whose effective TTL falls
    /// below the floor, are dropped silently.
    pub fn insert(&self, name: &str, qtype: u16, response: &[u8]) {
        self.insert_at(name, qtype, response, Instant::now());
    }

    /// Drop every entry that has expired.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let dropped = before - entries.len();
        if dropped > 0 {
            trace!(dropped, remaining = entries.len(), "cache purge");
        }
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn get_at(&self, name: &str, qtype: u16, now: Instant) -> Option<Vec<u8>> {
        let entries = self.entries.read();
        let entry = entries.get(&CacheKey {
            name: name.to_string(),
            qtype,
        })?;
        if entry.expires_at <= now {
            return None;
        }
        Some(entry.response.clone())
    }

    fn insert_at(&self, name: &str, qtype: u16, response: &[u8], now: Instant) {
        let Ok(msg) = Message::from_vec(response) else {
            return;
        };

        let mut ttl = self.default_ttl;
        if let Some(rr_ttl) = min_answer_ttl(&msg) {
            ttl = ttl.min(Duration::from_secs(u64::from(rr_ttl)));
        }
        if ttl < self.min_ttl {
            return;
        }

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            evict_earliest(&mut entries);
        }
        entries.insert(
            CacheKey {
                name: name.to_string(),
                qtype,
            },
            CacheEntry {
                response: response.to_vec(),
                expires_at: now + ttl,
            },
        );
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove the single entry closest to expiry. Caller holds the write lock.
fn evict_earliest(entries: &mut HashMap<CacheKey, CacheEntry>) {
    let earliest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = earliest {
        entries.remove(&key);
    }
}
