//! Proxy query counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone query counters, reset only by daemon restart.
///
/// `blocked` is best-effort bookkeeping over upstream responses; nothing in
/// the proxy's behavior depends on it.
#[derive(Debug, Default)]
pub struct ProxyStats {
    total: AtomicU64,
    blocked: AtomicU64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    /// `(queries_total, queries_blocked)` snapshot.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.total.load(Ordering::Relaxed),
            self.blocked.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ProxyStats::new();
        stats.record_query();
        stats.record_query();
        stats.record_blocked();
        assert_eq!(stats.snapshot(), (2, 1));
    }
}
