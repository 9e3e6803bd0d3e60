//! Per-host event watermarks.
//!
//! A reconnecting listener resumes its stream from the last event time seen on
//! that host, so events are not replayed from the beginning.

use std::collections::HashMap;

use dock_relay_core::HostAddr;
use parking_lot::RwLock;

/// Thread-safe map of host to last observed event time (unix seconds).
///
/// Values only move forward: a write older than the stored value is ignored.
#[derive(Debug, Default)]
pub struct SinceMap {
    entries: RwLock<HashMap<HostAddr, u64>>,
}

impl SinceMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume point for a host; 0 when nothing was seen yet.
    #[must_use]
    pub fn get(&self, host: &HostAddr) -> u64 {
        self.entries.read().get(host).copied().unwrap_or(0)
    }

    /// Record an event time. Returns whether the stored value changed.
    pub fn set(&self, host: &HostAddr, time: u64) -> bool {
        let mut entries = self.entries.write();
        let current = entries.entry(host.clone()).or_insert(0);
        if time >= *current {
            let changed = time != *current;
            *current = time;
            changed
        } else {
            false
        }
    }

    /// Forget a host so its next stream starts fresh.
    pub fn forget(&self, host: &HostAddr) -> Option<u64> {
        self.entries.write().remove(host)
    }

    /// Number of hosts tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no host is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostAddr {
        HostAddr::parse("10.0.0.1:4242").unwrap()
    }

    #[test]
    fn defaults_to_zero() {
        let since = SinceMap::new();
        assert_eq!(since.get(&host()), 0);
        assert!(since.is_empty());
    }

    #[test]
    fn older_writes_are_ignored() {
        let since = SinceMap::new();
        assert!(since.set(&host(), 1500));
        assert!(!since.set(&host(), 1400));
        assert_eq!(since.get(&host()), 1500);

        assert!(since.set(&host(), 1600));
        assert_eq!(since.get(&host()), 1600);
    }

    #[test]
    fn forget_resets_host() {
        let since = SinceMap::new();
        since.set(&host(), 1500);
        assert_eq!(since.forget(&host()), Some(1500));
        assert_eq!(since.get(&host()), 0);

        // A fresh watermark may now start lower
        since.set(&host(), 10);
        assert_eq!(since.get(&host()), 10);
    }

    #[test]
    fn hosts_are_independent() {
        let since = SinceMap::new();
        let other = HostAddr::parse("10.0.0.2:4242").unwrap();
        since.set(&host(), 1500);
        since.set(&other, 20);
        assert_eq!(since.get(&host()), 1500);
        assert_eq!(since.get(&other), 20);
        assert_eq!(since.len(), 2);
    }
}
