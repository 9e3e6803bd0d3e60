//! Runtime counters.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;

#[derive(Debug, Default)]
struct StatsInner {
    count_events: u64,
    by_status: HashMap<(String, String, String), u64>,
    last_event_time: Option<u64>,
    inspections: u64,
    inspect_time: Duration,
}

/// Counters for routed events and inspection calls.
#[derive(Debug, Default)]
pub struct RelayStats {
    inner: RwLock<StatsInner>,
}

/// Count of routed events for one `(status, host, org)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    /// Event type.
    pub status: String,
    /// Host URL.
    pub host: String,
    /// Org, empty when unknown.
    pub org: String,
    /// Number of events.
    pub count: u64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Total routed events.
    pub count_events: u64,
    /// Time of the newest routed event (unix seconds).
    pub last_event_time: Option<u64>,
    /// Number of inspection calls.
    pub inspections: u64,
    /// Total time spent in inspection calls, in milliseconds.
    pub inspect_millis: u128,
    /// Per-status breakdown.
    pub by_status: Vec<StatusCount>,
}

impl RelayStats {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one routed event.
    pub fn record_event(&self, status: &str, host: &str, org: Option<&str>, time: u64) {
        let org = org.unwrap_or_default();
        let mut inner = self.inner.write();
        inner.count_events += 1;
        *inner
            .by_status
            .entry((status.to_string(), host.to_string(), org.to_string()))
            .or_insert(0) += 1;
        inner.last_event_time = Some(inner.last_event_time.map_or(time, |t| t.max(time)));
        trace!(status, host, org, "Counted event");
    }

    /// Record the duration of one inspection call.
    pub fn record_inspection(&self, elapsed: Duration) {
        let mut inner = self.inner.write();
        inner.inspections += 1;
        inner.inspect_time += elapsed;
    }

    /// Total routed events.
    #[must_use]
    pub fn count_events(&self) -> u64 {
        self.inner.read().count_events
    }

    /// Routed events for one `(status, host, org)`.
    #[must_use]
    pub fn count_for(&self, status: &str, host: &str, org: Option<&str>) -> u64 {
        let key = (
            status.to_string(),
            host.to_string(),
            org.unwrap_or_default().to_string(),
        );
        self.inner.read().by_status.get(&key).copied().unwrap_or(0)
    }

    /// Time of the newest routed event.
    #[must_use]
    pub fn last_event_time(&self) -> Option<u64> {
        self.inner.read().last_event_time
    }

    /// Number of inspection calls.
    #[must_use]
    pub fn inspections(&self) -> u64 {
        self.inner.read().inspections
    }

    /// Copy out every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read();
        let mut by_status: Vec<StatusCount> = inner
            .by_status
            .iter()
            .map(|((status, host, org), count)| StatusCount {
                status: status.clone(),
                host: host.clone(),
                org: org.clone(),
                count: *count,
            })
            .collect();
        by_status.sort_by(|a, b| (&a.status, &a.host, &a.org).cmp(&(&b.status, &b.host, &b.org)));

        StatsSnapshot {
            count_events: inner.count_events,
            last_event_time: inner.last_event_time,
            inspections: inner.inspections,
            inspect_millis: inner.inspect_time.as_millis(),
            by_status,
        }
    }
}
