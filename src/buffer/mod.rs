//! In-process ring buffer of recent events
//!
//! Holds the most recent events for low-latency reads when the durable
//! store is unavailable and for dashboards needing live data. This is a
//! liveness fallback only, never the authoritative log.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::{EventType, SecurityEvent};

/// Default number of events retained per process.
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity FIFO buffer of recent events.
///
/// Exclusively owned by the logging process; shared across tasks through
/// an `Arc` handle. Pushes are pure in-memory operations and never block
/// on durable I/O.
pub struct EventBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<SecurityEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        EventBuffer {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an event, evicting the oldest entry once capacity is reached.
    pub fn push(&self, event: SecurityEvent) {
        let mut entries = self.entries.lock().unwrap();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Snapshot of recent events, most recent first.
    ///
    /// Each call computes a fresh slice; callers may iterate it repeatedly
    /// without holding any lock.
    pub fn recent(&self, type_filter: Option<EventType>, limit: usize) -> Vec<SecurityEvent> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .rev()
            .filter(|e| type_filter.map_or(true, |t| e.event_type == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetails, Severity};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn make_event(event_type: EventType, origin: &str, tag: &str) -> SecurityEvent {
        let mut indicators = BTreeSet::new();
        indicators.insert(tag.to_string());
        SecurityEvent {
            event_type,
            severity: Severity::Medium,
            origin_address: origin.to_string(),
            client_signature: None,
            actor_id: None,
            session_id: None,
            path: None,
            method: None,
            response_status: None,
            details: EventDetails::default(),
            risk_score: 20,
            threat_indicators: indicators,
            correlation_id: None,
            compliance_flags: BTreeSet::new(),
            server_instance: "test-instance".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_push_within_capacity() {
        let buffer = EventBuffer::with_capacity(5);
        for i in 0..3 {
            buffer.push(make_event(EventType::ApiAccess, "1.1.1.1", &format!("e{}", i)));
        }
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_push_past_capacity_evicts_oldest() {
        let buffer = EventBuffer::with_capacity(3);
        for i in 0..4 {
            buffer.push(make_event(EventType::ApiAccess, "1.1.1.1", &format!("e{}", i)));
        }

        assert_eq!(buffer.len(), 3);
        let tags: Vec<String> = buffer
            .recent(None, 10)
            .iter()
            .flat_map(|e| e.threat_indicators.iter().cloned())
            .collect();
        // e0 was evicted; newest first.
        assert_eq!(tags, vec!["e3", "e2", "e1"]);
    }

    #[test]
    fn test_recent_most_recent_first() {
        let buffer = EventBuffer::with_capacity(10);
        buffer.push(make_event(EventType::DataAccess, "1.1.1.1", "first"));
        buffer.push(make_event(EventType::DataAccess, "1.1.1.1", "second"));

        let events = buffer.recent(None, 10);
        assert!(events[0].threat_indicators.contains("second"));
        assert!(events[1].threat_indicators.contains("first"));
    }

    #[test]
    fn test_recent_type_filter_and_limit() {
        let buffer = EventBuffer::with_capacity(10);
        buffer.push(make_event(EventType::DataAccess, "1.1.1.1", "a"));
        buffer.push(make_event(EventType::LoginFailure, "1.1.1.1", "b"));
        buffer.push(make_event(EventType::LoginFailure, "1.1.1.1", "c"));

        let failures = buffer.recent(Some(EventType::LoginFailure), 10);
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|e| e.event_type == EventType::LoginFailure));

        let limited = buffer.recent(None, 1);
        assert_eq!(limited.len(), 1);
        assert!(limited[0].threat_indicators.contains("c"));
    }

    #[test]
    fn test_recent_is_restartable_snapshot() {
        let buffer = EventBuffer::with_capacity(10);
        buffer.push(make_event(EventType::ApiAccess, "1.1.1.1", "a"));

        let first = buffer.recent(None, 10);
        let second = buffer.recent(None, 10);
        assert_eq!(first, second);
    }
}
