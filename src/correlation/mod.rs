//! Behavioral pattern correlation
//!
//! Inspects recent event history per origin address to detect rapid-request
//! bursts and, across cooperating server instances, coordinated activity.
//! Detections are synthesized as `suspicious_pattern` events and fed back
//! through the normal logging pipeline exactly once; synthetic events are
//! never re-correlated, which bounds the recursion to one extra level.
//!
//! Repeated detections over short windows re-fire and are not de-duplicated.
//! That trade-off favors recall over noise suppression and is intentional.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::models::{ComplianceFlag, EventDetails, EventType, SecurityEvent, Severity};
use crate::persistence::{EventStore, StoreError};

/// Trailing window for rapid-request burst detection.
pub const DEFAULT_BURST_WINDOW_SECONDS: i64 = 300;
/// Events per origin within the burst window before a pattern fires.
pub const DEFAULT_BURST_THRESHOLD: usize = 10;
/// Trailing window for cross-instance correlation.
pub const DEFAULT_CROSS_INSTANCE_WINDOW_SECONDS: i64 = 600;

pub const BURST_RISK_SCORE: u8 = 85;
pub const CROSS_INSTANCE_RISK_SCORE: u8 = 90;

/// Detects behavioral patterns in the durable event history.
pub struct PatternCorrelator {
    store: Arc<dyn EventStore>,
    instance_id: String,
    burst_window_seconds: i64,
    burst_threshold: usize,
    cross_instance_window_seconds: i64,
}

impl PatternCorrelator {
    pub fn new(store: Arc<dyn EventStore>, instance_id: impl Into<String>) -> Self {
        Self::with_config(
            store,
            instance_id,
            DEFAULT_BURST_WINDOW_SECONDS,
            DEFAULT_BURST_THRESHOLD,
            DEFAULT_CROSS_INSTANCE_WINDOW_SECONDS,
        )
    }

    pub fn with_config(
        store: Arc<dyn EventStore>,
        instance_id: impl Into<String>,
        burst_window_seconds: i64,
        burst_threshold: usize,
        cross_instance_window_seconds: i64,
    ) -> Self {
        PatternCorrelator {
            store,
            instance_id: instance_id.into(),
            burst_window_seconds,
            burst_threshold,
            cross_instance_window_seconds,
        }
    }

    /// Run both pattern checks for a freshly recorded event.
    ///
    /// Returns the synthetic events to log. Query failures are logged and
    /// swallowed; they never prevent the original event from being recorded
    /// and are not retried within the same event's processing.
    pub fn check(&self, event: &SecurityEvent) -> Vec<SecurityEvent> {
        if event.event_type == EventType::SuspiciousPattern {
            return Vec::new();
        }

        let mut synthetic = Vec::new();

        match self.check_burst(event) {
            Ok(Some(pattern)) => synthetic.push(pattern),
            Ok(None) => {}
            Err(e) => log::warn!("Burst detection query failed: {}", e),
        }

        match self.check_cross_instance(event) {
            Ok(Some(pattern)) => synthetic.push(pattern),
            Ok(None) => {}
            Err(e) => log::warn!("Cross-instance correlation query failed: {}", e),
        }

        synthetic
    }

    /// Rapid-request burst: more than `burst_threshold` events from one
    /// origin within the trailing window.
    fn check_burst(&self, event: &SecurityEvent) -> Result<Option<SecurityEvent>, StoreError> {
        let since = event.created_at - Duration::seconds(self.burst_window_seconds);
        let count = self
            .store
            .count_by_origin_since(&event.origin_address, since)?;

        if count <= self.burst_threshold {
            return Ok(None);
        }

        let mut indicators = BTreeSet::new();
        indicators.insert("rapid_requests".to_string());
        indicators.insert("potential_bot".to_string());

        let mut flags = BTreeSet::new();
        flags.insert(ComplianceFlag::Sox);

        Ok(Some(SecurityEvent {
            event_type: EventType::SuspiciousPattern,
            severity: Severity::High,
            origin_address: event.origin_address.clone(),
            client_signature: event.client_signature.clone(),
            actor_id: event.actor_id.clone(),
            session_id: event.session_id.clone(),
            path: None,
            method: None,
            response_status: None,
            details: EventDetails::RapidRequests {
                window_seconds: self.burst_window_seconds,
                event_count: count,
                threshold: self.burst_threshold,
            },
            risk_score: BURST_RISK_SCORE,
            threat_indicators: indicators,
            correlation_id: event.correlation_id.clone(),
            compliance_flags: flags,
            server_instance: self.instance_id.clone(),
            created_at: Utc::now(),
        }))
    }

    /// Coordinated activity: events sharing origin and type recorded by
    /// other server instances within the trailing window.
    fn check_cross_instance(
        &self,
        event: &SecurityEvent,
    ) -> Result<Option<SecurityEvent>, StoreError> {
        let since = event.created_at - Duration::seconds(self.cross_instance_window_seconds);
        let others = self.store.events_from_other_instances(
            &event.origin_address,
            event.event_type,
            since,
            &self.instance_id,
        )?;

        if others.is_empty() {
            return Ok(None);
        }

        let mut other_instances: Vec<String> =
            others.iter().map(|e| e.server_instance.clone()).collect();
        other_instances.sort();
        other_instances.dedup();

        let mut indicators = BTreeSet::new();
        indicators.insert("cross_server".to_string());
        indicators.insert("coordinated_attack".to_string());

        Ok(Some(SecurityEvent {
            event_type: EventType::SuspiciousPattern,
            severity: Severity::Critical,
            origin_address: event.origin_address.clone(),
            client_signature: event.client_signature.clone(),
            actor_id: event.actor_id.clone(),
            session_id: event.session_id.clone(),
            path: None,
            method: None,
            response_status: None,
            details: EventDetails::CrossInstance {
                window_seconds: self.cross_instance_window_seconds,
                other_instances,
            },
            risk_score: CROSS_INSTANCE_RISK_SCORE,
            threat_indicators: indicators,
            // The triggering event's correlation id links the pattern to
            // the coordinated activity it was detected from.
            correlation_id: event.correlation_id.clone(),
            compliance_flags: BTreeSet::new(),
            server_instance: self.instance_id.clone(),
            created_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteEventStore;
    use chrono::{DateTime, Utc};

    fn make_event(
        event_type: EventType,
        origin: &str,
        instance: &str,
        created_at: DateTime<Utc>,
    ) -> SecurityEvent {
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
            risk_score: 40,
            threat_indicators: BTreeSet::new(),
            correlation_id: None,
            compliance_flags: BTreeSet::new(),
            server_instance: instance.to_string(),
            created_at,
        }
    }

    fn setup() -> (Arc<SqliteEventStore>, PatternCorrelator) {
        let store = Arc::new(SqliteEventStore::in_memory().unwrap());
        let store_handle: Arc<dyn EventStore> = store.clone();
        let correlator = PatternCorrelator::new(store_handle, "instance-a");
        (store, correlator)
    }

    #[test]
    fn test_burst_fires_past_threshold() {
        let (store, correlator) = setup();
        let now = Utc::now();

        for _ in 0..11 {
            store
                .append(&make_event(EventType::LoginFailure, "203.0.113.5", "instance-a", now))
                .unwrap();
        }

        let trigger = make_event(EventType::LoginFailure, "203.0.113.5", "instance-a", now);
        let synthetic = correlator.check(&trigger);

        assert_eq!(synthetic.len(), 1);
        let pattern = &synthetic[0];
        assert_eq!(pattern.event_type, EventType::SuspiciousPattern);
        assert_eq!(pattern.risk_score, BURST_RISK_SCORE);
        assert!(pattern.threat_indicators.contains("rapid_requests"));
        assert!(pattern.threat_indicators.contains("potential_bot"));
        assert!(pattern.compliance_flags.contains(&ComplianceFlag::Sox));
        match &pattern.details {
            EventDetails::RapidRequests { event_count, threshold, .. } => {
                assert_eq!(*event_count, 11);
                assert_eq!(*threshold, DEFAULT_BURST_THRESHOLD);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_no_burst_at_threshold() {
        let (store, correlator) = setup();
        let now = Utc::now();

        for _ in 0..10 {
            store
                .append(&make_event(EventType::LoginFailure, "203.0.113.5", "instance-a", now))
                .unwrap();
        }

        let trigger = make_event(EventType::LoginFailure, "203.0.113.5", "instance-a", now);
        assert!(correlator.check(&trigger).is_empty());
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let (store, correlator) = setup();
        let now = Utc::now();
        let stale = now - Duration::seconds(DEFAULT_BURST_WINDOW_SECONDS + 60);

        for _ in 0..15 {
            store
                .append(&make_event(EventType::LoginFailure, "203.0.113.5", "instance-a", stale))
                .unwrap();
        }

        let trigger = make_event(EventType::LoginFailure, "203.0.113.5", "instance-a", now);
        assert!(correlator.check(&trigger).is_empty());
    }

    #[test]
    fn test_synthetic_events_never_correlated() {
        let (store, correlator) = setup();
        let now = Utc::now();

        for _ in 0..20 {
            store
                .append(&make_event(EventType::SuspiciousPattern, "203.0.113.5", "instance-a", now))
                .unwrap();
        }

        let synthetic = make_event(EventType::SuspiciousPattern, "203.0.113.5", "instance-a", now);
        assert!(correlator.check(&synthetic).is_empty());
    }

    #[test]
    fn test_cross_instance_detection_propagates_correlation_id() {
        let (store, correlator) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::LoginFailure, "198.51.100.7", "instance-b", now))
            .unwrap();

        let mut trigger = make_event(EventType::LoginFailure, "198.51.100.7", "instance-a", now);
        trigger.correlation_id = Some("actor-9-1700000000".to_string());

        let synthetic = correlator.check(&trigger);
        assert_eq!(synthetic.len(), 1);
        let pattern = &synthetic[0];
        assert_eq!(pattern.risk_score, CROSS_INSTANCE_RISK_SCORE);
        assert!(pattern.threat_indicators.contains("cross_server"));
        assert!(pattern.threat_indicators.contains("coordinated_attack"));
        assert_eq!(
            pattern.correlation_id.as_deref(),
            Some("actor-9-1700000000")
        );
        match &pattern.details {
            EventDetails::CrossInstance { other_instances, .. } => {
                assert_eq!(other_instances, &vec!["instance-b".to_string()]);
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[test]
    fn test_no_cross_instance_for_same_instance_events() {
        let (store, correlator) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::LoginFailure, "198.51.100.7", "instance-a", now))
            .unwrap();

        let trigger = make_event(EventType::LoginFailure, "198.51.100.7", "instance-a", now);
        assert!(correlator.check(&trigger).is_empty());
    }

    #[test]
    fn test_cross_instance_requires_matching_type() {
        let (store, correlator) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::ApiAccess, "198.51.100.7", "instance-b", now))
            .unwrap();

        let trigger = make_event(EventType::LoginFailure, "198.51.100.7", "instance-a", now);
        assert!(correlator.check(&trigger).is_empty());
    }
}
