//! Operator read surface
//!
//! Exposes recent events, suspicious-origin lists, aggregate metrics, and
//! store-side anomaly rows. Reads never sit in the write path. When the
//! durable store is unreachable every read degrades to the in-process
//! buffer, with a `degraded` marker so operators know the result is
//! partial.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::buffer::EventBuffer;
use crate::classify::HIGH_RISK_THRESHOLD;
use crate::models::{
    ComplianceFlag, ComplianceSummary, EventType, SecurityEvent, SecurityMetrics, Severity,
    ThreatLevel,
};
use crate::persistence::{AnomalyRow, EventFilter, EventStore};

/// Watchlist entries surfaced in metrics.
const TOP_THREAT_LIMIT: usize = 5;

/// A read result, flagged when served from the in-process buffer only.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> QueryResult<T> {
    fn full(value: T) -> Self {
        QueryResult {
            value,
            degraded: false,
        }
    }

    fn partial(value: T) -> Self {
        QueryResult {
            value,
            degraded: true,
        }
    }
}

/// Read-side facade over the buffer and the durable store.
pub struct SecurityQuery {
    buffer: Arc<EventBuffer>,
    store: Arc<dyn EventStore>,
}

impl SecurityQuery {
    pub fn new(buffer: Arc<EventBuffer>, store: Arc<dyn EventStore>) -> Self {
        SecurityQuery { buffer, store }
    }

    /// Most recent events, newest first.
    pub fn recent_events(
        &self,
        type_filter: Option<EventType>,
        limit: usize,
    ) -> QueryResult<Vec<SecurityEvent>> {
        match self.store.query(&EventFilter {
            event_type: type_filter,
            limit: Some(limit),
            ..Default::default()
        }) {
            Ok(events) => QueryResult::full(events),
            Err(e) => {
                log::warn!("Recent events query degraded to buffer: {}", e);
                QueryResult::partial(self.buffer.recent(type_filter, limit))
            }
        }
    }

    /// Distinct origin addresses with any event above `risk_threshold`
    /// within the lookback window.
    pub fn suspicious_origins(
        &self,
        risk_threshold: u8,
        lookback_hours: i64,
    ) -> QueryResult<Vec<String>> {
        let since = Utc::now() - Duration::hours(lookback_hours);
        match self.store.suspicious_origins(risk_threshold, since) {
            Ok(origins) => QueryResult::full(origins),
            Err(e) => {
                log::warn!("Suspicious origins query degraded to buffer: {}", e);
                let origins: BTreeSet<String> = self
                    .buffer
                    .recent(None, self.buffer.capacity())
                    .into_iter()
                    .filter(|event| {
                        event.risk_score > risk_threshold && event.created_at >= since
                    })
                    .map(|event| event.origin_address)
                    .collect();
                QueryResult::partial(origins.into_iter().collect())
            }
        }
    }

    /// Aggregate metrics over the trailing `days`.
    pub fn metrics(&self, days: i64) -> QueryResult<SecurityMetrics> {
        let since = Utc::now() - Duration::days(days);

        let (events, mut degraded) = match self.store.query(&EventFilter {
            from: Some(since),
            ..Default::default()
        }) {
            Ok(events) => (events, false),
            Err(e) => {
                log::warn!("Metrics query degraded to buffer: {}", e);
                let buffered: Vec<SecurityEvent> = self
                    .buffer
                    .recent(None, self.buffer.capacity())
                    .into_iter()
                    .filter(|event| event.created_at >= since)
                    .collect();
                (buffered, true)
            }
        };

        let mut metrics = Self::tabulate(&events);

        if !degraded {
            match self.store.list_indicators(ThreatLevel::Low, true) {
                Ok(indicators) => {
                    metrics.top_threats = indicators.into_iter().take(TOP_THREAT_LIMIT).collect();
                }
                Err(e) => {
                    log::warn!("Top threat listing unavailable: {}", e);
                    degraded = true;
                }
            }
        }

        QueryResult {
            value: metrics,
            degraded,
        }
    }

    /// Store-side rate anomaly rows, consumed read-only.
    pub fn rate_anomalies(
        &self,
        lookback_hours: i64,
        sensitivity: f64,
    ) -> QueryResult<Vec<AnomalyRow>> {
        match self.store.rate_anomalies(lookback_hours, sensitivity) {
            Ok(rows) => QueryResult::full(rows),
            Err(e) => {
                log::warn!("Anomaly detection unavailable: {}", e);
                QueryResult::partial(Vec::new())
            }
        }
    }

    fn tabulate(events: &[SecurityEvent]) -> SecurityMetrics {
        let mut unique_origins = BTreeSet::new();
        let mut suspicious = BTreeSet::new();
        let mut high_risk_events = 0;
        let mut critical_events = 0;
        let mut summary = ComplianceSummary::default();

        for event in events {
            unique_origins.insert(event.origin_address.clone());
            if event.risk_score > HIGH_RISK_THRESHOLD {
                high_risk_events += 1;
                suspicious.insert(event.origin_address.clone());
            }
            if event.severity == Severity::Critical || event.risk_score >= 90 {
                critical_events += 1;
            }
            if event.compliance_flags.contains(&ComplianceFlag::Gdpr) {
                summary.gdpr_events += 1;
            }
            if event.compliance_flags.contains(&ComplianceFlag::Sox) {
                summary.sox_events += 1;
            }
            if event.event_type == EventType::DataAccess {
                summary.data_access_events += 1;
            }
        }

        SecurityMetrics {
            total_events: events.len(),
            high_risk_events,
            critical_events,
            unique_origins: unique_origins.len(),
            suspicious_origins: suspicious.len(),
            top_threats: Vec::new(),
            compliance_summary: summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetails, IndicatorType, ThreatIndicator};
    use crate::persistence::{SqliteEventStore, StoreError};
    use chrono::DateTime;

    fn make_event(
        event_type: EventType,
        origin: &str,
        risk_score: u8,
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
            risk_score,
            threat_indicators: BTreeSet::new(),
            correlation_id: None,
            compliance_flags: BTreeSet::new(),
            server_instance: "instance-a".to_string(),
            created_at,
        }
    }

    fn setup() -> (Arc<SqliteEventStore>, Arc<EventBuffer>, SecurityQuery) {
        let store = Arc::new(SqliteEventStore::in_memory().unwrap());
        let buffer = Arc::new(EventBuffer::new());
        let query = SecurityQuery::new(buffer.clone(), store.clone());
        (store, buffer, query)
    }

    /// Store double standing in for an unreachable database.
    struct OfflineStore;

    impl EventStore for OfflineStore {
        fn append(&self, _: &SecurityEvent) -> Result<i64, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn query(&self, _: &EventFilter) -> Result<Vec<SecurityEvent>, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn count_by_origin_since(
            &self,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<usize, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn events_from_other_instances(
            &self,
            _: &str,
            _: EventType,
            _: DateTime<Utc>,
            _: &str,
        ) -> Result<Vec<SecurityEvent>, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn suspicious_origins(
            &self,
            _: u8,
            _: DateTime<Utc>,
        ) -> Result<Vec<String>, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn get_indicator(
            &self,
            _: IndicatorType,
            _: &str,
        ) -> Result<Option<ThreatIndicator>, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn put_indicator(&self, _: &ThreatIndicator) -> Result<(), StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn list_indicators(
            &self,
            _: ThreatLevel,
            _: bool,
        ) -> Result<Vec<ThreatIndicator>, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn rate_anomalies(&self, _: i64, _: f64) -> Result<Vec<AnomalyRow>, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn prune_before(&self, _: DateTime<Utc>) -> Result<usize, StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
        fn clear_all(&self) -> Result<(), StoreError> {
            Err(StoreError::InvalidData("store offline".to_string()))
        }
    }

    #[test]
    fn test_metrics_on_empty_log() {
        let (_, _, query) = setup();
        let result = query.metrics(7);

        assert!(!result.degraded);
        let metrics = result.value;
        assert_eq!(metrics.total_events, 0);
        assert_eq!(metrics.high_risk_events, 0);
        assert_eq!(metrics.critical_events, 0);
        assert_eq!(metrics.unique_origins, 0);
        assert_eq!(metrics.suspicious_origins, 0);
        assert!(metrics.top_threats.is_empty());
        assert_eq!(metrics.compliance_summary.gdpr_events, 0);
        assert_eq!(metrics.compliance_summary.sox_events, 0);
        assert_eq!(metrics.compliance_summary.data_access_events, 0);
    }

    #[test]
    fn test_metrics_tabulation() {
        let (store, _, query) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::DataAccess, "1.1.1.1", 20, now))
            .unwrap();
        store
            .append(&make_event(EventType::SuspiciousRequest, "2.2.2.2", 75, now))
            .unwrap();
        let mut critical = make_event(EventType::SuspiciousPattern, "2.2.2.2", 90, now);
        critical.severity = Severity::Critical;
        store.append(&critical).unwrap();

        let mut gdpr = make_event(EventType::DataAccess, "3.3.3.3", 20, now);
        gdpr.compliance_flags.insert(ComplianceFlag::Gdpr);
        store.append(&gdpr).unwrap();

        store
            .put_indicator(&ThreatIndicator {
                indicator_type: IndicatorType::OriginAddress,
                indicator_value: "2.2.2.2".to_string(),
                threat_level: ThreatLevel::High,
                source: "risk_classifier".to_string(),
                confidence_score: 55,
                is_active: true,
                last_updated: now,
            })
            .unwrap();

        let metrics = query.metrics(7).value;
        assert_eq!(metrics.total_events, 4);
        assert_eq!(metrics.high_risk_events, 2);
        assert_eq!(metrics.critical_events, 1);
        assert_eq!(metrics.unique_origins, 3);
        assert_eq!(metrics.suspicious_origins, 1);
        assert_eq!(metrics.top_threats.len(), 1);
        assert_eq!(metrics.compliance_summary.gdpr_events, 1);
        assert_eq!(metrics.compliance_summary.data_access_events, 2);
    }

    #[test]
    fn test_recent_events_from_store() {
        let (store, _, query) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::ApiAccess, "1.1.1.1", 10, now))
            .unwrap();
        store
            .append(&make_event(EventType::LoginFailure, "2.2.2.2", 40, now))
            .unwrap();

        let result = query.recent_events(None, 10);
        assert!(!result.degraded);
        assert_eq!(result.value.len(), 2);
        assert_eq!(result.value[0].event_type, EventType::LoginFailure);

        let filtered = query.recent_events(Some(EventType::ApiAccess), 10);
        assert_eq!(filtered.value.len(), 1);
    }

    #[test]
    fn test_suspicious_origins_from_store() {
        let (store, _, query) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::SuspiciousRequest, "5.5.5.5", 80, now))
            .unwrap();
        store
            .append(&make_event(EventType::ApiAccess, "6.6.6.6", 10, now))
            .unwrap();

        let result = query.suspicious_origins(70, 24);
        assert!(!result.degraded);
        assert_eq!(result.value, vec!["5.5.5.5".to_string()]);
    }

    #[test]
    fn test_reads_degrade_to_buffer_when_store_offline() {
        let buffer = Arc::new(EventBuffer::new());
        let query = SecurityQuery::new(buffer.clone(), Arc::new(OfflineStore));
        let now = Utc::now();

        buffer.push(make_event(EventType::LoginFailure, "7.7.7.7", 80, now));
        buffer.push(make_event(EventType::ApiAccess, "8.8.8.8", 10, now));

        let recent = query.recent_events(None, 10);
        assert!(recent.degraded);
        assert_eq!(recent.value.len(), 2);

        let origins = query.suspicious_origins(70, 24);
        assert!(origins.degraded);
        assert_eq!(origins.value, vec!["7.7.7.7".to_string()]);

        let metrics = query.metrics(7);
        assert!(metrics.degraded);
        assert_eq!(metrics.value.total_events, 2);
        assert_eq!(metrics.value.high_risk_events, 1);
        assert!(metrics.value.top_threats.is_empty());

        let anomalies = query.rate_anomalies(24, 2.0);
        assert!(anomalies.degraded);
        assert!(anomalies.value.is_empty());
    }

    #[test]
    fn test_rate_anomalies_passthrough() {
        let (store, _, query) = setup();
        let now = Utc::now();

        for _ in 0..20 {
            store
                .append(&make_event(EventType::ApiAccess, "9.9.9.9", 10, now))
                .unwrap();
        }
        store
            .append(&make_event(EventType::ApiAccess, "10.10.10.10", 10, now))
            .unwrap();

        let result = query.rate_anomalies(24, 2.0);
        assert!(!result.degraded);
        assert_eq!(result.value.len(), 1);
        assert_eq!(result.value[0].origin_address, "9.9.9.9");
    }
}
