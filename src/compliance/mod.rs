//! Compliance reporting
//!
//! Filters and aggregates logged events by compliance tag over a date
//! range. Reports are computed on demand from the durable log, never
//! cached, and have no side effects; calling twice over an unchanged log
//! yields identical output.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::classify::HIGH_RISK_THRESHOLD;
use crate::models::{ComplianceFlag, ComplianceReport, EventType, ReportSummary};
use crate::persistence::{EventFilter, EventStore, StoreError};

pub struct ComplianceReporter {
    store: Arc<dyn EventStore>,
}

impl ComplianceReporter {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        ComplianceReporter { store }
    }

    /// Tabulate events in `[period_start, period_end]`, optionally
    /// restricted to those carrying `flag`.
    pub fn report(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        flag: Option<ComplianceFlag>,
    ) -> Result<ComplianceReport, StoreError> {
        let events = self.store.query(&EventFilter {
            compliance_flag: flag,
            from: Some(period_start),
            to: Some(period_end),
            ..Default::default()
        })?;

        let mut breakdown_by_type: BTreeMap<EventType, usize> = BTreeMap::new();
        let mut summary = ReportSummary::default();

        for event in &events {
            *breakdown_by_type.entry(event.event_type).or_insert(0) += 1;

            if event.event_type == EventType::DataAccess {
                summary.data_access_events += 1;
            }
            if event.event_type.is_auth() {
                summary.auth_events += 1;
            }
            if matches!(
                event.event_type,
                EventType::SuspiciousRequest | EventType::SuspiciousPattern
            ) {
                summary.suspicious_activities += 1;
            }
            if event.risk_score > HIGH_RISK_THRESHOLD {
                summary.high_risk_events += 1;
            }
        }

        Ok(ComplianceReport {
            period_start,
            period_end,
            flag,
            total_events: events.len(),
            breakdown_by_type,
            events,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetails, SecurityEvent, Severity};
    use crate::persistence::SqliteEventStore;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn make_event(
        event_type: EventType,
        risk_score: u8,
        flags: &[ComplianceFlag],
        created_at: DateTime<Utc>,
    ) -> SecurityEvent {
        SecurityEvent {
            event_type,
            severity: Severity::Medium,
            origin_address: "192.0.2.10".to_string(),
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
            compliance_flags: flags.iter().copied().collect(),
            server_instance: "instance-a".to_string(),
            created_at,
        }
    }

    fn setup() -> (Arc<SqliteEventStore>, ComplianceReporter) {
        let store = Arc::new(SqliteEventStore::in_memory().unwrap());
        let handle: Arc<dyn EventStore> = store.clone();
        (store, ComplianceReporter::new(handle))
    }

    #[test]
    fn test_report_totals_and_breakdown() {
        let (store, reporter) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::DataAccess, 20, &[ComplianceFlag::Gdpr], now))
            .unwrap();
        store
            .append(&make_event(EventType::DataAccess, 20, &[ComplianceFlag::Gdpr], now))
            .unwrap();
        store
            .append(&make_event(EventType::LoginFailure, 40, &[], now))
            .unwrap();
        store
            .append(&make_event(EventType::SuspiciousRequest, 80, &[], now))
            .unwrap();

        let report = reporter
            .report(now - Duration::hours(1), now + Duration::hours(1), None)
            .unwrap();

        assert_eq!(report.total_events, 4);
        assert_eq!(report.breakdown_by_type[&EventType::DataAccess], 2);
        assert_eq!(report.breakdown_by_type[&EventType::LoginFailure], 1);
        assert_eq!(report.summary.data_access_events, 2);
        assert_eq!(report.summary.auth_events, 1);
        assert_eq!(report.summary.suspicious_activities, 1);
        assert_eq!(report.summary.high_risk_events, 1);
    }

    #[test]
    fn test_report_flag_filter() {
        let (store, reporter) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::DataAccess, 20, &[ComplianceFlag::Gdpr], now))
            .unwrap();
        store
            .append(&make_event(EventType::PaymentAttempt, 45, &[ComplianceFlag::Sox], now))
            .unwrap();

        let report = reporter
            .report(
                now - Duration::hours(1),
                now + Duration::hours(1),
                Some(ComplianceFlag::Sox),
            )
            .unwrap();

        assert_eq!(report.total_events, 1);
        assert_eq!(report.flag, Some(ComplianceFlag::Sox));
        assert_eq!(report.events[0].event_type, EventType::PaymentAttempt);
    }

    #[test]
    fn test_report_respects_period() {
        let (store, reporter) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::DataAccess, 20, &[], now - Duration::days(10)))
            .unwrap();
        store
            .append(&make_event(EventType::DataAccess, 20, &[], now))
            .unwrap();

        let report = reporter
            .report(now - Duration::days(1), now + Duration::hours(1), None)
            .unwrap();
        assert_eq!(report.total_events, 1);
    }

    #[test]
    fn test_report_is_pure() {
        let (store, reporter) = setup();
        let now = Utc::now();

        store
            .append(&make_event(EventType::AdminAction, 50, &[ComplianceFlag::Sox], now))
            .unwrap();

        let start = now - Duration::hours(1);
        let end = now + Duration::hours(1);
        let first = reporter.report(start, end, Some(ComplianceFlag::Sox)).unwrap();
        let second = reporter.report(start, end, Some(ComplianceFlag::Sox)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_empty_period() {
        let (_, reporter) = setup();
        let now = Utc::now();

        let report = reporter
            .report(now - Duration::hours(1), now, None)
            .unwrap();
        assert_eq!(report.total_events, 0);
        assert!(report.breakdown_by_type.is_empty());
        assert_eq!(report.summary, ReportSummary::default());
    }
}
