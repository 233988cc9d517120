//! Durable event log storage
//!
//! This module defines the narrow insert/query interface the engine uses
//! to reach the shared persistent store. The store is the single source of
//! truth across server instances and the only channel through which
//! cross-instance correlation is possible.

pub mod sqlite_store;

pub use sqlite_store::SqliteEventStore;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    ComplianceFlag, EventType, IndicatorType, SecurityEvent, ThreatIndicator, ThreatLevel,
};

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data in store: {0}")]
    InvalidData(String),
}

/// Filter for event queries. Results are always ordered newest-first.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub origin_address: Option<String>,
    pub event_type: Option<EventType>,
    pub compliance_flag: Option<ComplianceFlag>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Opaque row produced by the store-side rate anomaly procedure.
///
/// Consumed read-only by the query surface; the engine never interprets
/// these beyond display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRow {
    pub origin_address: String,
    pub event_count: usize,
    pub baseline_mean: f64,
    pub deviation_ratio: f64,
}

/// Trait for durable event log backends
///
/// Implementations can use different storage backends; the engine treats
/// every failure here as non-fatal to ingestion.
pub trait EventStore: Send + Sync {
    // =====================
    // Event Log
    // =====================

    /// Append an event, returning its assigned row id.
    ///
    /// Row ids increase monotonically and fix the within-process ordering
    /// of events sharing a timestamp.
    fn append(&self, event: &SecurityEvent) -> Result<i64, StoreError>;

    /// Query events matching the filter, newest first.
    fn query(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>, StoreError>;

    /// Count events from an origin address at or after `since`.
    fn count_by_origin_since(
        &self,
        origin: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Events sharing `origin` and `event_type` at or after `since` that
    /// were produced by server instances other than `current_instance`.
    fn events_from_other_instances(
        &self,
        origin: &str,
        event_type: EventType,
        since: DateTime<Utc>,
        current_instance: &str,
    ) -> Result<Vec<SecurityEvent>, StoreError>;

    /// Distinct origin addresses with any event above `risk_threshold`
    /// at or after `since`.
    fn suspicious_origins(
        &self,
        risk_threshold: u8,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError>;

    // =====================
    // Threat Indicators
    // =====================

    /// Fetch an indicator by its `(type, value)` key.
    fn get_indicator(
        &self,
        indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<ThreatIndicator>, StoreError>;

    /// Insert or replace an indicator row.
    fn put_indicator(&self, indicator: &ThreatIndicator) -> Result<(), StoreError>;

    /// List indicators at or above `min_level`, ordered by threat level
    /// descending then confidence descending.
    fn list_indicators(
        &self,
        min_level: ThreatLevel,
        active_only: bool,
    ) -> Result<Vec<ThreatIndicator>, StoreError>;

    // =====================
    // Store-side Procedures
    // =====================

    /// Statistical rate anomaly detection over a trailing window.
    ///
    /// Flags origins whose event count exceeds `sensitivity` times the mean
    /// per-origin count within the lookback.
    fn rate_anomalies(
        &self,
        lookback_hours: i64,
        sensitivity: f64,
    ) -> Result<Vec<AnomalyRow>, StoreError>;

    // =====================
    // Maintenance
    // =====================

    /// Remove event rows older than `cutoff`. Indicator rows are kept; the
    /// watchlist outlives event retention.
    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), StoreError>;
}
