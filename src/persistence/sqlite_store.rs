//! SQLite implementation of the EventStore trait

use super::{AnomalyRow, EventFilter, EventStore, StoreError};
use crate::models::{
    EventType, IndicatorType, SecurityEvent, ThreatIndicator, ThreatLevel,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const EVENT_COLUMNS: &str = "event_type, severity, ip_address, user_agent, user_id, \
     session_id, request_path, request_method, response_status, details, risk_score, \
     threat_indicators, correlation_id, server_instance, compliance_flags, created_at";

const INDICATOR_COLUMNS: &str = "indicator_type, indicator_value, threat_level, source, \
     confidence_score, is_active, last_updated";

/// SQLite-backed event store
///
/// All server instances share one database; per-connection access is
/// serialized through a mutex, matching the single shared source of truth
/// the correlator depends on.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) a store at the specified path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteEventStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteEventStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn to_millis(ts: DateTime<Utc>) -> i64 {
        ts.timestamp_millis()
    }

    fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(ms).single()
    }

    fn bad_column(idx: usize, err: impl ToString) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            err.to_string().into(),
        )
    }

    fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecurityEvent> {
        let event_type: String = row.get(0)?;
        let severity: String = row.get(1)?;
        let details: String = row.get(9)?;
        let risk_score: i64 = row.get(10)?;
        let threat_indicators: String = row.get(11)?;
        let compliance_flags: String = row.get(14)?;
        let created_at: i64 = row.get(15)?;

        Ok(SecurityEvent {
            event_type: event_type
                .parse()
                .map_err(|e| Self::bad_column(0, e))?,
            severity: severity.parse().map_err(|e| Self::bad_column(1, e))?,
            origin_address: row.get(2)?,
            client_signature: row.get(3)?,
            actor_id: row.get(4)?,
            session_id: row.get(5)?,
            path: row.get(6)?,
            method: row.get(7)?,
            response_status: row.get::<_, Option<i64>>(8)?.map(|v| v as u16),
            details: serde_json::from_str(&details).map_err(|e| Self::bad_column(9, e))?,
            risk_score: risk_score as u8,
            threat_indicators: serde_json::from_str(&threat_indicators)
                .map_err(|e| Self::bad_column(11, e))?,
            correlation_id: row.get(12)?,
            server_instance: row.get(13)?,
            compliance_flags: serde_json::from_str(&compliance_flags)
                .map_err(|e| Self::bad_column(14, e))?,
            created_at: Self::from_millis(created_at)
                .ok_or_else(|| Self::bad_column(15, "timestamp out of range"))?,
        })
    }

    fn row_to_indicator(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreatIndicator> {
        let indicator_type: String = row.get(0)?;
        let threat_level: i64 = row.get(2)?;
        let confidence_score: i64 = row.get(4)?;
        let is_active: i64 = row.get(5)?;
        let last_updated: i64 = row.get(6)?;

        Ok(ThreatIndicator {
            indicator_type: indicator_type
                .parse()
                .map_err(|e| Self::bad_column(0, e))?,
            indicator_value: row.get(1)?,
            threat_level: ThreatLevel::from_i64(threat_level)
                .ok_or_else(|| Self::bad_column(2, "threat level out of range"))?,
            source: row.get(3)?,
            confidence_score: confidence_score as u8,
            is_active: is_active != 0,
            last_updated: Self::from_millis(last_updated)
                .ok_or_else(|| Self::bad_column(6, "timestamp out of range"))?,
        })
    }

    fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, event: &SecurityEvent) -> Result<i64, StoreError> {
        let details = Self::encode_json(&event.details)?;
        let indicators = Self::encode_json(&event.threat_indicators)?;
        let flags = Self::encode_json(&event.compliance_flags)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO security_events ({})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                EVENT_COLUMNS
            ),
            params![
                event.event_type.as_str(),
                event.severity.as_str(),
                event.origin_address,
                event.client_signature,
                event.actor_id,
                event.session_id,
                event.path,
                event.method,
                event.response_status.map(|v| v as i64),
                details,
                event.risk_score as i64,
                indicators,
                event.correlation_id,
                event.server_instance,
                flags,
                Self::to_millis(event.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>, StoreError> {
        let mut sql = format!(
            "SELECT {} FROM security_events WHERE 1=1",
            EVENT_COLUMNS
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(ref origin) = filter.origin_address {
            sql.push_str(" AND ip_address = ?");
            values.push(Value::Text(origin.clone()));
        }
        if let Some(event_type) = filter.event_type {
            sql.push_str(" AND event_type = ?");
            values.push(Value::Text(event_type.as_str().to_string()));
        }
        if let Some(flag) = filter.compliance_flag {
            // Flag sets are stored as JSON arrays of quoted names.
            sql.push_str(" AND compliance_flags LIKE ?");
            values.push(Value::Text(format!("%\"{}\"%", flag.as_str())));
        }
        if let Some(from) = filter.from {
            sql.push_str(" AND created_at >= ?");
            values.push(Value::Integer(Self::to_millis(from)));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND created_at <= ?");
            values.push(Value::Integer(Self::to_millis(to)));
        }
        sql.push_str(" ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(rusqlite::params_from_iter(values), Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn count_by_origin_since(
        &self,
        origin: &str,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM security_events
             WHERE ip_address = ? AND created_at >= ?",
            params![origin, Self::to_millis(since)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn events_from_other_instances(
        &self,
        origin: &str,
        event_type: EventType,
        since: DateTime<Utc>,
        current_instance: &str,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM security_events
             WHERE ip_address = ? AND event_type = ? AND created_at >= ?
               AND server_instance != ?
             ORDER BY id DESC",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map(
                params![
                    origin,
                    event_type.as_str(),
                    Self::to_millis(since),
                    current_instance
                ],
                Self::row_to_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn suspicious_origins(
        &self,
        risk_threshold: u8,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT ip_address FROM security_events
             WHERE risk_score > ? AND created_at >= ?
             ORDER BY ip_address",
        )?;
        let origins = stmt
            .query_map(
                params![risk_threshold as i64, Self::to_millis(since)],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(origins)
    }

    fn get_indicator(
        &self,
        indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<ThreatIndicator>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let indicator = conn
            .query_row(
                &format!(
                    "SELECT {} FROM threat_indicators
                     WHERE indicator_type = ? AND indicator_value = ?",
                    INDICATOR_COLUMNS
                ),
                params![indicator_type.as_str(), value],
                Self::row_to_indicator,
            )
            .optional()?;
        Ok(indicator)
    }

    fn put_indicator(&self, indicator: &ThreatIndicator) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO threat_indicators ({})
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                INDICATOR_COLUMNS
            ),
            params![
                indicator.indicator_type.as_str(),
                indicator.indicator_value,
                indicator.threat_level.as_i64(),
                indicator.source,
                indicator.confidence_score as i64,
                indicator.is_active as i64,
                Self::to_millis(indicator.last_updated),
            ],
        )?;
        Ok(())
    }

    fn list_indicators(
        &self,
        min_level: ThreatLevel,
        active_only: bool,
    ) -> Result<Vec<ThreatIndicator>, StoreError> {
        let mut sql = format!(
            "SELECT {} FROM threat_indicators WHERE threat_level >= ?",
            INDICATOR_COLUMNS
        );
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY threat_level DESC, confidence_score DESC");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let indicators = stmt
            .query_map(params![min_level.as_i64()], Self::row_to_indicator)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(indicators)
    }

    fn rate_anomalies(
        &self,
        lookback_hours: i64,
        sensitivity: f64,
    ) -> Result<Vec<AnomalyRow>, StoreError> {
        let since = Utc::now() - Duration::hours(lookback_hours);
        let counts: Vec<(String, i64)> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT ip_address, COUNT(*) FROM security_events
                 WHERE created_at >= ?
                 GROUP BY ip_address",
            )?;
            stmt.query_map(params![Self::to_millis(since)], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };

        if counts.is_empty() {
            return Ok(Vec::new());
        }

        let total: i64 = counts.iter().map(|(_, c)| c).sum();
        let mean = total as f64 / counts.len() as f64;

        let mut rows: Vec<AnomalyRow> = counts
            .into_iter()
            .filter_map(|(origin, count)| {
                let ratio = count as f64 / mean;
                if ratio >= sensitivity {
                    Some(AnomalyRow {
                        origin_address: origin,
                        event_count: count as usize,
                        baseline_mean: mean,
                        deviation_ratio: ratio,
                    })
                } else {
                    None
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.deviation_ratio
                .partial_cmp(&a.deviation_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM security_events WHERE created_at < ?",
            params![Self::to_millis(cutoff)],
        )?;
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM security_events;
             DELETE FROM threat_indicators;",
        )?;
        Ok(())
    }
}
