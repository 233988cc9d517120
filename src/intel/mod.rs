//! Threat intelligence watchlist
//!
//! Aggregates indicators (origin address, client signature) whose risk
//! crossed a threshold into a de-duplicated, confidence-scored watchlist.
//! Levels only escalate; deactivating an indicator is an explicit
//! administrative action outside this engine.

use std::sync::Arc;

use chrono::Utc;

use crate::classify::RiskClassifier;
use crate::models::{EventType, IndicatorType, SecurityEvent, ThreatIndicator, ThreatLevel};
use crate::persistence::{EventStore, StoreError};

/// Risk score above which an event's origin address lands on the watchlist.
pub const ORIGIN_RISK_THRESHOLD: u8 = 50;
/// Risk score above which the client signature lands on the watchlist.
pub const SIGNATURE_RISK_THRESHOLD: u8 = 80;

const DEFAULT_CONFIDENCE: u8 = 50;
const REPEAT_CONFIDENCE_STEP: u8 = 5;

/// Store-backed registry of threat indicators.
pub struct ThreatIntelRegistry {
    store: Arc<dyn EventStore>,
}

impl ThreatIntelRegistry {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        ThreatIntelRegistry { store }
    }

    /// Apply the watchlist trigger conditions to a recorded event.
    ///
    /// Upsert failures are logged and swallowed: a missed update only
    /// delays watchlist visibility, it never blocks ingestion.
    pub fn observe(&self, event: &SecurityEvent) {
        if event.risk_score > ORIGIN_RISK_THRESHOLD {
            let level = RiskClassifier::level_for_score(event.risk_score);
            if let Err(e) = self.upsert(
                IndicatorType::OriginAddress,
                &event.origin_address,
                level,
                "risk_classifier",
                None,
            ) {
                log::warn!(
                    "Threat intel upsert failed for origin {}: {}",
                    event.origin_address,
                    e
                );
            }
        }

        let suspicious_client = event.event_type == EventType::SuspiciousRequest
            || event.risk_score > SIGNATURE_RISK_THRESHOLD;
        if suspicious_client {
            if let Some(ref signature) = event.client_signature {
                // Client signatures always enter at medium, regardless of
                // the triggering score.
                if let Err(e) = self.upsert(
                    IndicatorType::ClientSignature,
                    signature,
                    ThreatLevel::Medium,
                    "suspicious_client",
                    None,
                ) {
                    log::warn!("Threat intel upsert failed for signature: {}", e);
                }
            }
        }
    }

    /// Insert or escalate an indicator. Idempotent on the `(type, value)`
    /// key; the stored threat level never decreases.
    pub fn upsert(
        &self,
        indicator_type: IndicatorType,
        value: &str,
        threat_level: ThreatLevel,
        source: &str,
        confidence: Option<u8>,
    ) -> Result<(), StoreError> {
        let updated = match self.store.get_indicator(indicator_type, value)? {
            Some(current) => {
                let confidence_score = confidence
                    .unwrap_or_else(|| current.confidence_score.saturating_add(REPEAT_CONFIDENCE_STEP))
                    .min(100);
                ThreatIndicator {
                    indicator_type,
                    indicator_value: value.to_string(),
                    threat_level: current.threat_level.max(threat_level),
                    source: source.to_string(),
                    confidence_score,
                    is_active: current.is_active,
                    last_updated: Utc::now(),
                }
            }
            None => ThreatIndicator {
                indicator_type,
                indicator_value: value.to_string(),
                threat_level,
                source: source.to_string(),
                confidence_score: confidence.unwrap_or(DEFAULT_CONFIDENCE).min(100),
                is_active: true,
                last_updated: Utc::now(),
            },
        };
        self.store.put_indicator(&updated)
    }

    /// Watchlist entries at or above `min_level`, highest first.
    pub fn list(
        &self,
        min_level: ThreatLevel,
        active_only: bool,
    ) -> Result<Vec<ThreatIndicator>, StoreError> {
        self.store.list_indicators(min_level, active_only)
    }
}
