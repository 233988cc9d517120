//! Risk classification for incoming events
//!
//! Assigns a severity and a 0-100 risk score based on the event type and
//! caller-supplied hints. Callers that already scored an event are trusted;
//! the classifier never recomputes a supplied score.

use crate::models::{EventSubmission, EventType, Severity, ThreatLevel};

/// Highest representable risk score.
pub const MAX_RISK_SCORE: u8 = 100;

/// Risk score above which an event is considered high-risk by reports and
/// metrics.
pub const HIGH_RISK_THRESHOLD: u8 = 70;

/// Static, type-driven risk classifier.
pub struct RiskClassifier;

impl RiskClassifier {
    pub fn new() -> Self {
        RiskClassifier
    }

    /// Classify a submission into `(severity, risk_score)`.
    ///
    /// A caller-supplied `risk_score` is trusted (clamped to 100). Severity
    /// defaults to medium when unspecified; a caller-specified severity is
    /// never overridden by the score.
    pub fn classify(&self, submission: &EventSubmission) -> (Severity, u8) {
        let score = match submission.risk_score {
            Some(score) => score.min(MAX_RISK_SCORE),
            None => Self::base_score(submission.event_type),
        };
        let severity = submission.severity.unwrap_or_default();
        (severity, score)
    }

    /// Static per-type base score applied when the caller supplies none.
    pub fn base_score(event_type: EventType) -> u8 {
        match event_type {
            EventType::SuspiciousPattern => 85,
            EventType::SuspiciousRequest => 75,
            EventType::RateLimit => 60,
            EventType::DataExport => 55,
            EventType::AdminAction => 50,
            EventType::PaymentAttempt => 45,
            EventType::LoginFailure => 40,
            EventType::PasswordChange => 40,
            EventType::AuthAttempt => 35,
            EventType::FileUpload => 35,
            EventType::AccountCreation => 30,
            EventType::GenericError => 25,
            EventType::DataAccess => 20,
            EventType::ApiAccess => 15,
            EventType::LoginSuccess => 10,
        }
    }

    /// Band mapping from risk score to threat level.
    ///
    /// Used when deriving watchlist indicator levels, never to rewrite an
    /// event's severity.
    pub fn level_for_score(score: u8) -> ThreatLevel {
        if score >= 90 {
            ThreatLevel::Critical
        } else if score >= 70 {
            ThreatLevel::High
        } else if score >= 50 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new()
    }
}
