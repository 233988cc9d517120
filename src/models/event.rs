use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed enumeration of security-relevant event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RateLimit,
    AuthAttempt,
    SuspiciousRequest,
    GenericError,
    AdminAction,
    DataAccess,
    LoginSuccess,
    LoginFailure,
    PasswordChange,
    AccountCreation,
    PaymentAttempt,
    ApiAccess,
    FileUpload,
    DataExport,
    SuspiciousPattern,
}

impl EventType {
    /// Storage/wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RateLimit => "rate_limit",
            EventType::AuthAttempt => "auth_attempt",
            EventType::SuspiciousRequest => "suspicious_request",
            EventType::GenericError => "generic_error",
            EventType::AdminAction => "admin_action",
            EventType::DataAccess => "data_access",
            EventType::LoginSuccess => "login_success",
            EventType::LoginFailure => "login_failure",
            EventType::PasswordChange => "password_change",
            EventType::AccountCreation => "account_creation",
            EventType::PaymentAttempt => "payment_attempt",
            EventType::ApiAccess => "api_access",
            EventType::FileUpload => "file_upload",
            EventType::DataExport => "data_export",
            EventType::SuspiciousPattern => "suspicious_pattern",
        }
    }

    /// Whether this type belongs to the authentication family, used by
    /// compliance report sub-totals.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            EventType::AuthAttempt
                | EventType::LoginSuccess
                | EventType::LoginFailure
                | EventType::PasswordChange
                | EventType::AccountCreation
        )
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate_limit" => Ok(EventType::RateLimit),
            "auth_attempt" => Ok(EventType::AuthAttempt),
            "suspicious_request" => Ok(EventType::SuspiciousRequest),
            "generic_error" => Ok(EventType::GenericError),
            "admin_action" => Ok(EventType::AdminAction),
            "data_access" => Ok(EventType::DataAccess),
            "login_success" => Ok(EventType::LoginSuccess),
            "login_failure" => Ok(EventType::LoginFailure),
            "password_change" => Ok(EventType::PasswordChange),
            "account_creation" => Ok(EventType::AccountCreation),
            "payment_attempt" => Ok(EventType::PaymentAttempt),
            "api_access" => Ok(EventType::ApiAccess),
            "file_upload" => Ok(EventType::FileUpload),
            "data_export" => Ok(EventType::DataExport),
            "suspicious_pattern" => Ok(EventType::SuspiciousPattern),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse human-facing classification of an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed controlled vocabulary of compliance tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceFlag {
    Gdpr,
    Sox,
    Pci,
    Hipaa,
}

impl ComplianceFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceFlag::Gdpr => "gdpr",
            ComplianceFlag::Sox => "sox",
            ComplianceFlag::Pci => "pci",
            ComplianceFlag::Hipaa => "hipaa",
        }
    }
}

impl FromStr for ComplianceFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gdpr" => Ok(ComplianceFlag::Gdpr),
            "sox" => Ok(ComplianceFlag::Sox),
            "pci" => Ok(ComplianceFlag::Pci),
            "hipaa" => Ok(ComplianceFlag::Hipaa),
            other => Err(format!("unknown compliance flag: {}", other)),
        }
    }
}

impl fmt::Display for ComplianceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured event payload.
///
/// Pattern detections carry typed details; everything supplied by callers
/// falls back to the free-form `Custom` map, which the engine never
/// interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    RapidRequests {
        window_seconds: i64,
        event_count: usize,
        threshold: usize,
    },
    CrossInstance {
        window_seconds: i64,
        other_instances: Vec<String>,
    },
    Custom {
        #[serde(default)]
        fields: serde_json::Map<String, serde_json::Value>,
    },
}

impl EventDetails {
    pub fn custom(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        EventDetails::Custom { fields }
    }
}

impl Default for EventDetails {
    fn default() -> Self {
        EventDetails::Custom {
            fields: serde_json::Map::new(),
        }
    }
}

/// A security event as recorded by the engine. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_type: EventType,
    pub severity: Severity,
    /// Network origin of the triggering request. Required for correlation.
    pub origin_address: String,
    /// Opaque client software identifier (user agent or similar).
    pub client_signature: Option<String>,
    pub actor_id: Option<String>,
    pub session_id: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub response_status: Option<u16>,
    pub details: EventDetails,
    /// 0-100 assessment assigned by the classifier; caller override trusted.
    pub risk_score: u8,
    pub threat_indicators: BTreeSet<String>,
    pub correlation_id: Option<String>,
    pub compliance_flags: BTreeSet<ComplianceFlag>,
    /// Identifier of the process that produced the event.
    pub server_instance: String,
    pub created_at: DateTime<Utc>,
}

/// What request handlers hand to [`SecurityLogger::log`].
///
/// Everything except the type and origin address is optional; the engine
/// fills in severity, risk score and bookkeeping fields on ingestion.
///
/// [`SecurityLogger::log`]: crate::engine::SecurityLogger::log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubmission {
    pub event_type: EventType,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub origin_address: String,
    #[serde(default)]
    pub client_signature: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub response_status: Option<u16>,
    #[serde(default)]
    pub details: EventDetails,
    #[serde(default)]
    pub risk_score: Option<u8>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub compliance_flags: BTreeSet<ComplianceFlag>,
}

impl EventSubmission {
    pub fn new(event_type: EventType, origin_address: impl Into<String>) -> Self {
        EventSubmission {
            event_type,
            severity: None,
            origin_address: origin_address.into(),
            client_signature: None,
            actor_id: None,
            session_id: None,
            path: None,
            method: None,
            response_status: None,
            details: EventDetails::default(),
            risk_score: None,
            correlation_id: None,
            compliance_flags: BTreeSet::new(),
        }
    }
}

/// Watchlist level of a threat indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Integer encoding used by the persistent store.
    pub fn as_i64(&self) -> i64 {
        match self {
            ThreatLevel::Low => 0,
            ThreatLevel::Medium => 1,
            ThreatLevel::High => 2,
            ThreatLevel::Critical => 3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(ThreatLevel::Low),
            1 => Some(ThreatLevel::Medium),
            2 => Some(ThreatLevel::High),
            3 => Some(ThreatLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl FromStr for ThreatLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ThreatLevel::Low),
            "medium" => Ok(ThreatLevel::Medium),
            "high" => Ok(ThreatLevel::High),
            "critical" => Ok(ThreatLevel::Critical),
            other => Err(format!("unknown threat level: {}", other)),
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of signal tracked on the watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndicatorType {
    OriginAddress,
    ClientSignature,
    BehaviorPattern,
    DeviceFingerprint,
}

impl IndicatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorType::OriginAddress => "origin-address",
            IndicatorType::ClientSignature => "client-signature",
            IndicatorType::BehaviorPattern => "behavior-pattern",
            IndicatorType::DeviceFingerprint => "device-fingerprint",
        }
    }
}

impl FromStr for IndicatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "origin-address" => Ok(IndicatorType::OriginAddress),
            "client-signature" => Ok(IndicatorType::ClientSignature),
            "behavior-pattern" => Ok(IndicatorType::BehaviorPattern),
            "device-fingerprint" => Ok(IndicatorType::DeviceFingerprint),
            other => Err(format!("unknown indicator type: {}", other)),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated, de-duplicated watchlist entry keyed by `(type, value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIndicator {
    pub indicator_type: IndicatorType,
    pub indicator_value: String,
    pub threat_level: ThreatLevel,
    /// What raised the indicator (rule name or subsystem).
    pub source: String,
    pub confidence_score: u8,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
}

/// Aggregate metrics for the operator dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub total_events: usize,
    pub high_risk_events: usize,
    pub critical_events: usize,
    pub unique_origins: usize,
    pub suspicious_origins: usize,
    pub top_threats: Vec<ThreatIndicator>,
    pub compliance_summary: ComplianceSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub gdpr_events: usize,
    pub sox_events: usize,
    pub data_access_events: usize,
}

/// Derived compliance report. Computed on demand, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub flag: Option<ComplianceFlag>,
    pub total_events: usize,
    pub breakdown_by_type: BTreeMap<EventType, usize>,
    pub events: Vec<SecurityEvent>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub data_access_events: usize,
    pub auth_events: usize,
    pub suspicious_activities: usize,
    pub high_risk_events: usize,
}
