//! Alert and threat-indicator data models for Rampart.
//!
//! Alerts are single raw detection events from a source system. Their core
//! fields are immutable after intake; only the `disposition` block and the
//! append-once enrichment block change over an alert's lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Severity levels for alerts and incidents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - no immediate action required
    Info,
    /// Low severity
    Low,
    /// Medium severity
    Medium,
    /// High severity - requires attention
    High,
    /// Critical - immediate response required
    Critical,
}

impl Severity {
    /// Numeric score used for priority computation (1-5).
    pub fn score(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Low => 2,
            Severity::Medium => 3,
            Severity::High => 4,
            Severity::Critical => 5,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// The system and component that produced an alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AlertSource {
    /// Source system (e.g. "firewall", "edr", "auth-service").
    pub system: String,
    /// Component within the system (e.g. "perimeter-fw-01").
    pub component: String,
}

impl AlertSource {
    /// Creates a new alert source.
    pub fn new(system: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            component: component.into(),
        }
    }
}

impl std::fmt::Display for AlertSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.system, self.component)
    }
}

/// The detection event carried by an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Event type (e.g. "brute-force", "malware-detected").
    pub event_type: String,
    /// Human-readable description.
    pub description: String,
    /// Raw payload from the source system.
    pub payload: serde_json::Value,
}

impl AlertEvent {
    /// Creates a new event with an empty payload.
    pub fn new(event_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            description: description.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Sets the raw payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Workflow status of an alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Newly received, not yet triaged.
    New,
    /// Acknowledged by an operator.
    Acknowledged,
    /// Under active investigation.
    Investigating,
    /// Resolved.
    Resolved,
    /// Confirmed as a false positive.
    FalsePositive,
}

/// Mutable disposition of an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDisposition {
    /// Current triage status.
    pub status: AlertStatus,
    /// Whether the alert has been escalated.
    pub escalated: bool,
    /// Incident this alert is linked to, if any. Once set, never cleared.
    pub incident_id: Option<Uuid>,
}

impl Default for AlertDisposition {
    fn default() -> Self {
        Self {
            status: AlertStatus::New,
            escalated: false,
            incident_id: None,
        }
    }
}

/// A threat-intel match recorded against an alert during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelMatch {
    /// Indicator that matched.
    pub indicator_id: Uuid,
    /// Indicator type.
    pub indicator_type: IndicatorType,
    /// Matched value.
    pub value: String,
    /// Indicator confidence at match time (0-100).
    pub confidence: u8,
    /// Note describing the match.
    pub note: String,
}

/// Geographic context attached during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoContext {
    /// ISO country code.
    pub country: String,
    /// City, if resolved.
    pub city: Option<String>,
}

/// Append-once enrichment block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertEnrichment {
    /// Threat-intel matches found in the raw payload.
    pub intel_matches: Vec<IntelMatch>,
    /// Geo context, if resolved.
    pub geo: Option<GeoContext>,
    /// Reputation score (0-100, higher is worse), if resolved.
    pub reputation: Option<u8>,
}

/// A single raw detection event from a source system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier, assigned at intake.
    pub id: Uuid,
    /// Intake timestamp.
    pub timestamp: DateTime<Utc>,
    /// Name of the detection rule that fired.
    pub rule: String,
    /// Severity. May be upgraded (never downgraded) by enrichment.
    pub severity: Severity,
    /// Where the alert came from.
    pub source: AlertSource,
    /// The detection event.
    pub event: AlertEvent,
    /// Mutable triage disposition.
    pub disposition: AlertDisposition,
    /// Append-once enrichment data.
    pub enrichment: AlertEnrichment,
}

impl Alert {
    /// Links this alert to an incident. The link is write-once: a second
    /// call with a different incident id is ignored.
    pub fn link_incident(&mut self, incident_id: Uuid) {
        if self.disposition.incident_id.is_none() {
            self.disposition.incident_id = Some(incident_id);
        }
    }

    /// Returns true if the alert has been dispositioned as a false positive.
    pub fn is_false_positive(&self) -> bool {
        self.disposition.status == AlertStatus::FalsePositive
    }

    /// Upgrades severity to `high` if it is currently `low` or `medium`.
    /// Severity is never downgraded.
    pub fn upgrade_severity_on_match(&mut self) {
        if matches!(self.severity, Severity::Low | Severity::Medium) {
            self.severity = Severity::High;
        }
    }

    /// Flattens the alert into a field map for automation-rule evaluation.
    ///
    /// Top-level keys of an object payload are merged in under their own
    /// names; scalar payloads appear under `payload`.
    pub fn field_map(&self) -> HashMap<String, serde_json::Value> {
        let mut fields = HashMap::new();
        fields.insert("rule".to_string(), serde_json::json!(self.rule));
        fields.insert(
            "severity".to_string(),
            serde_json::json!(self.severity.to_string()),
        );
        fields.insert(
            "event_type".to_string(),
            serde_json::json!(self.event.event_type),
        );
        fields.insert(
            "description".to_string(),
            serde_json::json!(self.event.description),
        );
        fields.insert(
            "source_system".to_string(),
            serde_json::json!(self.source.system),
        );
        fields.insert(
            "source_component".to_string(),
            serde_json::json!(self.source.component),
        );
        match &self.event.payload {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    fields.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            serde_json::Value::Null => {}
            other => {
                fields.insert("payload".to_string(), other.clone());
            }
        }
        fields
    }
}

/// Types of threat indicators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorType {
    Ip,
    Domain,
    Hash,
    Email,
    Url,
    File,
}

/// Read-only threat-intelligence reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIndicator {
    /// Unique identifier.
    pub id: Uuid,
    /// Indicator type.
    pub indicator_type: IndicatorType,
    /// Indicator value (IP, domain, hash, ...).
    pub value: String,
    /// Confidence, 0-100.
    pub confidence: u8,
    /// Severity assigned by the feed.
    pub severity: Severity,
    /// Expiry; expired indicators are excluded from matching.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ThreatIndicator {
    /// Creates a new indicator without an expiry.
    pub fn new(
        indicator_type: IndicatorType,
        value: impl Into<String>,
        confidence: u8,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            indicator_type,
            value: value.into(),
            confidence,
            severity,
            expires_at: None,
        }
    }

    /// Sets the expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true if the indicator has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}
